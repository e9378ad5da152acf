//! Session-aware HTTP client.
//!
//! Wraps a cookie-keeping `reqwest::Client` with a sliding-window session
//! lifecycle: requests silently refresh the access cookie once it is older
//! than the access window (deduplicated across concurrent callers and
//! coordinated across processes through a persisted clock), and a watcher
//! raises an expiry flag once the absolute session ceiling passes.

pub mod client;
pub mod clock;
pub mod error;
pub mod refresh;
pub mod request;
pub mod state;
pub mod upload;
pub mod watcher;

pub use client::{SessionClient, SessionClientBuilder};
pub use clock::{
    FileStore, KeyValueStore, ManualTime, MemoryStore, SessionClock, TimeSource, WallClock,
};
pub use error::{ClientError, ErrorKind, Result};
pub use refresh::RefreshCoordinator;
pub use request::RequestOptions;
pub use state::{ClientState, StateHandle};
pub use tether_api;
pub use tether_runtime_config;
pub use upload::{UploadFile, UploadOptions};
pub use watcher::{SessionWatcher, WatcherHandle};
