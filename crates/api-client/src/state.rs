//! Observable client state.
//!
//! One [`ClientState`] per client instance, published through a
//! `tokio::sync::watch` channel so a presentation layer can subscribe to
//! changes. Every operation overwrites the fields it touches, so concurrent
//! operations race on them (last writer wins).

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    /// Last HTTP status observed by `fetch` or refresh.
    pub status: u16,
    /// Last human-readable error, empty when none.
    pub error: String,
    /// Session ceiling exceeded or refresh rejected.
    pub expired: bool,
    /// Upload progress, 0–100.
    pub upload_progress: u8,
    /// Last upload error, empty when none.
    pub upload_error: String,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            status: 200,
            error: String::new(),
            expired: false,
            upload_progress: 0,
            upload_error: String::new(),
        }
    }
}

/// Shared, cloneable handle to the state channel.
#[derive(Debug, Clone)]
pub struct StateHandle {
    tx: Arc<watch::Sender<ClientState>>,
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ClientState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ClientState {
        self.tx.borrow().clone()
    }

    /// Apply `f`; subscribers are notified only if a field changed.
    pub fn update(&self, f: impl FnOnce(&mut ClientState)) {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub fn set_status(&self, status: u16) {
        self.update(|s| s.status = status);
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.error = message);
    }

    pub fn clear_error(&self) {
        self.update(|s| s.error.clear());
    }

    pub fn set_expired(&self, expired: bool) {
        self.update(|s| s.expired = expired);
    }

    pub fn set_upload_progress(&self, percent: u8) {
        self.update(|s| s.upload_progress = percent.min(100));
    }

    pub fn set_upload_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.upload_error = message);
    }

    /// Back to defaults (logout).
    pub fn reset(&self) {
        self.update(|s| *s = ClientState::default());
    }
}
