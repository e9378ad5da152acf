//! Shared client configuration types.
//!
//! The CLI reads `tether.toml` into [`ClientConfig`]; library consumers can
//! also build one in code and hand it to the session client. The two session
//! durations are declared as the server enforces them and shrunk locally by a
//! skew margin, so the client always refreshes slightly before the server
//! would reject the access cookie.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "tether.toml";

/// Top-level client configuration (persisted as `tether.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            api_prefix: default_api_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Server-declared lifetime of the access cookie.
    #[serde(default = "default_access_window_ms")]
    pub access_window_ms: u64,
    /// Server-declared absolute session lifetime since the last refresh.
    #[serde(default = "default_session_ceiling_ms")]
    pub session_ceiling_ms: u64,
    /// Subtracted from both durations above.
    #[serde(default = "default_skew_margin_ms")]
    pub skew_margin_ms: u64,
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,
    /// Key under which the last refresh timestamp is persisted.
    #[serde(default = "default_clock_key")]
    pub clock_key: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            access_window_ms: default_access_window_ms(),
            session_ceiling_ms: default_session_ceiling_ms(),
            skew_margin_ms: default_skew_margin_ms(),
            watch_interval_ms: default_watch_interval_ms(),
            clock_key: default_clock_key(),
        }
    }
}

impl SessionSettings {
    /// Effective access freshness window (declared window minus skew margin).
    pub fn access_window(&self) -> Duration {
        Duration::from_millis(self.access_window_ms.saturating_sub(self.skew_margin_ms))
    }

    /// Effective absolute session ceiling (declared ceiling minus skew margin).
    pub fn session_ceiling(&self) -> Duration {
        Duration::from_millis(self.session_ceiling_ms.saturating_sub(self.skew_margin_ms))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load a config file, falling back to defaults when it does not exist.
/// Compatibility fallbacks are applied to whatever was read.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ClientConfig::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    let mut config: ClientConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    apply_compat_fallbacks(&mut config);
    Ok(config)
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_api_prefix() -> String {
    "/api".to_string()
}
fn default_access_window_ms() -> u64 {
    60_000
}
fn default_session_ceiling_ms() -> u64 {
    30 * 60_000
}
fn default_skew_margin_ms() -> u64 {
    3
}
fn default_watch_interval_ms() -> u64 {
    5_000
}
fn default_clock_key() -> String {
    "lastRefreshedAt".to_string()
}

/// Replace unusable values with defaults.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut ClientConfig) -> bool {
    let mut changed = false;

    if config.server.url.trim().is_empty() {
        config.server.url = default_server_url();
        changed = true;
    }

    if config.session.watch_interval_ms == 0 {
        config.session.watch_interval_ms = default_watch_interval_ms();
        changed = true;
    }

    if config.session.clock_key.trim().is_empty() {
        config.session.clock_key = default_clock_key();
        changed = true;
    }

    changed
}
