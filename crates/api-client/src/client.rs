use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use tether_api::*;
use tether_runtime_config::{ClientConfig, SessionSettings};

use crate::clock::{KeyValueStore, MemoryStore, SessionClock, TimeSource, WallClock};
use crate::error::{ClientError, Result};
use crate::refresh::RefreshCoordinator;
use crate::request::{
    RequestOptions, build_path, normalize_response, observed_status, request_headers,
};
use crate::state::{ClientState, StateHandle};
use crate::watcher::{SessionWatcher, WatcherHandle};

/// Session-aware HTTP client.
///
/// Every call first makes sure the access cookie is fresh (through the shared
/// [`RefreshCoordinator`]), then issues the request and publishes the outcome
/// to the observable [`ClientState`]. Cloning is cheap and clones share the
/// coordinator, state and cookie jar.
#[derive(Clone)]
pub struct SessionClient {
    pub(crate) http: reqwest::Client,
    base_url: String,
    pub(crate) state: StateHandle,
    clock: SessionClock,
    time: Arc<dyn TimeSource>,
    settings: SessionSettings,
    pub(crate) refresher: RefreshCoordinator,
}

/// Builder for [`SessionClient`]; defaults to an in-memory clock store, the
/// wall clock and a cookie-keeping `reqwest::Client`.
pub struct SessionClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    time: Option<Arc<dyn TimeSource>>,
    http: Option<reqwest::Client>,
}

impl SessionClientBuilder {
    /// Where the last-refresh timestamp is persisted. Clients that share a
    /// store coordinate their refreshes through it.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    /// Use an existing `reqwest::Client`. It should keep cookies, since the
    /// session lives in server-managed cookies.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<SessionClient> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .map_err(|e| ClientError::transport(&e))?,
        };
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let time = self.time.unwrap_or_else(|| Arc::new(WallClock));
        let settings = self.config.session;
        let base_url = format!(
            "{}{}",
            self.config.server.url.trim_end_matches('/'),
            self.config.server.api_prefix.trim_end_matches('/'),
        );

        let clock = SessionClock::new(store, settings.clock_key.clone());
        let state = StateHandle::new();
        let refresher = RefreshCoordinator::new(
            http.clone(),
            format!("{base_url}{}", paths::REFRESH),
            clock.clone(),
            time.clone(),
            settings.access_window(),
            state.clone(),
        );

        Ok(SessionClient {
            http,
            base_url,
            state,
            clock,
            time,
            settings,
            refresher,
        })
    }
}

impl SessionClient {
    pub fn builder(config: ClientConfig) -> SessionClientBuilder {
        SessionClientBuilder {
            config,
            store: None,
            time: None,
            http: None,
        }
    }

    /// Client with default collaborators for the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// API root, e.g. `https://app.example.com/api`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn snapshot(&self) -> ClientState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub fn clear_error(&self) {
        self.state.clear_error();
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Ensure freshness; see [`RefreshCoordinator::refresh`].
    pub async fn refresh(&self) -> Result<()> {
        self.refresher.refresh().await
    }

    /// Start the session-ceiling watcher for this client, stopping any
    /// watcher already running in the process.
    pub fn start_watcher(&self) -> WatcherHandle {
        SessionWatcher::new(
            self.clock.clone(),
            self.time.clone(),
            self.settings.session_ceiling(),
            self.settings.watch_interval(),
            self.state.clone(),
        )
        .start()
    }

    // ── Requests ──────────────────────────────────────────────────────────

    /// Issue a request as user activity. See [`Self::fetch_with`].
    pub async fn fetch(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.fetch_with(path, options, true).await
    }

    /// Issue a request and normalize its response.
    ///
    /// The freshness gate runs unless `options.skip_refresh` is set or
    /// `record_activity` is false; a refresh failure aborts the request.
    pub async fn fetch_with(
        &self,
        path: &str,
        options: RequestOptions,
        record_activity: bool,
    ) -> Result<Value> {
        if record_activity && !options.skip_refresh {
            self.refresher.refresh().await?;
        }

        let url = self.url(&build_path(path, &options.query));
        let mut req = self
            .http
            .request(options.method.clone(), &url)
            .headers(request_headers(&options.headers));
        if let Some(body) = &options.body {
            let bytes = serde_json::to_vec(body).map_err(|e| ClientError::json_encode(&e))?;
            req = req.body(bytes);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return Err(self.fail(ClientError::transport(&e))),
        };
        let status = resp.status();
        debug!("{} {} -> {}", options.method, url, status);
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(ClientError::transport(&e))),
        };

        self.state.set_status(observed_status(status, options.skip_401));
        match normalize_response(status, text, options.skip_401) {
            Ok(value) => {
                self.state.clear_error();
                Ok(value)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// [`Self::fetch`] decoded into `T`.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let value = self.fetch(path, options).await?;
        decode(value)
    }

    fn fail(&self, err: ClientError) -> ClientError {
        self.state.set_error(err.message.clone());
        err
    }

    // ── Auth ──────────────────────────────────────────────────────────────

    /// Log in with credentials. On success the persisted clock is stamped,
    /// which starts the session lifetime.
    pub async fn login(&self, req: &LoginRequest) -> Result<AccountResponse> {
        let options = RequestOptions::post().json(req)?.skip_refresh();
        let value = self.fetch(paths::LOGIN, options).await?;
        self.clock.mark_refreshed(self.time.now_millis());
        self.state.set_expired(false);
        info!("Logged in");
        decode(value)
    }

    /// Log out. Local session state is dropped whatever the server says.
    pub async fn logout(&self) -> Result<()> {
        let options = RequestOptions::post().skip_refresh().skip_401();
        let outcome = self.fetch(paths::LOGOUT, options).await.map(|_| ());
        self.clock.clear();
        self.state.reset();
        info!("Logged out");
        outcome
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let req = PasswordResetRequest {
            email: email.to_string(),
        };
        let options = RequestOptions::post().json(&req)?.skip_refresh();
        self.fetch(paths::PASSWORD_RESET, options).await.map(|_| ())
    }

    // ── Account ───────────────────────────────────────────────────────────

    pub async fn account(&self) -> Result<AccountResponse> {
        self.fetch_json(paths::ACCOUNT, RequestOptions::get()).await
    }

    pub async fn set_tenant(&self, tenant_id: &str) -> Result<()> {
        let req = SetTenantRequest {
            tenant_id: tenant_id.to_string(),
        };
        let options = RequestOptions::post().json(&req)?;
        self.fetch(paths::TENANT, options).await.map(|_| ())
    }

    pub async fn translation_eligibility(
        &self,
        language: Option<&str>,
    ) -> Result<TranslationEligibility> {
        let options = RequestOptions::get().query("language", language);
        self.fetch_json(paths::TRANSLATION_ELIGIBILITY, options).await
    }

    // ── Runtime configuration ─────────────────────────────────────────────

    /// Server-provided runtime configuration. Never refreshes, so it can be
    /// loaded before anyone has logged in.
    pub async fn runtime_config(&self) -> Result<RuntimeConfigResponse> {
        self.fetch_json(paths::RUNTIME_CONFIG, RequestOptions::get().skip_refresh())
            .await
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    let text = value.to_string();
    serde_json::from_value(value).map_err(|e| ClientError::json_decode(200, text, &e))
}
