//! Refresh coordination.
//!
//! At most one refresh call is outstanding per coordinator. Callers that
//! arrive while it is pending join it and observe the same outcome. Across
//! processes the persisted clock is stamped before the network call, so a
//! peer that reads it afterwards sees a fresh session and stays quiet.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::clock::{SessionClock, TimeSource};
use crate::error::{ClientError, Result};
use crate::request::{normalize_response, request_headers};
use crate::state::StateHandle;

type PendingRefresh = Shared<BoxFuture<'static, Result<()>>>;

/// Deduplicates refresh attempts and decides staleness.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    url: String,
    clock: SessionClock,
    time: Arc<dyn TimeSource>,
    access_window: Duration,
    state: StateHandle,
    in_flight: Mutex<Option<PendingRefresh>>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        url: String,
        clock: SessionClock,
        time: Arc<dyn TimeSource>,
        access_window: Duration,
        state: StateHandle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                url,
                clock,
                time,
                access_window,
                state,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// True when the persisted clock is younger than the access window.
    pub fn is_fresh(&self) -> bool {
        self.inner.is_fresh(self.inner.time.now_millis())
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight().is_some()
    }

    /// Ensure the access cookie is fresh, calling the refresh endpoint at
    /// most once no matter how many callers ask concurrently.
    ///
    /// The network call runs on its own task: dropping the returned future
    /// does not cancel it. Panics when called outside a tokio runtime.
    pub async fn refresh(&self) -> Result<()> {
        let pending = {
            let mut slot = self.inner.in_flight();
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight refresh");
                    pending.clone()
                }
                None => {
                    let now = self.inner.time.now_millis();
                    if self.inner.is_fresh(now) {
                        debug!("Session clock is fresh, skipping refresh");
                        return Ok(());
                    }
                    self.inner.clock.mark_refreshed(now);

                    // Runs detached so the call settles and the slot clears
                    // even when every waiter has been dropped.
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move {
                        let outcome = inner.call_endpoint().await;
                        inner.in_flight().take();
                        outcome
                    });
                    let inner = Arc::clone(&self.inner);
                    let pending = async move {
                        task.await.unwrap_or_else(|e| {
                            inner.in_flight().take();
                            let err = ClientError::refresh_task(&e);
                            warn!("Session refresh failed: {err}");
                            inner.state.set_expired(true);
                            inner.state.set_error(err.message.clone());
                            Err(err)
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }
}

impl Inner {
    fn in_flight(&self) -> std::sync::MutexGuard<'_, Option<PendingRefresh>> {
        self.in_flight.lock().expect("refresh mutex poisoned")
    }

    fn is_fresh(&self, now_millis: i64) -> bool {
        self.clock
            .elapsed(now_millis)
            .is_some_and(|elapsed| elapsed < self.access_window)
    }

    async fn call_endpoint(&self) -> Result<()> {
        match self.post_refresh().await {
            Ok(()) => {
                info!("Session refreshed");
                self.state.set_expired(false);
                Ok(())
            }
            Err(err) => {
                let err = err.into_refresh();
                warn!("Session refresh failed: {err}");
                self.state.set_expired(true);
                self.state.set_error(err.message.clone());
                Err(err)
            }
        }
    }

    async fn post_refresh(&self) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .headers(request_headers(&HeaderMap::new()))
            .send()
            .await
            .map_err(|e| ClientError::transport(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| ClientError::transport(&e))?;
        self.state.set_status(status.as_u16());
        normalize_response(status, text, false).map(|_| ())
    }
}
