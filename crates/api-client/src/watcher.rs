//! Absolute session ceiling enforcement.
//!
//! Refreshing keeps the access cookie alive while the user is active; the
//! watcher caps the whole session regardless of activity by polling the
//! persisted clock and raising the expiry flag once the ceiling has passed.
//! Only one watcher task runs per process: starting a new one stops the
//! previous one first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{SessionClock, TimeSource};
use crate::state::StateHandle;

/// The running watcher's id and stop signal.
static ACTIVE: Mutex<Option<(u64, watch::Sender<bool>)>> = Mutex::new(None);
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub struct SessionWatcher {
    clock: SessionClock,
    time: Arc<dyn TimeSource>,
    ceiling: Duration,
    interval: Duration,
    state: StateHandle,
}

impl SessionWatcher {
    pub fn new(
        clock: SessionClock,
        time: Arc<dyn TimeSource>,
        ceiling: Duration,
        interval: Duration,
        state: StateHandle,
    ) -> Self {
        Self {
            clock,
            time,
            ceiling,
            interval: interval.max(Duration::from_millis(1)),
            state,
        }
    }

    /// Compare the clock against the ceiling once. Returns true when the
    /// session is past it (and the expiry flag has been raised).
    pub fn check(&self) -> bool {
        let Some(elapsed) = self.clock.elapsed(self.time.now_millis()) else {
            return false;
        };
        if elapsed < self.ceiling {
            return false;
        }
        if !self.state.snapshot().expired {
            warn!(
                "Session ceiling reached ({}s since last refresh)",
                elapsed.as_secs()
            );
        }
        self.state.set_expired(true);
        true
    }

    /// Spawn the polling task on the current tokio runtime, stopping any
    /// watcher already running in this process. The first check happens one
    /// interval after start.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(self) -> WatcherHandle {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = watch::channel(false);

        let previous = active_slot().replace((id, stop_tx.clone()));
        if let Some((previous_id, previous_stop)) = previous {
            debug!("Stopping session watcher #{previous_id}");
            let _ = previous_stop.send(true);
        }

        info!(
            "Session watcher #{id} started (interval {}ms)",
            self.interval.as_millis()
        );
        let task = tokio::spawn(self.run(id, stop_rx));
        WatcherHandle {
            id,
            stop: stop_tx,
            task,
        }
    }

    async fn run(self, id: u64, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check();
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        info!("Session watcher #{id} stopped");
                        break;
                    }
                }
            }
        }
    }
}

fn active_slot() -> std::sync::MutexGuard<'static, Option<(u64, watch::Sender<bool>)>> {
    ACTIVE.lock().expect("watcher registry mutex poisoned")
}

/// Owner of a running watcher task. Dropping it stops the task.
pub struct WatcherHandle {
    id: u64,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
        let mut active = active_slot();
        if active.as_ref().is_some_and(|(id, _)| *id == self.id) {
            active.take();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
