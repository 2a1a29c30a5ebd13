//! Interval-driven refresh loop.
//!
//! Spawns a tokio task that issues discrete ticks into a
//! [`RefreshController`]: one immediately on start, then one per
//! `update_interval`. Ticks that fall due while a fetch is still running are
//! skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use options_data::reader::TableParser;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::controller::{RefreshController, RefreshSnapshot, TickOutcome};
use crate::source::ContentSource;

// ── RefreshOrchestrator ───────────────────────────────────────────────────────

/// Background refresh coordinator.
///
/// Call [`RefreshOrchestrator::start`] to spin up the loop and get a
/// [`RefreshHandle`] for reading snapshots, triggering refreshes and stopping.
pub struct RefreshOrchestrator<S, P> {
    controller: Arc<RefreshController<S, P>>,
    update_interval: Duration,
}

impl<S: ContentSource, P: TableParser + 'static> RefreshOrchestrator<S, P> {
    pub fn new(controller: RefreshController<S, P>, update_interval: Duration) -> Self {
        Self {
            controller: Arc::new(controller),
            update_interval,
        }
    }

    /// Start the refresh loop.
    pub fn start(self) -> RefreshHandle<S, P> {
        let controller = Arc::clone(&self.controller);
        let period = self.update_interval;

        let task = tokio::spawn(async move {
            refresh_loop(controller, period).await;
        });

        RefreshHandle {
            controller: self.controller,
            task,
        }
    }
}

/// Tick on `period` until the controller is stopped.
///
/// The first interval tick completes immediately, which gives the initial
/// load.
async fn refresh_loop<S: ContentSource, P: TableParser>(
    controller: Arc<RefreshController<S, P>>,
    period: Duration,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        if controller.is_stopped() {
            debug!("refresh controller stopped; exiting loop");
            break;
        }

        let outcome = controller.tick().await;
        trace!(?outcome, "scheduled tick finished");
    }
}

// ── RefreshHandle ─────────────────────────────────────────────────────────────

/// A handle to the running refresh loop.
///
/// Dropping the handle or calling [`RefreshHandle::stop`] cancels the timer
/// and discards any fetch still in flight.
pub struct RefreshHandle<S, P> {
    controller: Arc<RefreshController<S, P>>,
    task: JoinHandle<()>,
}

impl<S, P> RefreshHandle<S, P> {
    pub fn snapshot(&self) -> Arc<RefreshSnapshot> {
        self.controller.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RefreshSnapshot>> {
        self.controller.subscribe()
    }

    pub fn controller(&self) -> &Arc<RefreshController<S, P>> {
        &self.controller
    }

    /// Cancel the interval and mark the controller stopped.
    pub fn stop(&self) {
        self.controller.stop();
        self.task.abort();
    }

    /// `true` once the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<S: ContentSource, P: TableParser + 'static> RefreshHandle<S, P> {
    /// Request an immediate refresh outside the schedule.
    ///
    /// Runs as its own task; if a fetch is already in flight the request is
    /// dropped and resolves to [`TickOutcome::Busy`].
    pub fn trigger(&self) -> JoinHandle<TickOutcome> {
        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move { controller.tick().await })
    }
}

impl<S, P> Drop for RefreshHandle<S, P> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
