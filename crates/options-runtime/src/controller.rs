//! Change-gated refresh controller.
//!
//! Wraps a [`ContentSource`] and republishes a [`RefreshSnapshot`] only when
//! the fetched content differs byte-for-byte from what was last processed.
//! Each call to [`RefreshController::tick`] walks the Idle → Fetching → Idle
//! state machine once:
//!
//! * A tick that arrives while a fetch is in flight is dropped ([`TickOutcome::Busy`]).
//! * Identical content is discarded without parsing or aggregating.
//! * Fetch failures are logged and leave the published snapshot untouched.
//! * After [`RefreshController::stop`], late fetch results are thrown away.
//!
//! Snapshots are immutable and shared through a `tokio::sync::watch` channel,
//! so readers always observe a complete table/metrics pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use options_core::error::{MonitorError, Result};
use options_core::models::SummaryMetrics;
use options_core::settings::{EngineConfig, HeaderSpellings};
use options_data::analysis::{analyze_content, TableAnalysis};
use options_data::reader::TableParser;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::source::ContentSource;

/// Delay added per retry: attempt 2 waits 100 ms, attempt 3 waits 200 ms, …
const RETRY_STEP: Duration = Duration::from_millis(100);

// ── Public types ──────────────────────────────────────────────────────────────

/// One consistent view of the trade log and everything derived from it.
#[derive(Debug, Clone, Default)]
pub struct RefreshSnapshot {
    /// Content the analysis was computed from; empty before the first load.
    pub raw_content: String,
    pub analysis: TableAnalysis,
    /// Bumped every time the snapshot is replaced.
    pub revision: u64,
    /// When the snapshot was computed; `None` for the initial empty state.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl RefreshSnapshot {
    pub fn metrics(&self) -> &SummaryMetrics {
        &self.analysis.metrics
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Content changed; a new snapshot with this revision was published.
    Updated { revision: u64 },
    /// Content identical to the last processed content; nothing recomputed.
    Unchanged,
    /// Another fetch was already in flight; this tick was dropped.
    Busy,
    /// The fetch failed; the previous snapshot stays in place.
    Failed(String),
    /// The controller was already stopped; no fetch was made.
    Cancelled,
    /// The controller was stopped while the fetch was in flight.
    Discarded,
}

// ── RefreshController ─────────────────────────────────────────────────────────

pub struct RefreshController<S, P> {
    source: S,
    parser: P,
    spellings: HeaderSpellings,
    fetch_timeout: Option<Duration>,
    fetch_attempts: u32,
    in_flight: AtomicBool,
    stopped: AtomicBool,
    last_error: Mutex<Option<String>>,
    state: watch::Sender<Arc<RefreshSnapshot>>,
}

impl<S, P> RefreshController<S, P> {
    /// Latest published snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<RefreshSnapshot> {
        self.state.borrow().clone()
    }

    /// Receiver notified every time a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RefreshSnapshot>> {
        self.state.subscribe()
    }

    /// Stop accepting ticks. A fetch already in flight finishes but its
    /// result is discarded.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!("refresh controller stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// `true` while a fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Human-readable description of the last fetch failure, cleared by the
    /// next successful fetch.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }

    /// Drop back to the empty state, so the next fetch recomputes even if
    /// the content has not changed.
    pub fn reset(&self) {
        let revision = self.state.borrow().revision + 1;
        self.state.send_replace(Arc::new(RefreshSnapshot {
            revision,
            ..RefreshSnapshot::default()
        }));
        info!(revision, "refresh state reset");
    }

    fn set_last_error(&self, error: Option<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = error;
        }
    }
}

impl<S: ContentSource, P: TableParser> RefreshController<S, P> {
    /// Build a controller from the engine configuration.
    pub fn new(source: S, parser: P, config: &EngineConfig) -> Self {
        let (state, _) = watch::channel(Arc::new(RefreshSnapshot::default()));
        Self {
            source,
            parser,
            spellings: config.header_spellings.clone(),
            fetch_timeout: config.fetch_timeout(),
            fetch_attempts: config.fetch_attempts.max(1),
            in_flight: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            last_error: Mutex::new(None),
            state,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Run one fetch-and-diff cycle.
    pub async fn tick(&self) -> TickOutcome {
        if self.is_stopped() {
            return TickOutcome::Cancelled;
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("fetch already in flight; dropping tick");
            return TickOutcome::Busy;
        };

        let fetched = self.fetch_with_retry().await;

        if self.is_stopped() {
            debug!("fetch finished after stop; discarding result");
            return TickOutcome::Discarded;
        }

        match fetched {
            Ok(content) => {
                self.set_last_error(None);
                self.apply(content)
            }
            Err(e) => {
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    "fetch failed; keeping previous snapshot"
                );
                let message = e.to_string();
                self.set_last_error(Some(message.clone()));
                TickOutcome::Failed(message)
            }
        }
    }

    /// Compare `content` with the current snapshot and republish if it differs.
    fn apply(&self, content: String) -> TickOutcome {
        let current = self.snapshot();
        if current.raw_content == content {
            debug!(revision = current.revision, "content unchanged; skipping recompute");
            return TickOutcome::Unchanged;
        }

        let analysis = analyze_content(&self.parser, &content, &self.spellings);
        let revision = current.revision + 1;
        let missing = analysis.missing_columns();
        if !missing.is_empty() {
            warn!(?missing, "trade log lacks columns; dependent metrics are zero");
        }
        info!(
            revision,
            trades = analysis.metrics.trade_count,
            total_investment = analysis.metrics.total_investment,
            overall_pnl = analysis.metrics.overall_pnl,
            "trade log changed; metrics recomputed"
        );

        self.state.send_replace(Arc::new(RefreshSnapshot {
            raw_content: content,
            analysis,
            revision,
            refreshed_at: Some(Utc::now()),
        }));
        TickOutcome::Updated { revision }
    }

    /// Up to `fetch_attempts` fetches with linear back-off between them.
    async fn fetch_with_retry(&self) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..self.fetch_attempts {
            if attempt > 0 {
                let backoff = RETRY_STEP * attempt;
                debug!(attempt, ?backoff, "retrying fetch after back-off");
                tokio::time::sleep(backoff).await;
                if self.is_stopped() {
                    break;
                }
            }

            match self.fetch_once().await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    debug!(attempt, error = %e, "fetch attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| MonitorError::Fetch("no fetch attempted".to_string())))
    }

    async fn fetch_once(&self) -> Result<String> {
        match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.fetch())
                .await
                .map_err(|_| MonitorError::FetchTimeout(limit))?,
            None => self.source.fetch().await,
        }
    }
}

// ── InFlightGuard ─────────────────────────────────────────────────────────────

/// Holds the single fetch slot; releases it on drop, including when the
/// ticking future is cancelled mid-fetch.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use options_core::models::{Category, RawTable};
    use options_data::reader::CsvTableParser;
    use std::future::Future;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    pub(crate) const TRADES: &str = "MARGIN,PNL_BUYPRICE_CLOSEPRICE,OPTION TYPE\n\
                                     100,50,PE\n\
                                     200,-30,CE\n";

    // ── fakes ─────────────────────────────────────────────────────────────

    /// Serves whatever content was last `set`, or fails while `failing`.
    #[derive(Default)]
    pub(crate) struct MemorySource {
        content: Mutex<String>,
        failing: AtomicBool,
        pub(crate) calls: AtomicUsize,
    }

    impl MemorySource {
        pub(crate) fn with(content: &str) -> Self {
            let source = Self::default();
            source.set(content);
            source
        }

        pub(crate) fn set(&self, content: &str) {
            *self.content.lock().unwrap() = content.to_string();
        }

        pub(crate) fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl ContentSource for MemorySource {
        fn fetch(&self) -> impl Future<Output = Result<String>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self.failing.load(Ordering::SeqCst) {
                Err(MonitorError::Fetch("source unavailable".to_string()))
            } else {
                Ok(self.content.lock().unwrap().clone())
            };
            async move { result }
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    /// Blocks every fetch until `release` is called.
    #[derive(Default)]
    pub(crate) struct GatedSource {
        gate: Arc<Notify>,
        pub(crate) calls: AtomicUsize,
    }

    impl GatedSource {
        pub(crate) fn release(&self) {
            self.gate.notify_one();
        }
    }

    impl ContentSource for GatedSource {
        fn fetch(&self) -> impl Future<Output = Result<String>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = Arc::clone(&self.gate);
            async move {
                gate.notified().await;
                Ok(TRADES.to_string())
            }
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    /// Never answers.
    struct HungSource;

    impl ContentSource for HungSource {
        fn fetch(&self) -> impl Future<Output = Result<String>> + Send {
            std::future::pending()
        }

        fn describe(&self) -> String {
            "hung".to_string()
        }
    }

    /// CSV parser that counts how often it is invoked.
    #[derive(Default)]
    pub(crate) struct CountingParser {
        pub(crate) calls: AtomicUsize,
    }

    impl TableParser for CountingParser {
        fn parse(&self, content: &str) -> RawTable {
            self.calls.fetch_add(1, Ordering::SeqCst);
            CsvTableParser::new().parse(content)
        }
    }

    fn controller<S: ContentSource>(source: S) -> RefreshController<S, CountingParser> {
        RefreshController::new(source, CountingParser::default(), &EngineConfig::default())
    }

    async fn wait_for_fetch<S, P>(ctrl: &RefreshController<S, P>) {
        while !ctrl.is_fetching() {
            tokio::task::yield_now().await;
        }
    }

    // ── initial state ─────────────────────────────────────────────────────

    #[test]
    fn test_initial_snapshot_is_empty() {
        let ctrl = controller(MemorySource::default());
        let snap = ctrl.snapshot();
        assert_eq!(snap.revision, 0);
        assert!(snap.raw_content.is_empty());
        assert!(snap.refreshed_at.is_none());
        assert_eq!(snap.metrics(), &SummaryMetrics::default());
        assert!(!ctrl.is_fetching());
        assert!(!ctrl.is_stopped());
    }

    // ── change gating ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_first_tick_publishes_metrics() {
        let ctrl = controller(MemorySource::with(TRADES));

        assert_eq!(ctrl.tick().await, TickOutcome::Updated { revision: 1 });

        let snap = ctrl.snapshot();
        assert_eq!(snap.revision, 1);
        assert!(snap.refreshed_at.is_some());
        assert_eq!(snap.metrics().trade_count, 2);
        assert_eq!(snap.metrics().total_investment, 300.0);
        assert_eq!(snap.metrics().category_pnl(Category::Pe), 50.0);
        assert_eq!(snap.metrics().category_pnl(Category::Ce), -30.0);
        assert_eq!(snap.metrics().overall_pnl, 20.0);
    }

    #[tokio::test]
    async fn test_identical_content_skips_recompute() {
        let ctrl = controller(MemorySource::with(TRADES));
        ctrl.tick().await;
        let before = ctrl.snapshot();

        assert_eq!(ctrl.tick().await, TickOutcome::Unchanged);

        let after = ctrl.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(ctrl.parser.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctrl.source().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_changed_content_recomputes() {
        let ctrl = controller(MemorySource::with(TRADES));
        ctrl.tick().await;

        ctrl.source().set("MARGIN,PNL_BUYPRICE_CLOSEPRICE,OPTIONTYPE\n10,1,PE\n");
        assert_eq!(ctrl.tick().await, TickOutcome::Updated { revision: 2 });

        let snap = ctrl.snapshot();
        assert_eq!(snap.metrics().trade_count, 1);
        assert_eq!(snap.metrics().overall_pnl, 1.0);
        assert_eq!(ctrl.parser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_content_is_not_a_failure() {
        let ctrl = controller(MemorySource::with(""));
        assert_eq!(ctrl.tick().await, TickOutcome::Unchanged);
        assert!(ctrl.last_error().is_none());
        assert_eq!(ctrl.snapshot().metrics(), &SummaryMetrics::default());
    }

    #[tokio::test]
    async fn test_header_only_content_is_all_zero() {
        let ctrl = controller(MemorySource::with("MARGIN,PNL_BUYPRICE_CLOSEPRICE\n"));
        assert_eq!(ctrl.tick().await, TickOutcome::Updated { revision: 1 });
        assert_eq!(ctrl.snapshot().metrics(), &SummaryMetrics::default());
    }

    // ── failures ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fetch_failure_keeps_snapshot() {
        let ctrl = controller(MemorySource::with(TRADES));
        ctrl.tick().await;
        let before = ctrl.snapshot();

        ctrl.source().fail(true);
        let outcome = ctrl.tick().await;
        assert!(matches!(outcome, TickOutcome::Failed(ref msg) if msg.contains("source unavailable")));
        assert!(Arc::ptr_eq(&before, &ctrl.snapshot()));
        assert!(ctrl.last_error().is_some());
        assert!(!ctrl.is_fetching());

        ctrl.source().fail(false);
        assert_eq!(ctrl.tick().await, TickOutcome::Unchanged);
        assert!(ctrl.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let config = EngineConfig {
            fetch_timeout_secs: Some(2),
            ..Default::default()
        };
        let ctrl = RefreshController::new(HungSource, CsvTableParser::new(), &config);

        let outcome = ctrl.tick().await;
        assert!(matches!(outcome, TickOutcome::Failed(ref msg) if msg.contains("timed out")));
        assert!(!ctrl.is_fetching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_within_tick() {
        struct FlakySource {
            calls: AtomicUsize,
        }

        impl ContentSource for FlakySource {
            fn fetch(&self) -> impl Future<Output = Result<String>> + Send {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(MonitorError::Fetch("transient".to_string()))
                    } else {
                        Ok(TRADES.to_string())
                    }
                }
            }

            fn describe(&self) -> String {
                "flaky".to_string()
            }
        }

        let config = EngineConfig {
            fetch_attempts: 3,
            ..Default::default()
        };
        let source = FlakySource {
            calls: AtomicUsize::new(0),
        };
        let ctrl = RefreshController::new(source, CsvTableParser::new(), &config);

        assert_eq!(ctrl.tick().await, TickOutcome::Updated { revision: 1 });
        assert_eq!(ctrl.source().calls.load(Ordering::SeqCst), 2);
    }

    // ── at most one fetch in flight ───────────────────────────────────────

    #[tokio::test]
    async fn test_tick_during_fetch_is_dropped() {
        let ctrl = Arc::new(controller(GatedSource::default()));

        let first = tokio::spawn({
            let ctrl = Arc::clone(&ctrl);
            async move { ctrl.tick().await }
        });
        wait_for_fetch(&ctrl).await;

        assert_eq!(ctrl.tick().await, TickOutcome::Busy);
        assert_eq!(ctrl.source().calls.load(Ordering::SeqCst), 1);

        ctrl.source().release();
        assert_eq!(first.await.unwrap(), TickOutcome::Updated { revision: 1 });
        assert!(!ctrl.is_fetching());
    }

    #[tokio::test]
    async fn test_aborted_tick_releases_slot() {
        let ctrl = Arc::new(controller(GatedSource::default()));

        let pending = tokio::spawn({
            let ctrl = Arc::clone(&ctrl);
            async move { ctrl.tick().await }
        });
        wait_for_fetch(&ctrl).await;
        pending.abort();
        let _ = pending.await;

        assert!(!ctrl.is_fetching());
        assert_eq!(ctrl.snapshot().revision, 0);
    }

    // ── cancellation ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_tick_after_stop_is_cancelled() {
        let ctrl = controller(MemorySource::with(TRADES));
        ctrl.stop();

        assert_eq!(ctrl.tick().await, TickOutcome::Cancelled);
        assert_eq!(ctrl.source().calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctrl.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn test_result_after_stop_is_discarded() {
        let ctrl = Arc::new(controller(GatedSource::default()));

        let pending = tokio::spawn({
            let ctrl = Arc::clone(&ctrl);
            async move { ctrl.tick().await }
        });
        wait_for_fetch(&ctrl).await;

        ctrl.stop();
        ctrl.source().release();

        assert_eq!(pending.await.unwrap(), TickOutcome::Discarded);
        assert_eq!(ctrl.snapshot().revision, 0);
        assert_eq!(ctrl.parser.calls.load(Ordering::SeqCst), 0);
    }

    // ── reset ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_reset_forces_recompute() {
        let ctrl = controller(MemorySource::with(TRADES));
        ctrl.tick().await;

        ctrl.reset();
        let snap = ctrl.snapshot();
        assert_eq!(snap.revision, 2);
        assert!(snap.analysis.table.is_empty());
        assert_eq!(snap.metrics(), &SummaryMetrics::default());

        assert_eq!(ctrl.tick().await, TickOutcome::Updated { revision: 3 });
        assert_eq!(ctrl.snapshot().metrics().trade_count, 2);
    }

    // ── subscribers ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_subscriber_sees_only_real_changes() {
        let ctrl = controller(MemorySource::with(TRADES));
        let mut rx = ctrl.subscribe();

        ctrl.tick().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().revision, 1);

        ctrl.tick().await;
        assert!(!rx.has_changed().unwrap());
    }
}
