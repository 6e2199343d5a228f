//! # Fetch Actions
//!
//! The [`Orchestrator`] is the only writer of cells. It keeps at most one
//! operation in flight per cell: starting a new one cancels the previous
//! token, and a superseded operation never commits, even if it completes
//! without noticing the cancellation. [`should_fetch`] is the freshness gate
//! in front of it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::{Cell, CellId, CellState};
use crate::retrieve::outcome::{FetchOutcome, FetchResult};
use crate::utils::misc::utils::now_millis;

/// A fetch function: given a fresh cancellation token, produce the
/// normalised payload of one dataset.
pub type FetchFn<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, FetchResult<T>> + Send + Sync>;

/// Wraps an async closure as a [`FetchFn`].
pub fn fetch_fn<T, F, Fut>(f: F) -> FetchFn<T>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
{
    Arc::new(move |token| f(token).boxed())
}

/// Source of "now" in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// How one [`Orchestrator::run`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReport {
    /// New data committed, status `Ready`.
    Committed,
    /// Error recorded, previous data kept, status `Error`.
    Failed,
    /// Token fired; the cell was left alone.
    Cancelled,
    /// A newer operation owns the cell; the result was discarded.
    Superseded,
}

struct InFlight {
    op: u64,
    token: CancellationToken,
    /// Last non-loading `CellState<T>` of the cell, carried from one
    /// operation to the one that supersedes it.
    settled: Arc<dyn Any + Send + Sync>,
}

/// # Orchestrator
///
/// Runs fetch functions against cells with per-cell cancellation and
/// graceful degradation on failure.
pub struct Orchestrator {
    in_flight: Mutex<HashMap<CellId, InFlight>>,
    next_op: AtomicU64,
    clock: Clock,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(now_millis))
    }

    /// An orchestrator stamping commits with `clock` instead of wall time.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            next_op: AtomicU64::new(1),
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<CellId, InFlight>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }

    /// Whether `op` is still the operation of record for `cell`.
    fn is_current(&self, cell: CellId, op: u64) -> bool {
        self.in_flight().get(&cell).is_some_and(|entry| entry.op == op)
    }

    /// Fetches into `cell`.
    ///
    /// Cancels whatever was in flight for the cell, marks it `Loading` with its
    /// data and timestamp intact, then commits the outcome against the last
    /// settled state (the one before any superseded operation marked it):
    /// success replaces the data and stamps `fetched_at`; a reported failure
    /// or an `Err` keeps the old data and timestamp and records the message;
    /// cancellation leaves the cell untouched.
    pub async fn run<T>(&self, cell: &Cell<T>, fetch: &FetchFn<T>) -> RunReport
    where
        T: Send + Sync + 'static,
    {
        let cell_id = cell.id();
        let op = self.next_op.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let (previous, displaced) = {
            let mut in_flight = self.in_flight();
            let displaced = in_flight.remove(&cell_id);
            let previous = displaced
                .as_ref()
                .and_then(|entry| Arc::clone(&entry.settled).downcast::<CellState<T>>().ok())
                .map(|state| state.as_ref().clone())
                .unwrap_or_else(|| cell.get().settled());
            in_flight.insert(
                cell_id,
                InFlight {
                    op,
                    token: token.clone(),
                    settled: Arc::new(previous.clone()),
                },
            );
            (previous, displaced)
        };
        if let Some(entry) = displaced {
            debug!(
                cell = cell.name(),
                superseded = entry.op,
                op,
                "cancelling in-flight fetch"
            );
            entry.token.cancel();
        }

        cell.set(previous.to_loading());
        let mut pending = PendingRun {
            orchestrator: self,
            cell,
            op,
            restore: Some(previous.clone()),
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Ok(FetchOutcome::Cancelled),
            result = (**fetch)(token.clone()) => result,
        };
        pending.restore = None;

        if !self.is_current(cell_id, op) {
            debug!(cell = cell.name(), op, "discarding superseded fetch result");
            return RunReport::Superseded;
        }

        let report = match result {
            Ok(FetchOutcome::Cancelled) => {
                debug!(cell = cell.name(), op, "fetch cancelled");
                RunReport::Cancelled
            }
            Ok(FetchOutcome::Succeeded(data)) => {
                cell.set(CellState::ready(data, self.now()));
                RunReport::Committed
            }
            Ok(FetchOutcome::Failed(message)) => {
                warn!(cell = cell.name(), error = %message, "fetch failed, keeping previous data");
                cell.set(CellState::failed_from(&previous, message));
                RunReport::Failed
            }
            Err(e) => {
                warn!(cell = cell.name(), error = %e, "fetch raised, keeping previous data");
                cell.set(CellState::failed_from(&previous, e.to_string()));
                RunReport::Failed
            }
        };

        self.release(cell_id, op);
        report
    }

    /// Drops the in-flight entry of `cell` if `op` still owns it.
    fn release(&self, cell: CellId, op: u64) -> bool {
        let mut in_flight = self.in_flight();
        if in_flight.get(&cell).is_some_and(|entry| entry.op == op) {
            in_flight.remove(&cell);
            return true;
        }
        false
    }

    /// Runs the fetch only when [`should_fetch`] says the cell is stale.
    /// Returns `None` when the gate skipped it.
    pub async fn fetch_if_stale<T>(
        &self,
        cell: &Cell<T>,
        fetch: &FetchFn<T>,
        freshness_ms: u64,
    ) -> Option<RunReport>
    where
        T: Send + Sync + 'static,
    {
        if !should_fetch_at(&cell.get(), freshness_ms, self.now()) {
            return None;
        }
        Some(self.run(cell, fetch).await)
    }

    /// Cancels every in-flight operation. Their cells keep whatever state
    /// they had; nothing is committed afterwards.
    pub fn abort_all(&self) {
        let drained: Vec<InFlight> = self.in_flight().drain().map(|(_, entry)| entry).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "aborting in-flight fetches");
        }
        for entry in drained {
            entry.token.cancel();
        }
    }
}

/// Undoes the `Loading` mark when a `run` future is dropped mid-fetch, so
/// the cell does not stay loading and blocked by the freshness gate.
struct PendingRun<'a, T: Send + Sync + 'static> {
    orchestrator: &'a Orchestrator,
    cell: &'a Cell<T>,
    op: u64,
    restore: Option<CellState<T>>,
}

impl<T: Send + Sync + 'static> Drop for PendingRun<'_, T> {
    fn drop(&mut self) {
        let Some(previous) = self.restore.take() else {
            return;
        };
        if self.orchestrator.release(self.cell.id(), self.op) {
            debug!(
                cell = self.cell.name(),
                op = self.op,
                "fetch dropped, restoring previous state"
            );
            self.cell.set(previous);
        }
    }
}

/// Freshness gate against wall-clock time.
pub fn should_fetch<T>(state: &CellState<T>, freshness_ms: u64) -> bool {
    should_fetch_at(state, freshness_ms, now_millis())
}

/// Freshness gate: never while loading, never while younger than
/// `freshness_ms`, always when nothing has been fetched yet.
pub fn should_fetch_at<T>(state: &CellState<T>, freshness_ms: u64, now: i64) -> bool {
    if state.is_loading() {
        return false;
    }
    if state.fetched_at != 0 && now.saturating_sub(state.fetched_at) < freshness_ms as i64 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::CellStatus;
    use crate::retrieve::outcome::FetchError;
    use std::sync::atomic::AtomicI64;
    use std::time::Duration;
    use tokio::time::sleep;

    fn fixed_clock(at: i64) -> (Clock, Arc<AtomicI64>) {
        let now = Arc::new(AtomicI64::new(at));
        let handle = Arc::clone(&now);
        let clock: Clock = Arc::new(move || handle.load(Ordering::SeqCst));
        (clock, now)
    }

    fn ready<T>(data: T, fetched_at: i64) -> CellState<T> {
        CellState::ready(data, fetched_at)
    }

    #[test]
    fn gate_fetches_when_never_fetched() {
        let state: CellState<u8> = CellState::idle();
        assert!(should_fetch_at(&state, 60_000, 1_000_000));
    }

    #[test]
    fn gate_uses_age_against_threshold() {
        let now = 10_000_000;
        assert!(should_fetch_at(&ready(1u8, now - 120_000), 60_000, now));
        assert!(!should_fetch_at(&ready(1u8, now), 60_000, now));
    }

    #[test]
    fn gate_flips_exactly_at_threshold() {
        let fetched = 5_000_000;
        let state = ready(1u8, fetched);
        assert!(!should_fetch_at(&state, 60_000, fetched + 59_999));
        assert!(should_fetch_at(&state, 60_000, fetched + 60_000));
    }

    #[test]
    fn gate_never_fetches_while_loading() {
        let state = ready(1u8, 1).to_loading();
        assert!(!should_fetch_at(&state, 0, i64::MAX));
        assert!(!should_fetch_at(&CellState::<u8>::idle().to_loading(), 60_000, 1));
    }

    #[test]
    fn gate_with_errored_cell_follows_last_success() {
        let now = 1_000_000;
        let failed = CellState::failed_from(&ready(1u8, now - 10), "boom".into());
        assert!(!should_fetch_at(&failed, 60_000, now));
        let never = CellState::failed_from(&CellState::<u8>::idle(), "boom".into());
        assert!(should_fetch_at(&never, 60_000, now));
    }

    #[tokio::test]
    async fn success_commits_data_and_timestamp() {
        let (clock, _) = fixed_clock(42_000);
        let orchestrator = Orchestrator::with_clock(clock);
        let cell: Cell<Vec<u32>> = Cell::new("test");
        let fetch = fetch_fn(|_token| async { Ok(FetchOutcome::Succeeded(vec![1, 2, 3])) });

        let report = orchestrator.run(&cell, &fetch).await;

        assert_eq!(report, RunReport::Committed);
        let state = cell.get();
        assert_eq!(state.status, CellStatus::Ready);
        assert_eq!(state.data.as_deref(), Some(&vec![1, 2, 3]));
        assert_eq!(state.fetched_at, 42_000);
        assert!(state.error.is_none());
        assert_eq!(orchestrator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failure_preserves_previous_data() {
        let (clock, now) = fixed_clock(1_000);
        let orchestrator = Orchestrator::with_clock(clock);
        let cell: Cell<&'static str> = Cell::new("test");

        let good = fetch_fn(|_token| async { Ok(FetchOutcome::Succeeded("good")) });
        orchestrator.run(&cell, &good).await;

        now.store(9_000, Ordering::SeqCst);
        let bad = fetch_fn(|_token| async {
            Ok(FetchOutcome::<&'static str>::Failed("HTTP 502".into()))
        });
        let report = orchestrator.run(&cell, &bad).await;

        assert_eq!(report, RunReport::Failed);
        let state = cell.get();
        assert_eq!(state.status, CellStatus::Error);
        assert_eq!(state.data.as_deref(), Some(&"good"));
        assert_eq!(state.fetched_at, 1_000);
        assert_eq!(state.error.as_deref(), Some("HTTP 502"));
    }

    #[tokio::test]
    async fn raised_error_becomes_cell_error() {
        let orchestrator = Orchestrator::new();
        let cell: Cell<u8> = Cell::new("test");
        let fetch = fetch_fn(|_token| async {
            Err::<FetchOutcome<u8>, _>(FetchError::InvalidArgument(
                "month 13 is not in 1..=12".into(),
            ))
        });

        assert_eq!(orchestrator.run(&cell, &fetch).await, RunReport::Failed);
        let state = cell.get();
        assert_eq!(state.status, CellStatus::Error);
        assert!(state.data.is_none());
        assert_eq!(state.fetched_at, 0);
        assert!(state.error.unwrap().contains("month 13"));
    }

    #[tokio::test]
    async fn reported_cancellation_leaves_cell_loading_untouched() {
        let orchestrator = Orchestrator::new();
        let cell: Cell<u8> = Cell::new("test");
        let fetch = fetch_fn(|_token| async { Ok(FetchOutcome::<u8>::Cancelled) });

        assert_eq!(orchestrator.run(&cell, &fetch).await, RunReport::Cancelled);
        let state = cell.get();
        assert_eq!(state.status, CellStatus::Loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn loading_keeps_data_and_clears_error() {
        let orchestrator = Arc::new(Orchestrator::new());
        let cell: Cell<u8> = Cell::new("test");
        cell.set(CellState::failed_from(&ready(9u8, 77), "old".into()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = cell.subscribe(move |state| sink.lock().unwrap().push(state.clone()));

        let fetch = fetch_fn(|_token| async { Ok(FetchOutcome::Succeeded(10u8)) });
        orchestrator.run(&cell, &fetch).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].status, CellStatus::Loading);
        assert_eq!(seen[0].data.as_deref(), Some(&9));
        assert_eq!(seen[0].fetched_at, 77);
        assert!(seen[0].error.is_none());
        assert_eq!(seen[1].data.as_deref(), Some(&10));
    }

    #[tokio::test]
    async fn newer_fetch_cancels_and_supersedes_older() {
        let orchestrator = Orchestrator::new();
        let cell: Cell<&'static str> = Cell::new("test");
        let slow_token: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));

        let captured = Arc::clone(&slow_token);
        let slow = fetch_fn(move |token: CancellationToken| {
            *captured.lock().unwrap() = Some(token);
            async {
                sleep(Duration::from_millis(200)).await;
                Ok(FetchOutcome::Succeeded("slow"))
            }
        });
        let fast = fetch_fn(|_token| async {
            sleep(Duration::from_millis(10)).await;
            Ok(FetchOutcome::Succeeded("fast"))
        });

        let (slow_report, fast_report) = tokio::join!(orchestrator.run(&cell, &slow), async {
            sleep(Duration::from_millis(5)).await;
            orchestrator.run(&cell, &fast).await
        });

        assert_eq!(fast_report, RunReport::Committed);
        assert_ne!(slow_report, RunReport::Committed);
        assert_eq!(cell.get().data.as_deref(), Some(&"fast"));
        let token = slow_token.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
        assert_eq!(orchestrator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn older_result_never_overwrites_newer() {
        let orchestrator = Orchestrator::new();
        let cell: Cell<u32> = Cell::new("test");

        // Finishes before the newer fetch but after being displaced.
        let stubborn = fetch_fn(|_token| async {
            sleep(Duration::from_millis(50)).await;
            Ok(FetchOutcome::Succeeded(1))
        });
        let newer = fetch_fn(|_token| async {
            sleep(Duration::from_millis(100)).await;
            Ok(FetchOutcome::Succeeded(2))
        });

        let (first, second) = tokio::join!(orchestrator.run(&cell, &stubborn), async {
            sleep(Duration::from_millis(5)).await;
            orchestrator.run(&cell, &newer).await
        });

        assert_ne!(first, RunReport::Committed);
        assert_eq!(second, RunReport::Committed);
        assert_eq!(cell.get().data.as_deref(), Some(&2));
    }

    #[tokio::test]
    async fn fetch_if_stale_skips_fresh_cells() {
        let (clock, now) = fixed_clock(100_000);
        let orchestrator = Orchestrator::with_clock(clock);
        let cell: Cell<u8> = Cell::new("test");
        let fetch = fetch_fn(|_token| async { Ok(FetchOutcome::Succeeded(1u8)) });

        let first = orchestrator.fetch_if_stale(&cell, &fetch, 60_000).await;
        assert_eq!(first, Some(RunReport::Committed));
        now.store(130_000, Ordering::SeqCst);
        assert_eq!(orchestrator.fetch_if_stale(&cell, &fetch, 60_000).await, None);
        now.store(160_000, Ordering::SeqCst);
        let third = orchestrator.fetch_if_stale(&cell, &fetch, 60_000).await;
        assert_eq!(third, Some(RunReport::Committed));
        assert_eq!(cell.get().fetched_at, 160_000);
    }

    #[tokio::test]
    async fn dropped_run_restores_previous_state() {
        let orchestrator = Orchestrator::new();
        let cell: Cell<u8> = Cell::new("test");
        cell.set(ready(4u8, 99));
        let hang = fetch_fn(|_token| std::future::pending::<FetchResult<u8>>());

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), orchestrator.run(&cell, &hang)).await;

        assert!(timed_out.is_err());
        let state = cell.get();
        assert_eq!(state.status, CellStatus::Ready);
        assert_eq!(state.data.as_deref(), Some(&4));
        assert_eq!(orchestrator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn dropped_superseding_run_restores_settled_state() {
        let orchestrator = Orchestrator::new();
        let cell: Cell<u8> = Cell::new("test");
        cell.set(ready(4u8, 99));
        let hang = fetch_fn(|_token| std::future::pending::<FetchResult<u8>>());

        let (first, second) = tokio::join!(orchestrator.run(&cell, &hang), async {
            tokio::task::yield_now().await;
            tokio::time::timeout(Duration::from_millis(20), orchestrator.run(&cell, &hang)).await
        });

        assert_eq!(first, RunReport::Superseded);
        assert!(second.is_err());
        let state = cell.get();
        assert_eq!(state.status, CellStatus::Ready);
        assert_eq!(state.data.as_deref(), Some(&4));
        assert_eq!(state.fetched_at, 99);
        assert_eq!(orchestrator.in_flight_count(), 0);
        assert!(should_fetch_at(&state, 0, i64::MAX));
    }

    #[tokio::test]
    async fn superseding_failure_keeps_settled_data() {
        let orchestrator = Orchestrator::new();
        let cell: Cell<u8> = Cell::new("test");
        cell.set(CellState::failed_from(&ready(6u8, 12), "stale".into()));
        let hang = fetch_fn(|_token| std::future::pending::<FetchResult<u8>>());
        let bad = fetch_fn(|_token| async { Ok(FetchOutcome::<u8>::Failed("HTTP 500".into())) });

        let (first, second) = tokio::join!(orchestrator.run(&cell, &hang), async {
            tokio::task::yield_now().await;
            orchestrator.run(&cell, &bad).await
        });

        assert_eq!(first, RunReport::Superseded);
        assert_eq!(second, RunReport::Failed);
        let state = cell.get();
        assert_eq!(state.status, CellStatus::Error);
        assert_eq!(state.data.as_deref(), Some(&6));
        assert_eq!(state.fetched_at, 12);
        assert_eq!(state.error.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn abort_all_cancels_pending_work() {
        let orchestrator = Arc::new(Orchestrator::new());
        let cell: Cell<u8> = Cell::new("test");
        let fetch = fetch_fn(|token: CancellationToken| async move {
            token.cancelled().await;
            Ok(FetchOutcome::Succeeded(1u8))
        });

        let runner = Arc::clone(&orchestrator);
        let task_cell = cell.clone();
        let handle = tokio::spawn(async move { runner.run(&task_cell, &fetch).await });
        while orchestrator.in_flight_count() == 0 {
            tokio::task::yield_now().await;
        }
        orchestrator.abort_all();

        assert_ne!(handle.await.unwrap(), RunReport::Committed);
        assert!(cell.get().data.is_none());
        assert_eq!(orchestrator.in_flight_count(), 0);
    }
}
