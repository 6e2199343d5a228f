//! # Poll Registry
//!
//! Reference-counted registry of datasets that someone currently wants kept
//! warm. Entries are keyed by dataset key, not by cell, so several consumers
//! of the same dataset share one entry. A fixed 60 second tick sweeps the
//! entries and hands every stale one to the [`Orchestrator`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::actions::{should_fetch_at, FetchFn, Orchestrator, RunReport};
use super::store::Cell;

/// Sweep interval. Not configurable per dataset.
pub const POLL_TICK: Duration = Duration::from_secs(60);

/// A registered (cell, fetch, freshness) triple with its type erased.
trait PollJob: Send + Sync {
    fn is_stale(&self, now: i64) -> bool;
    fn fetch(&self, orchestrator: Arc<Orchestrator>) -> BoxFuture<'static, RunReport>;
}

struct CellJob<T> {
    cell: Cell<T>,
    fetch: FetchFn<T>,
    freshness_ms: u64,
}

impl<T: Send + Sync + 'static> PollJob for CellJob<T> {
    fn is_stale(&self, now: i64) -> bool {
        should_fetch_at(&self.cell.get(), self.freshness_ms, now)
    }

    fn fetch(&self, orchestrator: Arc<Orchestrator>) -> BoxFuture<'static, RunReport> {
        let cell = self.cell.clone();
        let fetch = Arc::clone(&self.fetch);
        async move { orchestrator.run(&cell, &fetch).await }.boxed()
    }
}

struct PollEntry {
    refs: u32,
    job: Arc<dyn PollJob>,
}

type Entries = Arc<Mutex<HashMap<String, PollEntry>>>;

fn lock_entries(
    entries: &Mutex<HashMap<String, PollEntry>>,
) -> MutexGuard<'_, HashMap<String, PollEntry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// # Poller
///
/// Holds no data; it only triggers fetches into cells owned by the store.
pub struct Poller {
    entries: Entries,
    orchestrator: Arc<Orchestrator>,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("keys", &self.keys())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Poller {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            orchestrator,
            shutdown: Mutex::new(None),
        }
    }

    /// Registers interest in `key`.
    ///
    /// The first registration creates the entry; later ones only bump the
    /// reference count and keep the original cell and fetch function. The
    /// entry goes away when the last [`PollRegistration`] is released.
    pub fn register<T>(
        &self,
        key: &str,
        cell: &Cell<T>,
        fetch: FetchFn<T>,
        freshness_ms: u64,
    ) -> PollRegistration
    where
        T: Send + Sync + 'static,
    {
        let mut entries = lock_entries(&self.entries);
        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            debug!(key, freshness_ms, "poll entry created");
            PollEntry {
                refs: 0,
                job: Arc::new(CellJob {
                    cell: cell.clone(),
                    fetch,
                    freshness_ms,
                }),
            }
        });
        entry.refs += 1;

        PollRegistration {
            key: key.to_string(),
            entries: Some(Arc::downgrade(&self.entries)),
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        lock_entries(&self.entries).contains_key(key)
    }

    /// Number of live registrations for `key`, `0` when absent.
    pub fn ref_count(&self, key: &str) -> u32 {
        lock_entries(&self.entries).get(key).map_or(0, |entry| entry.refs)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock_entries(&self.entries).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// One sweep: spawns a fetch for every registered entry whose cell is
    /// stale and not loading. Returns the spawned tasks.
    pub fn tick(&self) -> Vec<JoinHandle<RunReport>> {
        let now = self.orchestrator.now();
        let stale: Vec<(String, Arc<dyn PollJob>)> = lock_entries(&self.entries)
            .iter()
            .filter(|(_, entry)| entry.job.is_stale(now))
            .map(|(key, entry)| (key.clone(), Arc::clone(&entry.job)))
            .collect();

        stale
            .into_iter()
            .map(|(key, job)| {
                debug!(key = %key, "poll refresh");
                tokio::spawn(job.fetch(Arc::clone(&self.orchestrator)))
            })
            .collect()
    }

    /// Starts the background tick. The first sweep happens one
    /// [`POLL_TICK`] from now. Returns `false` if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut shutdown = self.shutdown.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if shutdown.is_some() {
            return false;
        }
        let token = CancellationToken::new();
        *shutdown = Some(token.clone());

        let poller: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + POLL_TICK, POLL_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(every_secs = POLL_TICK.as_secs(), "poller started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(poller) = poller.upgrade() else { break };
                        poller.tick();
                    }
                }
            }
            info!("poller stopped");
        });
        true
    }

    /// Stops the background tick. Registrations stay in place.
    pub fn stop(&self) {
        let token = self.shutdown.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Keeps one registration alive. Released explicitly with
/// [`PollRegistration::unregister`] or on drop, exactly once either way.
#[must_use = "dropping the registration unregisters immediately"]
pub struct PollRegistration {
    key: String,
    entries: Option<Weak<Mutex<HashMap<String, PollEntry>>>>,
}

impl PollRegistration {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(entries) = self.entries.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let mut entries = lock_entries(&entries);
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs == 0 {
                entries.remove(&self.key);
                debug!(key = %self.key, "poll entry removed");
            }
        }
    }
}

impl Drop for PollRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PollRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollRegistration")
            .field("key", &self.key)
            .field("active", &self.entries.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actions::fetch_fn;
    use crate::core::store::{CellState, CellStatus};
    use crate::retrieve::outcome::FetchOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(counter: &Arc<AtomicUsize>) -> FetchFn<usize> {
        let counter = Arc::clone(counter);
        fetch_fn(move |_token| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(FetchOutcome::Succeeded(n)) }
        })
    }

    fn poller() -> Arc<Poller> {
        Arc::new(Poller::new(Arc::new(Orchestrator::new())))
    }

    #[tokio::test]
    async fn registrations_are_refcounted_by_key() {
        let poller = poller();
        let cell: Cell<usize> = Cell::new("nem:fuelMix");
        let counter = Arc::new(AtomicUsize::new(0));

        let first = poller.register("nem:fuelMix", &cell, counting_fetch(&counter), 60_000);
        let second = poller.register("nem:fuelMix", &cell, counting_fetch(&counter), 60_000);
        assert_eq!(poller.ref_count("nem:fuelMix"), 2);

        first.unregister();
        assert!(poller.is_registered("nem:fuelMix"));
        assert_eq!(poller.ref_count("nem:fuelMix"), 1);

        drop(second);
        assert!(!poller.is_registered("nem:fuelMix"));
        assert!(poller.keys().is_empty());
    }

    #[tokio::test]
    async fn released_registration_never_decrements_twice() {
        let poller = poller();
        let cell: Cell<usize> = Cell::new("wem:pulse");
        let counter = Arc::new(AtomicUsize::new(0));

        let keep = poller.register("wem:pulse", &cell, counting_fetch(&counter), 1);
        let gone = poller.register("wem:pulse", &cell, counting_fetch(&counter), 1);
        gone.unregister();
        assert_eq!(poller.ref_count("wem:pulse"), 1);
        drop(keep);
        assert_eq!(poller.ref_count("wem:pulse"), 0);
    }

    #[tokio::test]
    async fn tick_fetches_only_stale_entries() {
        let poller = poller();
        let fresh: Cell<usize> = Cell::new("fresh");
        let stale: Cell<usize> = Cell::new("stale");
        fresh.set(CellState::ready(0, poller.orchestrator.now()));

        let fresh_count = Arc::new(AtomicUsize::new(0));
        let stale_count = Arc::new(AtomicUsize::new(0));
        let _a = poller.register("fresh", &fresh, counting_fetch(&fresh_count), 60_000);
        let _b = poller.register("stale", &stale, counting_fetch(&stale_count), 60_000);

        let handles = poller.tick();
        assert_eq!(handles.len(), 1);
        for handle in handles {
            assert_eq!(handle.await.unwrap(), RunReport::Committed);
        }

        assert_eq!(fresh_count.load(Ordering::SeqCst), 0);
        assert_eq!(stale_count.load(Ordering::SeqCst), 1);
        assert_eq!(stale.get().status, CellStatus::Ready);
    }

    #[tokio::test]
    async fn tick_skips_loading_cells() {
        let poller = poller();
        let cell: Cell<usize> = Cell::new("busy");
        cell.set(CellState::idle().to_loading());
        let counter = Arc::new(AtomicUsize::new(0));
        let _reg = poller.register("busy", &cell, counting_fetch(&counter), 0);

        assert!(poller.tick().is_empty());
    }

    #[tokio::test]
    async fn unregistered_keys_are_not_polled() {
        let poller = poller();
        let cell: Cell<usize> = Cell::new("wem:dpvDemand");
        let counter = Arc::new(AtomicUsize::new(0));
        poller
            .register("wem:dpvDemand", &cell, counting_fetch(&counter), 0)
            .unregister();

        assert!(poller.tick().is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_tick_runs_every_minute() {
        let poller = poller();
        let cell: Cell<usize> = Cell::new("nem:elecSummary");
        let counter = Arc::new(AtomicUsize::new(0));
        let _reg = poller.register("nem:elecSummary", &cell, counting_fetch(&counter), 0);

        assert!(poller.start());
        assert!(!poller.start());

        tokio::time::sleep(POLL_TICK - Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        poller.stop();
        assert!(!poller.is_running());
        tokio::time::sleep(POLL_TICK * 3).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
