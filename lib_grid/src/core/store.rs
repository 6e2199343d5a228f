//! # Store
//!
//! Named reactive cells, one per logical dataset. A [`Cell`] is a cheap,
//! cloneable handle: clones share the same state. Consumers read with
//! [`Cell::get`], react with [`Cell::subscribe`] or [`Cell::watch`], and never
//! write. Only the orchestrator in this crate calls `set`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::transform::{
    CumulativePricePoint, DailyAverage, DispatchStack, DpvPoint, ElecSummary, FacilityLocation,
    FuelMixItem, PulseSnapshot, RawRow, SevenDayOutlook, TimeSeriesPoint,
};

/// Lifecycle of a cell: `Idle` until the first fetch, then alternating
/// between `Loading` and one of `Ready`/`Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Snapshot of one cell.
///
/// `data` is only ever replaced by a successful fetch, so after a failure it
/// still holds the last good payload. `fetched_at` is epoch milliseconds of
/// that commit, `0` when nothing has been fetched yet.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<String>,
    pub fetched_at: i64,
    pub status: CellStatus,
}

// Derived Clone would demand `T: Clone`; only the Arc is cloned here.
impl<T> Clone for CellState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            status: self.status,
        }
    }
}

impl<T> Default for CellState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> CellState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            fetched_at: 0,
            status: CellStatus::Idle,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == CellStatus::Loading
    }

    /// Same data and timestamp, status `Loading`, error cleared.
    pub fn to_loading(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: None,
            fetched_at: self.fetched_at,
            status: CellStatus::Loading,
        }
    }

    /// The state a `Loading` snapshot stands for once nothing is in flight:
    /// `Ready` when it holds data, `Idle` otherwise. Other states are
    /// returned unchanged.
    pub fn settled(&self) -> Self {
        if !self.is_loading() {
            return self.clone();
        }
        let status = if self.data.is_some() {
            CellStatus::Ready
        } else {
            CellStatus::Idle
        };
        Self {
            status,
            ..self.to_loading()
        }
    }

    /// A successful commit of `data` at `now`.
    pub fn ready(data: T, now: i64) -> Self {
        Self {
            data: Some(Arc::new(data)),
            error: None,
            fetched_at: now,
            status: CellStatus::Ready,
        }
    }

    /// Keeps the data and timestamp of `previous` and records `message`.
    pub fn failed_from(previous: &Self, message: String) -> Self {
        Self {
            data: previous.data.clone(),
            error: Some(message),
            fetched_at: previous.fetched_at,
            status: CellStatus::Error,
        }
    }
}

/// Process-unique cell identity; the orchestrator keys in-flight work on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

impl CellId {
    fn next() -> Self {
        CellId(NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener<T> = Arc<dyn Fn(&CellState<T>) + Send + Sync>;

struct CellInner<T> {
    id: CellId,
    name: String,
    tx: watch::Sender<CellState<T>>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_listener: AtomicU64,
}

impl<T> CellInner<T> {
    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener<T>)>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// # Cell
///
/// Shared handle to one dataset's cached state.
pub struct Cell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.tx.borrow();
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &state.status)
            .field("fetched_at", &state.fetched_at)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Cell<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(CellState::idle());
        Self {
            inner: Arc::new(CellInner {
                id: CellId::next(),
                name: name.into(),
                tx,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    pub fn id(&self) -> CellId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current snapshot. Never blocks on a fetch.
    pub fn get(&self) -> CellState<T> {
        self.inner.tx.borrow().clone()
    }

    /// Replaces the whole state and notifies every listener and watcher.
    pub(crate) fn set(&self, next: CellState<T>) {
        self.inner.tx.send_replace(next.clone());
        // Listeners run outside the lock so they may subscribe or unsubscribe.
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&next);
        }
    }

    /// Calls `listener` with the new snapshot after every change until the
    /// returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CellState<T>) + Send + Sync + 'static,
    {
        let listener_id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((listener_id, Arc::new(listener)));

        let weak: Weak<CellInner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners().retain(|(id, _)| *id != listener_id);
                }
            })),
        }
    }

    /// Async view of the same state, for consumers that prefer `changed().await`.
    pub fn watch(&self) -> watch::Receiver<CellState<T>> {
        self.inner.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

/// Live listener registration on a [`Cell`]. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// # Store
///
/// Every cell the data layer maintains. Built once per process and shared
/// by the hub, the poller and the consumers.
#[derive(Debug)]
pub struct Store {
    pub nem_elec_summary: Cell<ElecSummary>,
    pub nem_price_and_demand_30: Cell<Vec<TimeSeriesPoint>>,
    pub nem_price_and_demand_5: Cell<Vec<TimeSeriesPoint>>,
    pub nem_cumulative_price: Cell<Vec<CumulativePricePoint>>,
    pub nem_market_price_limits: Cell<BTreeMap<String, Value>>,
    pub nem_fuel_mix: Cell<Vec<FuelMixItem>>,
    pub nem_seven_day_outlook: Cell<SevenDayOutlook>,
    pub wem_pulse: Cell<PulseSnapshot>,
    pub wem_facility_meta: Cell<Vec<RawRow>>,
    pub wem_fuel_mix: Cell<Vec<FuelMixItem>>,
    pub wem_dispatch: Cell<DispatchStack>,
    pub wem_generation_stack: Cell<DispatchStack>,
    pub wem_facilities: Cell<Vec<FacilityLocation>>,
    pub wem_dpv_demand: Cell<Vec<DpvPoint>>,
    daily_prices: Mutex<HashMap<String, Cell<Vec<DailyAverage>>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            nem_elec_summary: Cell::new("nem:elecSummary"),
            nem_price_and_demand_30: Cell::new("nem:priceAndDemand:30"),
            nem_price_and_demand_5: Cell::new("nem:priceAndDemand:5"),
            nem_cumulative_price: Cell::new("nem:cumulativePrice"),
            nem_market_price_limits: Cell::new("nem:marketPriceLimits"),
            nem_fuel_mix: Cell::new("nem:fuelMix"),
            nem_seven_day_outlook: Cell::new("nem:sevenDayOutlook"),
            wem_pulse: Cell::new("wem:pulse"),
            wem_facility_meta: Cell::new("wem:facilityMeta"),
            wem_fuel_mix: Cell::new("wem:fuelMix"),
            wem_dispatch: Cell::new("wem:dispatch"),
            wem_generation_stack: Cell::new("wem:generationStack"),
            wem_facilities: Cell::new("wem:facilities"),
            wem_dpv_demand: Cell::new("wem:dpvDemand"),
            daily_prices: Mutex::new(HashMap::new()),
        }
    }

    /// `YYYY-MM`, the key daily price cells are stored under.
    pub fn month_key(year: i32, month: u32) -> String {
        format!("{year}-{month:02}")
    }

    /// The daily price cell of one month, created on first use. Repeated
    /// calls for the same month return the same cell.
    pub fn daily_prices(&self, year: i32, month: u32) -> Cell<Vec<DailyAverage>> {
        let key = Self::month_key(year, month);
        let mut cells = self
            .daily_prices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cells
            .entry(key)
            .or_insert_with_key(|key| Cell::new(format!("nem:dailyPrices:{key}")))
            .clone()
    }

    /// Months that currently have a daily price cell, sorted.
    pub fn daily_price_months(&self) -> Vec<String> {
        let cells = self
            .daily_prices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut months: Vec<String> = cells.keys().cloned().collect();
        months.sort();
        months
    }
}
