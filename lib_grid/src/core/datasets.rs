//! # Datasets
//!
//! The read interface consumers use. A [`Dataset`] ties a dataset key to its
//! store cell, its fetch function and its freshness threshold, and offers the
//! gate + orchestrator pair ([`Dataset::fetch_if_stale`]) and poll
//! registration ([`Dataset::register`]). [`FeedHub`] builds every dataset
//! from one [`GridConfig`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::actions::{fetch_fn, FetchFn, Orchestrator, RunReport};
use super::registry::{PollRegistration, Poller};
use super::store::{Cell, CellState, Store, Subscription};
use crate::configs::GridConfig;
use crate::loggers::loggerlocal::LoggerLocal;
use crate::markets::nem::{NemApi, Timescale};
use crate::markets::wem::WemApi;
use crate::retrieve::ky_http::ClientOptions;
use crate::retrieve::outcome::{join_outcomes, FetchError, FetchResult};
use crate::transform::{self, wem as wem_transform, RawRow};
use crate::transform::{
    CumulativePricePoint, DailyAverage, DispatchStack, DpvPoint, ElecSummary, FacilityLocation,
    FuelMixItem, PulseSnapshot, SevenDayOutlook, TimeSeriesPoint,
};

/// NEM fuel mix type requested by the `nem:fuelMix` dataset.
pub const NEM_FUEL_MIX_TYPE: &str = "CURRENT";

/// # Dataset
///
/// One logical dataset as seen by a consumer.
pub struct Dataset<T> {
    key: String,
    cell: Cell<T>,
    fetch: FetchFn<T>,
    freshness_ms: u64,
    orchestrator: Arc<Orchestrator>,
    poller: Arc<Poller>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            cell: self.cell.clone(),
            fetch: Arc::clone(&self.fetch),
            freshness_ms: self.freshness_ms,
            orchestrator: Arc::clone(&self.orchestrator),
            poller: Arc::clone(&self.poller),
        }
    }
}

impl<T> fmt::Debug for Dataset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("key", &self.key)
            .field("cell", &self.cell)
            .field("freshness_ms", &self.freshness_ms)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Dataset<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cell(&self) -> &Cell<T> {
        &self.cell
    }

    pub fn freshness_ms(&self) -> u64 {
        self.freshness_ms
    }

    pub fn get(&self) -> CellState<T> {
        self.cell.get()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CellState<T>) + Send + Sync + 'static,
    {
        self.cell.subscribe(listener)
    }

    /// Fetches when the cell is stale. `None` means the gate skipped it.
    pub async fn fetch_if_stale(&self) -> Option<RunReport> {
        self.orchestrator
            .fetch_if_stale(&self.cell, &self.fetch, self.freshness_ms)
            .await
    }

    /// Fetches regardless of freshness, cancelling any fetch in flight.
    pub async fn refresh(&self) -> RunReport {
        self.orchestrator.run(&self.cell, &self.fetch).await
    }

    /// Keeps the dataset warm until the registration is released.
    pub fn register(&self) -> PollRegistration {
        self.poller
            .register(&self.key, &self.cell, Arc::clone(&self.fetch), self.freshness_ms)
    }
}

fn client_options(config: &GridConfig) -> ClientOptions {
    ClientOptions {
        timeout: config.request_timeout(),
        retry_limit: config.retry_limit,
        retry_status_codes: config.retry_status_codes.clone(),
        ..ClientOptions::default()
    }
}

/// # Feed Hub
///
/// Built once per process. Owns the store, both source clients, the
/// orchestrator and the poller, and hands out [`Dataset`]s over them.
pub struct FeedHub {
    config: GridConfig,
    timezone: Tz,
    store: Arc<Store>,
    nem: Arc<NemApi>,
    wem: Arc<WemApi>,
    orchestrator: Arc<Orchestrator>,
    poller: Arc<Poller>,
    logger: Arc<LoggerLocal>,
}

impl fmt::Debug for FeedHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHub")
            .field("nem_base", &self.config.nem_base)
            .field("wem_base", &self.config.wem_base)
            .field("timezone", &self.timezone)
            .field("poller", &self.poller)
            .finish()
    }
}

impl FeedHub {
    /// Validates `config` and builds both source clients.
    ///
    /// # Errors
    /// Fails on an invalid configuration or a base URL the HTTP client
    /// cannot use.
    pub fn new(config: GridConfig) -> anyhow::Result<Self> {
        let logger = Arc::new(LoggerLocal::new(
            config.app_name.clone(),
            Some(config.logger.clone()),
        ));
        Self::with_logger(config, logger)
    }

    /// Same as [`FeedHub::new`] with a caller-supplied logger.
    pub fn with_logger(config: GridConfig, logger: Arc<LoggerLocal>) -> anyhow::Result<Self> {
        config.validate().context("invalid grid configuration")?;
        let timezone = config.timezone()?;
        let options = client_options(&config);

        let nem = NemApi::new(
            &config.nem_base,
            &config.nem_api_key,
            options.clone(),
            Arc::clone(&logger),
        )
        .with_context(|| format!("NEM client for {}", config.nem_base))?;
        let wem = WemApi::new(&config.wem_base, options, Arc::clone(&logger))
            .with_context(|| format!("WEM client for {}", config.wem_base))?;

        let orchestrator = Arc::new(Orchestrator::new());
        let poller = Arc::new(Poller::new(Arc::clone(&orchestrator)));

        info!(nem = %config.nem_base, wem = %config.wem_base, tz = %timezone, "feed hub ready");
        Ok(Self {
            config,
            timezone,
            store: Arc::new(Store::new()),
            nem: Arc::new(nem),
            wem: Arc::new(wem),
            orchestrator,
            poller,
            logger,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn logger(&self) -> &Arc<LoggerLocal> {
        &self.logger
    }

    /// Starts the 60 second poll tick. `false` if it was already running.
    pub fn start_polling(&self) -> bool {
        self.poller.start()
    }

    /// Stops polling and cancels every in-flight fetch.
    pub fn shutdown(&self) {
        self.poller.stop();
        self.orchestrator.abort_all();
    }

    fn dataset<T>(
        &self,
        key: impl Into<String>,
        cell: &Cell<T>,
        freshness_ms: u64,
        fetch: FetchFn<T>,
    ) -> Dataset<T>
    where
        T: Send + Sync + 'static,
    {
        Dataset {
            key: key.into(),
            cell: cell.clone(),
            fetch,
            freshness_ms,
            orchestrator: Arc::clone(&self.orchestrator),
            poller: Arc::clone(&self.poller),
        }
    }

    fn nem_fetch<T, F, Fut>(&self, call: F) -> FetchFn<T>
    where
        F: Fn(Arc<NemApi>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let nem = Arc::clone(&self.nem);
        fetch_fn(move |token| call(Arc::clone(&nem), token))
    }

    fn wem_fetch<T, F, Fut>(&self, call: F) -> FetchFn<T>
    where
        F: Fn(Arc<WemApi>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let wem = Arc::clone(&self.wem);
        fetch_fn(move |token| call(Arc::clone(&wem), token))
    }

    // NEM

    pub fn nem_elec_summary(&self) -> Dataset<ElecSummary> {
        let fetch = self.nem_fetch(|nem, token| async move { nem.elec_summary(&token).await });
        self.dataset(
            "nem:elecSummary",
            &self.store.nem_elec_summary,
            self.config.freshness.nem_ms,
            fetch,
        )
    }

    pub fn nem_price_and_demand(&self, timescale: Timescale) -> Dataset<Vec<TimeSeriesPoint>> {
        let cell = match timescale {
            Timescale::ThirtyMin => &self.store.nem_price_and_demand_30,
            Timescale::FiveMin => &self.store.nem_price_and_demand_5,
        };
        let fetch = self.nem_fetch(move |nem, token| async move {
            nem.price_and_demand(timescale, &token).await
        });
        self.dataset(
            format!("nem:priceAndDemand:{}", timescale.minutes()),
            cell,
            self.config.freshness.nem_ms,
            fetch,
        )
    }

    pub fn nem_cumulative_price(&self) -> Dataset<Vec<CumulativePricePoint>> {
        let fetch = self.nem_fetch(|nem, token| async move { nem.cumulative_price(&token).await });
        self.dataset(
            "nem:cumulativePrice",
            &self.store.nem_cumulative_price,
            self.config.freshness.nem_ms,
            fetch,
        )
    }

    pub fn nem_market_price_limits(&self) -> Dataset<BTreeMap<String, Value>> {
        let fetch =
            self.nem_fetch(|nem, token| async move { nem.market_price_limits(&token).await });
        self.dataset(
            "nem:marketPriceLimits",
            &self.store.nem_market_price_limits,
            self.config.freshness.nem_ms,
            fetch,
        )
    }

    pub fn nem_fuel_mix(&self) -> Dataset<Vec<FuelMixItem>> {
        let fetch = self.nem_fetch(|nem, token| async move {
            nem.fuel_mix(NEM_FUEL_MIX_TYPE, &token).await
        });
        self.dataset(
            "nem:fuelMix",
            &self.store.nem_fuel_mix,
            self.config.freshness.nem_ms,
            fetch,
        )
    }

    pub fn nem_seven_day_outlook(&self) -> Dataset<SevenDayOutlook> {
        let fetch = self.nem_fetch(|nem, token| async move { nem.seven_day_outlook(&token).await });
        self.dataset(
            "nem:sevenDayOutlook",
            &self.store.nem_seven_day_outlook,
            self.config.freshness.nem_ms,
            fetch,
        )
    }

    /// Daily averages of one month. An out-of-range `month` still yields a
    /// dataset; fetching it records the argument error on its cell.
    pub fn nem_daily_prices(&self, year: i32, month: u32) -> Dataset<Vec<DailyAverage>> {
        let cell = self.store.daily_prices(year, month);
        let fetch = self.nem_fetch(move |nem, token| async move {
            nem.daily_average_prices(year, month, &token).await
        });
        self.dataset(
            format!("nem:dailyPrices:{}", Store::month_key(year, month)),
            &cell,
            self.config.freshness.nem_ms,
            fetch,
        )
    }

    /// Daily averages of the current month on the market clock.
    pub fn nem_daily_prices_current_month(&self) -> Dataset<Vec<DailyAverage>> {
        let today = Utc::now().with_timezone(&self.timezone);
        self.nem_daily_prices(today.year(), today.month())
    }

    // WEM

    pub fn wem_pulse(&self) -> Dataset<PulseSnapshot> {
        let fetch = self.wem_fetch(|wem, token| async move {
            let pulse = wem.pulse(&token).await?;
            Ok::<_, FetchError>(pulse.map(|rows| wem_transform::normalise_pulse(&rows)))
        });
        self.dataset(
            "wem:pulse",
            &self.store.wem_pulse,
            self.config.freshness.wem_ms,
            fetch,
        )
    }

    /// Raw facility metadata rows (fuel, capacity, coordinates).
    pub fn wem_facility_meta(&self) -> Dataset<Vec<RawRow>> {
        let fetch = self.wem_fetch(|wem, token| async move { wem.facility_meta(&token).await });
        self.dataset(
            "wem:facilityMeta",
            &self.store.wem_facility_meta,
            self.config.freshness.static_ms,
            fetch,
        )
    }

    /// Generation joined to facility fuels, summed per fuel.
    pub fn wem_fuel_mix(&self) -> Dataset<Vec<FuelMixItem>> {
        let fetch = self.wem_fetch(|wem, token| async move {
            let (generation, meta) =
                tokio::join!(wem.generation(&token), wem.facility_meta(&token));
            Ok::<_, FetchError>(
                join_outcomes(generation?, meta?)
                    .map(|(generation, meta)| wem_transform::join_fuel_mix(&generation, &meta)),
            )
        });
        self.dataset(
            "wem:fuelMix",
            &self.store.wem_fuel_mix,
            self.config.freshness.wem_generation_ms,
            fetch,
        )
    }

    /// Stacked generation over the last 96 periods.
    pub fn wem_dispatch(&self) -> Dataset<DispatchStack> {
        let fetch = self.wem_fetch(|wem, token| async move {
            let (intervals, meta) =
                tokio::join!(wem.intervals96(&token), wem.facility_meta(&token));
            Ok::<_, FetchError>(join_outcomes(intervals?, meta?).map(|(intervals, meta)| {
                wem_transform::build_dispatch_stack(&intervals, &meta)
            }))
        });
        self.dataset(
            "wem:dispatch",
            &self.store.wem_dispatch,
            self.config.freshness.wem_ms,
            fetch,
        )
    }

    /// Stacked generation from the `I01..I48` offset columns.
    pub fn wem_generation_stack(&self) -> Dataset<DispatchStack> {
        let width = self.config.interval_width();
        let fetch = self.wem_fetch(move |wem, token| async move {
            let (generation, meta) =
                tokio::join!(wem.generation(&token), wem.facility_meta(&token));
            Ok::<_, FetchError>(join_outcomes(generation?, meta?).map(|(generation, meta)| {
                wem_transform::build_dispatch_stack_from_offsets(&generation, &meta, width)
            }))
        });
        self.dataset(
            "wem:generationStack",
            &self.store.wem_generation_stack,
            self.config.freshness.wem_generation_ms,
            fetch,
        )
    }

    /// Facilities with coordinates and their latest output.
    pub fn wem_facilities(&self) -> Dataset<Vec<FacilityLocation>> {
        let fetch = self.wem_fetch(|wem, token| async move {
            let (generation, meta) =
                tokio::join!(wem.generation(&token), wem.facility_meta(&token));
            Ok::<_, FetchError>(
                join_outcomes(generation?, meta?)
                    .map(|(generation, meta)| wem_transform::build_facilities(&generation, &meta)),
            )
        });
        self.dataset(
            "wem:facilities",
            &self.store.wem_facilities,
            self.config.freshness.wem_generation_ms,
            fetch,
        )
    }

    pub fn wem_dpv_demand(&self) -> Dataset<Vec<DpvPoint>> {
        let fetch = self.wem_fetch(|wem, token| async move {
            let dpv = wem.dpv_demand(&token).await?;
            Ok::<_, FetchError>(dpv.map(|rows| wem_transform::normalise_dpv(&rows)))
        });
        self.dataset(
            "wem:dpvDemand",
            &self.store.wem_dpv_demand,
            self.config.freshness.wem_ms,
            fetch,
        )
    }

    /// Renewable share of the cached NEM fuel mix for one region, or all
    /// regions when `region` is `None`. `None` until the mix is fetched.
    pub fn nem_renewable_share(&self, region: Option<&str>) -> Option<transform::RenewableShare> {
        let mix = self.store.nem_fuel_mix.get().data?;
        Some(transform::fuel::renewable_share_for(&mix, region))
    }

    /// Renewable share of the cached WEM fuel mix.
    pub fn wem_renewable_share(&self) -> Option<transform::RenewableShare> {
        let mix = self.store.wem_fuel_mix.get().data?;
        Some(transform::fuel::renewable_share(&mix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::CellStatus;
    use crate::loggers::loggerlocal::LoggerLocalOptions;
    use crate::markets::wem::infographic::{FACILITY_META_PATH, GENERATION_PATH, PULSE_PATH};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NEM_PREFIX: &str = "/NEM/v1/PWS/NEMDashboard";

    fn hub(nem: &MockServer, wem: &MockServer) -> FeedHub {
        let config = GridConfig {
            nem_base: nem.uri(),
            wem_base: wem.uri(),
            nem_api_key: "test-key".to_string(),
            request_timeout_ms: 2_000,
            retry_limit: 0,
            logger: LoggerLocalOptions::default(),
            ..GridConfig::default()
        };
        FeedHub::new(config).unwrap()
    }

    fn csv_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(body.to_string())
    }

    #[tokio::test]
    async fn nem_fuel_mix_fetches_once_while_fresh() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{NEM_PREFIX}/fuelMix")))
            .and(query_param("type", "CURRENT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"items": [
                    {"fuelType": "Black coal", "supply": 9000.0, "state": "NSW1"},
                    {"fuelType": "Wind", "supply": 1500.0, "state": "NSW1"},
                    {"fuelType": "Solar", "supply": 0.0, "state": "NSW1"}
                ]}
            })))
            .expect(1)
            .mount(&nem)
            .await;

        let hub = hub(&nem, &wem);
        let dataset = hub.nem_fuel_mix();
        assert_eq!(dataset.key(), "nem:fuelMix");

        assert_eq!(dataset.fetch_if_stale().await, Some(RunReport::Committed));
        assert_eq!(dataset.fetch_if_stale().await, None);

        let state = dataset.get();
        assert_eq!(state.status, CellStatus::Ready);
        let mix = state.data.unwrap();
        assert_eq!(mix.len(), 2);
        let share = hub.nem_renewable_share(Some("NSW1")).unwrap();
        assert!(share.renewable > 0.0);
    }

    #[tokio::test]
    async fn nem_failure_keeps_previous_snapshot() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{NEM_PREFIX}/cumulativePrice")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"items": [{"r": "SA1", "dt": "2026-02-05T08:00:00", "cp": 1200.5}]}
            })))
            .up_to_n_times(1)
            .mount(&nem)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{NEM_PREFIX}/cumulativePrice")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&nem)
            .await;

        let hub = hub(&nem, &wem);
        let dataset = hub.nem_cumulative_price();
        assert_eq!(dataset.refresh().await, RunReport::Committed);
        let first = dataset.get();

        assert_eq!(dataset.refresh().await, RunReport::Failed);
        let second = dataset.get();
        assert_eq!(second.status, CellStatus::Error);
        assert_eq!(second.data, first.data);
        assert_eq!(second.fetched_at, first.fetched_at);
        assert!(second.error.is_some());
    }

    #[tokio::test]
    async fn invalid_month_surfaces_as_cell_error() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        let hub = hub(&nem, &wem);

        let dataset = hub.nem_daily_prices(2026, 13);
        assert_eq!(dataset.key(), "nem:dailyPrices:2026-13");
        assert_eq!(dataset.refresh().await, RunReport::Failed);
        let state = dataset.get();
        assert!(state.error.unwrap().contains("month 13"));
        assert!(state.data.is_none());
    }

    #[tokio::test]
    async fn current_month_uses_market_clock_key() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        let hub = hub(&nem, &wem);
        let dataset = hub.nem_daily_prices_current_month();
        assert!(dataset.key().starts_with("nem:dailyPrices:"));
        assert_eq!(dataset.key().len(), "nem:dailyPrices:2026-02".len());
    }

    #[tokio::test]
    async fn wem_fuel_mix_joins_both_files() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{GENERATION_PATH}")))
            .respond_with(csv_response("FACILITY_CODE,I01\nG1,200\nG2,-5\nW1,80\n"))
            .mount(&wem)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{FACILITY_META_PATH}")))
            .respond_with(csv_response("FACILITY_CODE,PRIMARY_FUEL\nG1,Coal\nG2,Coal\nW1,Wind\n"))
            .mount(&wem)
            .await;

        let hub = hub(&nem, &wem);
        let dataset = hub.wem_fuel_mix();
        assert_eq!(dataset.refresh().await, RunReport::Committed);

        let mix = dataset.get().data.unwrap();
        let coal = mix.iter().find(|item| item.fuel_type == "Coal").unwrap();
        assert_eq!(coal.supply, 200.0);
        assert!(mix.iter().any(|item| item.fuel_type == "Wind" && item.supply == 80.0));
        assert!(hub.wem_renewable_share().is_some());
    }

    #[tokio::test]
    async fn joined_dataset_fails_when_either_file_fails() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{GENERATION_PATH}")))
            .respond_with(csv_response("FACILITY_CODE,I01\nG1,200\n"))
            .mount(&wem)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{FACILITY_META_PATH}")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&wem)
            .await;

        let hub = hub(&nem, &wem);
        let dataset = hub.wem_facilities();
        assert_eq!(dataset.refresh().await, RunReport::Failed);
        assert_eq!(dataset.get().status, CellStatus::Error);
        assert!(dataset.get().data.is_none());
    }

    #[tokio::test]
    async fn pulse_dataset_normalises_rows() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{PULSE_PATH}")))
            .respond_with(csv_response(
                "TRADING_DAY_INTERVAL,ENERGY_PRICE,FORECAST_EOI_MW\n\
                 2026-02-05 08:00:00,45,3000\n\
                 2026-02-05 08:30:00,,3100\n",
            ))
            .mount(&wem)
            .await;

        let hub = hub(&nem, &wem);
        let dataset = hub.wem_pulse();
        assert_eq!(dataset.refresh().await, RunReport::Committed);
        let pulse = dataset.get().data.unwrap();
        assert_eq!(pulse.time_series.len(), 2);
    }

    #[tokio::test]
    async fn registering_a_dataset_twice_shares_one_entry() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        let hub = hub(&nem, &wem);

        let first = hub.wem_dpv_demand().register();
        let second = hub.wem_dpv_demand().register();
        assert_eq!(hub.poller().ref_count("wem:dpvDemand"), 2);
        drop(first);
        drop(second);
        assert!(!hub.poller().is_registered("wem:dpvDemand"));
    }

    #[tokio::test]
    async fn price_and_demand_keys_follow_timescale() {
        let nem = MockServer::start().await;
        let wem = MockServer::start().await;
        let hub = hub(&nem, &wem);
        assert_eq!(hub.nem_price_and_demand(Timescale::ThirtyMin).key(), "nem:priceAndDemand:30");
        let five = hub.nem_price_and_demand(Timescale::FiveMin);
        assert_eq!(five.key(), "nem:priceAndDemand:5");
        assert_eq!(five.cell().id(), hub.store().nem_price_and_demand_5.id());
    }
}
