//! # NEM Dashboard Endpoints
//!
//! Typed access to each dashboard dataset. Every method returns the
//! normalised entities for its endpoint; decoding and normalisation happen
//! here so callers only ever see the shared schema.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::apicall::{NemApiCall, NEM_DASHBOARD_PREFIX};
use crate::loggers::loggerlocal::LoggerLocal;
use crate::retrieve::ky_http::ClientOptions;
use crate::retrieve::outcome::{FetchError, FetchOutcome, FetchResult};
use crate::transform::nem::{self as nem_transform, ElecSummaryRaw, Items};
use crate::transform::{
    CumulativePricePoint, DailyAverage, ElecSummary, FuelMixItem, SevenDayOutlook, TimeSeriesPoint,
};

/// Resolution of the price and demand series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timescale {
    /// Pre-dispatch, 30-minute periods.
    ThirtyMin,
    /// Dispatch, 5-minute periods.
    FiveMin,
}

impl Timescale {
    /// Query value expected by the API.
    pub fn as_query(&self) -> &'static str {
        match self {
            Timescale::ThirtyMin => "30MIN",
            Timescale::FiveMin => "5MIN",
        }
    }

    /// Minutes per period, used in dataset keys.
    pub fn minutes(&self) -> u32 {
        match self {
            Timescale::ThirtyMin => 30,
            Timescale::FiveMin => 5,
        }
    }
}

impl fmt::Display for Timescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// Source A: the NEM dashboard JSON API.
pub struct NemApi {
    call: NemApiCall,
}

impl NemApi {
    pub fn new(
        base_url: &str,
        api_key: &str,
        options: ClientOptions,
        logger: Arc<LoggerLocal>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            call: NemApiCall::new(base_url, api_key, options, logger)?,
        })
    }

    fn path(endpoint: &str) -> String {
        format!("{NEM_DASHBOARD_PREFIX}{endpoint}")
    }

    async fn items<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        token: &CancellationToken,
    ) -> FetchOutcome<Vec<T>> {
        self.call
            .fetch_typed::<Items<T>>(&Self::path(endpoint), token)
            .await
            .map(|items| items.items)
    }

    /// Region summaries with decoded interconnector flows, plus the raw
    /// price table.
    pub async fn elec_summary(&self, token: &CancellationToken) -> FetchResult<ElecSummary> {
        let path = Self::path("elecSummary");
        let raw = match self.call.fetch_typed::<ElecSummaryRaw>(&path, token).await {
            FetchOutcome::Succeeded(raw) => raw,
            FetchOutcome::Failed(message) => return Ok(FetchOutcome::Failed(message)),
            FetchOutcome::Cancelled => return Ok(FetchOutcome::Cancelled),
        };

        let (summary, undecodable) = nem_transform::normalise_elec_summary(raw);
        if !undecodable.is_empty() {
            self.call
                .logger()
                .warn(
                    "[NemApi] interconnector flows could not be decoded",
                    Some(json!({"path": path, "regions": undecodable})),
                )
                .await;
        }
        Ok(FetchOutcome::Succeeded(summary))
    }

    pub async fn price_and_demand(
        &self,
        timescale: Timescale,
        token: &CancellationToken,
    ) -> FetchResult<Vec<TimeSeriesPoint>> {
        let endpoint = format!("priceAndDemand?timescale={}", timescale.as_query());
        Ok(self
            .items(&endpoint, token)
            .await
            .map(nem_transform::normalise_price_and_demand))
    }

    pub async fn cumulative_price(
        &self,
        token: &CancellationToken,
    ) -> FetchResult<Vec<CumulativePricePoint>> {
        Ok(self
            .items("cumulativePrice", token)
            .await
            .map(nem_transform::normalise_cumulative_price))
    }

    /// Market price limits keyed by limit name.
    pub async fn market_price_limits(
        &self,
        token: &CancellationToken,
    ) -> FetchResult<BTreeMap<String, Value>> {
        Ok(self
            .items("marketPriceLimits", token)
            .await
            .map(nem_transform::price_limits_map))
    }

    /// Fuel mix of the given type (`CURRENT` for the live mix).
    pub async fn fuel_mix(
        &self,
        mix_type: &str,
        token: &CancellationToken,
    ) -> FetchResult<Vec<FuelMixItem>> {
        let well_formed = mix_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if mix_type.trim().is_empty() || !well_formed {
            return Err(FetchError::InvalidArgument(format!("fuel mix type {mix_type:?}")));
        }
        let endpoint = format!("fuelMix?type={mix_type}");
        Ok(self
            .items(&endpoint, token)
            .await
            .map(nem_transform::normalise_fuel_mix))
    }

    /// Daily average prices of one month.
    ///
    /// # Errors
    /// `month` outside `1..=12` is a caller bug and returns
    /// [`FetchError::InvalidArgument`].
    pub async fn daily_average_prices(
        &self,
        year: i32,
        month: u32,
        token: &CancellationToken,
    ) -> FetchResult<Vec<DailyAverage>> {
        if !(1..=12).contains(&month) {
            return Err(FetchError::InvalidArgument(format!("month {month} is not in 1..=12")));
        }
        let endpoint = format!("dailyAveragePrices?year={year}&month={month:02}");
        Ok(self
            .items(&endpoint, token)
            .await
            .map(nem_transform::normalise_daily_averages))
    }

    pub async fn seven_day_outlook(
        &self,
        token: &CancellationToken,
    ) -> FetchResult<SevenDayOutlook> {
        Ok(self
            .items("sevenDayOutlook", token)
            .await
            .map(nem_transform::pivot_seven_day_outlook))
    }
}
