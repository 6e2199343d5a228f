//! Normalised, source-independent entity shapes.
//!
//! These are what the store cells hold and what consumers render. They
//! serialize to camelCase JSON so a front end can read them unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Region tag of the Western Australian market.
pub const WA_REGION: &str = "WA1";

/// Region tags of the interconnected eastern market.
pub const NEM_REGIONS: [&str; 5] = ["NSW1", "QLD1", "VIC1", "SA1", "TAS1"];

/// Whether a point is a settled interval or a forward projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodKind {
    Actual,
    Forecast,
}

/// Aggregate supply of one fuel in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelMixItem {
    pub fuel_type: String,
    pub supply: f64,
    pub region_tag: String,
}

/// One interval of price and demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub timestamp: String,
    pub region_tag: String,
    pub price: Option<f64>,
    pub demand: Option<f64>,
    pub period_kind: PeriodKind,
    pub net_interchange: Option<f64>,
    pub scheduled_generation: Option<f64>,
    pub semi_scheduled_generation: Option<f64>,
}

/// Mean price of one calendar day, formatted to two decimals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAverage {
    pub date: String,
    pub region_tag: String,
    pub avg_price: String,
}

/// Megawatts per fuel per period, ready for a stacked chart.
///
/// Every series in `series_by_fuel` has exactly `periods.len()` entries;
/// missing observations are zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStack {
    pub periods: Vec<String>,
    pub series_by_fuel: BTreeMap<String, Vec<f64>>,
    pub total_by_period: Vec<f64>,
    pub capacity_by_fuel: BTreeMap<String, f64>,
}

impl DispatchStack {
    /// True when there is nothing to chart.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Outage megawatts for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutageSample {
    pub timestamp: String,
    pub total: f64,
    pub planned: f64,
    pub forced: f64,
    pub consequential: f64,
}

/// Energy and essential-system-service prices for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EssPricePoint {
    pub timestamp: String,
    pub energy: Option<f64>,
    pub reg_raise: Option<f64>,
    pub reg_lower: Option<f64>,
    pub cont_raise: Option<f64>,
    pub cont_lower: Option<f64>,
    pub rocof: Option<f64>,
}

/// Reserve and non-scheduled generation figures for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservePoint {
    pub timestamp: String,
    pub spinning_reserve: f64,
    pub lfas_up: f64,
    pub forecast_demand: Option<f64>,
    pub actual_generation: Option<f64>,
    pub forecast_nsg: Option<f64>,
    pub actual_nsg: Option<f64>,
    pub rtd_generation: Option<f64>,
}

/// Interconnector flow attached to a region summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterconnectorFlow {
    pub name: String,
    pub value: f64,
    pub export_limit: f64,
    pub import_limit: f64,
}

/// Current state of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    pub region_tag: String,
    pub settlement_date: Option<String>,
    pub price: Option<f64>,
    pub total_demand: Option<f64>,
    pub scheduled_generation: f64,
    pub semi_scheduled_generation: f64,
    pub price_status: String,
    pub interconnector_flows: Vec<InterconnectorFlow>,
}

/// Everything derived from the WEM pulse file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseSnapshot {
    pub summary: Option<RegionSummary>,
    pub time_series: Vec<TimeSeriesPoint>,
    pub outages: Vec<OutageSample>,
    pub ess_pricing: Vec<EssPricePoint>,
    pub reserves: Vec<ReservePoint>,
    pub daily_averages: Vec<DailyAverage>,
}

/// Rooftop PV and operational demand for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DpvPoint {
    pub timestamp: String,
    pub dpv: f64,
    pub demand: f64,
}

/// A generating facility placed on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityLocation {
    pub code: String,
    pub name: String,
    pub fuel: String,
    pub latitude: f64,
    pub longitude: f64,
    pub mw: f64,
    pub capacity: f64,
}

/// Rolling cumulative price of one region at one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativePricePoint {
    pub region_tag: String,
    pub timestamp: String,
    pub cumulative_price: f64,
}

/// The NEM dashboard summary: one entry per region plus the raw price table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElecSummary {
    pub summary: Vec<RegionSummary>,
    pub prices: Vec<Value>,
}

/// One cell of the seven-day outlook table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookItem {
    pub date: String,
    pub region_tag: String,
    pub data_type: String,
    pub value: Value,
}

/// Seven-day outlook, as items and pivoted `date -> region -> type -> value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SevenDayOutlook {
    pub items: Vec<OutlookItem>,
    pub pivot: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>,
}

/// Renewable versus non-renewable split of a fuel mix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewableShare {
    pub renewable: f64,
    pub non_renewable: f64,
    pub percent: f64,
}
