//! # NEM Transforms
//!
//! Raw record shapes of the NEM dashboard API and their mapping onto the
//! shared entities. The API wraps every payload in `{"data": ...}`; list
//! endpoints put their rows under `data.items`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::entities::{
    CumulativePricePoint, DailyAverage, ElecSummary, FuelMixItem, InterconnectorFlow, OutlookItem,
    PeriodKind, RegionSummary, SevenDayOutlook, TimeSeriesPoint,
};
use super::fields::as_number;
use super::periods::calendar_date;
use super::wem::format_price;

/// Cumulative price threshold applied when the limits feed omits it ($/MWh).
pub const DEFAULT_CUMULATIVE_PRICE_THRESHOLD: f64 = 1_823_600.0;

/// Key of the cumulative price threshold in the market price limits map.
pub const CUMULATIVE_PRICE_THRESHOLD_KEY: &str = "CPT";

/// `{"items": [...]}` payload of the list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Items<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// `elecSummary` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElecSummaryRaw {
    #[serde(default)]
    pub summary: Vec<RegionSummaryRaw>,
    #[serde(default)]
    pub prices: Vec<Value>,
}

/// One region of the `elecSummary` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummaryRaw {
    pub region_id: String,
    #[serde(default)]
    pub settlement_date: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub total_demand: Option<f64>,
    #[serde(default)]
    pub scheduled_generation: Option<f64>,
    #[serde(default, rename = "semischeduledGeneration", alias = "semiScheduledGeneration")]
    pub semi_scheduled_generation: Option<f64>,
    #[serde(default)]
    pub price_status: Option<String>,
    /// JSON-encoded array, decoded in a second pass.
    #[serde(default)]
    pub interconnector_flows: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct InterconnectorFlowRaw {
    name: String,
    #[serde(default)]
    value: f64,
    #[serde(default, alias = "exportLimit")]
    exportlimit: f64,
    #[serde(default, alias = "importLimit")]
    importlimit: f64,
}

/// One `priceAndDemand` item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAndDemandRaw {
    pub settlement_date: String,
    pub region_id: String,
    #[serde(default)]
    pub rrp: Option<f64>,
    #[serde(default)]
    pub total_demand: Option<f64>,
    #[serde(default)]
    pub period_type: Option<String>,
    #[serde(default)]
    pub net_interchange: Option<f64>,
    #[serde(default)]
    pub scheduled_generation: Option<f64>,
    #[serde(default)]
    pub semi_scheduled_generation: Option<f64>,
}

/// One `cumulativePrice` item.
#[derive(Debug, Clone, Deserialize)]
pub struct CumulativePriceRaw {
    pub r: String,
    pub dt: String,
    #[serde(default)]
    pub cp: f64,
}

/// One `marketPriceLimits` item.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceLimitRaw {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// One `fuelMix` item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelMixRaw {
    pub fuel_type: String,
    #[serde(default)]
    pub supply: Option<f64>,
    pub state: String,
}

/// One `dailyAveragePrices` item. The average arrives as a number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAverageRaw {
    pub settlement_date: String,
    pub region_id: String,
    #[serde(default)]
    pub avg_rrp: Value,
}

/// One `sevenDayOutlook` item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookRaw {
    pub pretty_date: String,
    pub region_id: String,
    pub data_type: String,
    #[serde(default)]
    pub data_value: Value,
}

/// Decodes the nested interconnector flow list.
///
/// The field is normally a JSON string; an already-decoded array is accepted
/// too, and a missing or empty field is an empty list.
pub fn parse_interconnector_flows(
    raw: &Value,
) -> Result<Vec<InterconnectorFlow>, serde_json::Error> {
    let decoded: Vec<InterconnectorFlowRaw> = match raw {
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => serde_json::from_str(s)?,
        other => serde_json::from_value(other.clone())?,
    };
    Ok(decoded
        .into_iter()
        .map(|f| InterconnectorFlow {
            name: f.name,
            value: f.value,
            export_limit: f.exportlimit,
            import_limit: f.importlimit,
        })
        .collect())
}

/// Maps one region summary, with already-decoded interconnector flows.
pub fn region_summary(raw: RegionSummaryRaw, flows: Vec<InterconnectorFlow>) -> RegionSummary {
    RegionSummary {
        region_tag: raw.region_id,
        settlement_date: raw.settlement_date,
        price: raw.price,
        total_demand: raw.total_demand,
        scheduled_generation: raw.scheduled_generation.unwrap_or(0.0),
        semi_scheduled_generation: raw.semi_scheduled_generation.unwrap_or(0.0),
        price_status: raw.price_status.unwrap_or_default(),
        interconnector_flows: flows,
    }
}

/// Maps the whole summary payload. Regions whose flow list cannot be decoded
/// keep an empty list; their tags are returned for logging.
pub fn normalise_elec_summary(raw: ElecSummaryRaw) -> (ElecSummary, Vec<String>) {
    let mut undecodable = Vec::new();
    let summary = raw
        .summary
        .into_iter()
        .map(|region| {
            let flows =
                parse_interconnector_flows(&region.interconnector_flows).unwrap_or_else(|_| {
                    undecodable.push(region.region_id.clone());
                    Vec::new()
                });
            region_summary(region, flows)
        })
        .collect();
    (
        ElecSummary {
            summary,
            prices: raw.prices,
        },
        undecodable,
    )
}

/// Maps price and demand items, dropping placeholders with neither price
/// nor demand. An explicit period type wins; otherwise a priced row is
/// `ACTUAL`.
pub fn normalise_price_and_demand(items: Vec<PriceAndDemandRaw>) -> Vec<TimeSeriesPoint> {
    let mut points: Vec<TimeSeriesPoint> = items
        .into_iter()
        .filter(|raw| raw.rrp.is_some() || raw.total_demand.is_some())
        .map(|raw| {
            let period_kind = match raw.period_type.as_deref() {
                Some(kind) if kind.eq_ignore_ascii_case("ACTUAL") => PeriodKind::Actual,
                Some(_) => PeriodKind::Forecast,
                None if raw.rrp.is_some() => PeriodKind::Actual,
                None => PeriodKind::Forecast,
            };
            TimeSeriesPoint {
                timestamp: raw.settlement_date,
                region_tag: raw.region_id,
                price: raw.rrp,
                demand: raw.total_demand,
                period_kind,
                net_interchange: raw.net_interchange,
                scheduled_generation: raw.scheduled_generation,
                semi_scheduled_generation: raw.semi_scheduled_generation,
            }
        })
        .collect();
    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    points
}

pub fn normalise_cumulative_price(items: Vec<CumulativePriceRaw>) -> Vec<CumulativePricePoint> {
    items
        .into_iter()
        .map(|raw| CumulativePricePoint {
            region_tag: raw.r,
            timestamp: raw.dt,
            cumulative_price: raw.cp,
        })
        .collect()
}

/// Folds `[{key, value}]` into a map; later duplicates win.
pub fn price_limits_map(items: Vec<PriceLimitRaw>) -> BTreeMap<String, Value> {
    items.into_iter().map(|item| (item.key, item.value)).collect()
}

/// Cumulative price threshold from the limits map, or the standing default.
pub fn cumulative_price_threshold(limits: &BTreeMap<String, Value>) -> f64 {
    limits
        .get(CUMULATIVE_PRICE_THRESHOLD_KEY)
        .and_then(as_number)
        .unwrap_or(DEFAULT_CUMULATIVE_PRICE_THRESHOLD)
}

/// Maps fuel mix items, excluding non-positive supply.
pub fn normalise_fuel_mix(items: Vec<FuelMixRaw>) -> Vec<FuelMixItem> {
    items
        .into_iter()
        .filter_map(|raw| {
            let supply = raw.supply.filter(|s| *s > 0.0)?;
            Some(FuelMixItem {
                fuel_type: raw.fuel_type,
                supply,
                region_tag: raw.state,
            })
        })
        .collect()
}

/// Maps daily averages onto calendar dates with a two-decimal price.
/// Items whose average is not numeric are skipped.
pub fn normalise_daily_averages(items: Vec<DailyAverageRaw>) -> Vec<DailyAverage> {
    let mut daily: Vec<DailyAverage> = items
        .into_iter()
        .filter_map(|raw| {
            let avg = as_number(&raw.avg_rrp)?;
            Some(DailyAverage {
                date: calendar_date(&raw.settlement_date).to_string(),
                region_tag: raw.region_id,
                avg_price: format_price(avg),
            })
        })
        .collect();
    daily.sort();
    daily
}

/// Keeps the outlook items and pivots them `date -> region -> type -> value`.
pub fn pivot_seven_day_outlook(items: Vec<OutlookRaw>) -> SevenDayOutlook {
    let mut pivot: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>> = BTreeMap::new();
    for item in &items {
        pivot
            .entry(item.pretty_date.clone())
            .or_default()
            .entry(item.region_id.clone())
            .or_default()
            .insert(item.data_type.clone(), item.data_value.clone());
    }
    SevenDayOutlook {
        items: items
            .into_iter()
            .map(|raw| OutlookItem {
                date: raw.pretty_date,
                region_tag: raw.region_id,
                data_type: raw.data_type,
                value: raw.data_value,
            })
            .collect(),
        pivot,
    }
}
