//! # Tabular Field Resolution
//!
//! Upstream CSV columns drift between endpoints and schema revisions, so one
//! logical field (a price, a facility code, an interval timestamp) may live
//! under several column names. A [`FieldResolver`] carries the ordered list of
//! candidate columns for one logical field and returns the first populated one.
//!
//! All lookups are total: a missing or unusable cell yields `None`, never an
//! error.

use serde_json::{Map, Value};

/// One parsed tabular row, keyed by its header names.
pub type RawRow = Map<String, Value>;

/// Ordered list of candidate columns for one logical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldResolver {
    name: &'static str,
    keys: &'static [&'static str],
}

impl FieldResolver {
    /// Builds a resolver; `keys` are tried in order.
    pub const fn new(name: &'static str, keys: &'static [&'static str]) -> Self {
        Self { name, keys }
    }

    /// The logical field name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Candidate columns in priority order.
    pub fn keys(&self) -> &'static [&'static str] {
        self.keys
    }

    /// First candidate that is present and not null.
    pub fn value<'a>(&self, row: &'a RawRow) -> Option<&'a Value> {
        self.keys
            .iter()
            .find_map(|key| row.get(*key).filter(|v| !v.is_null()))
    }

    /// True when any candidate column carries a non-null value.
    pub fn is_present(&self, row: &RawRow) -> bool {
        self.value(row).is_some()
    }

    /// First non-null candidate, coerced to a number.
    ///
    /// Like a nullish-coalescing chain, the first non-null value wins even if
    /// it turns out not to be numeric.
    pub fn number(&self, row: &RawRow) -> Option<f64> {
        self.value(row).and_then(as_number)
    }

    /// First candidate that renders to a non-empty string.
    ///
    /// Empty strings are skipped, so `""` in the first column falls through to
    /// the next candidate.
    pub fn text(&self, row: &RawRow) -> Option<String> {
        self.keys
            .iter()
            .filter_map(|key| row.get(*key))
            .find_map(as_text)
    }
}

/// Coerces a cell to `f64`: numbers as-is, numeric strings parsed (surrounding
/// quotes and whitespace ignored), everything else `None`.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_matches('"').trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Renders a cell as trimmed text, dropping empties and nulls.
pub fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().trim_matches('"').trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

// --- Facility metadata / generation ---

/// Facility identifier.
pub const FACILITY_CODE: FieldResolver = FieldResolver::new(
    "facility_code",
    &["FACILITY_CODE", "PARTICIPANT_CODE", "Facility_Code", "FacilityCode"],
);
/// Raw vendor fuel label.
pub const FUEL_LABEL: FieldResolver = FieldResolver::new(
    "fuel_label",
    &["PRIMARY_FUEL", "FACILITY_TYPE", "FUEL_TYPE", "Fuel_Type", "FuelType"],
);
/// Human-readable facility name.
pub const DISPLAY_NAME: FieldResolver =
    FieldResolver::new("display_name", &["DISPLAY_NAME", "FACILITY_CODE", "Facility_Code"]);
/// Facility latitude.
pub const LATITUDE: FieldResolver = FieldResolver::new("latitude", &["LATITUDE", "Latitude"]);
/// Facility longitude.
pub const LONGITUDE: FieldResolver = FieldResolver::new("longitude", &["LONGITUDE", "Longitude"]);
/// Most recent generation interval (`I01`), falling back to `I48`.
pub const LATEST_INTERVAL_MW: FieldResolver =
    FieldResolver::new("latest_interval_mw", &["I01", "I48"]);
/// Current output only (`I01`), no fallback.
pub const CURRENT_INTERVAL_MW: FieldResolver = FieldResolver::new("current_interval_mw", &["I01"]);
/// Installed capacity.
pub const MAX_CAPACITY: FieldResolver =
    FieldResolver::new("max_capacity", &["MAX_GEN_CAPACITY", "Max_Gen_Capacity"]);
/// Anchor timestamp of an interval-offset generation file.
pub const AS_AT: FieldResolver = FieldResolver::new("as_at", &["AS_AT", "As_At"]);
/// Dispatch period of a facility interval row.
pub const DISPATCH_PERIOD: FieldResolver = FieldResolver::new(
    "dispatch_period",
    &["PERIOD", "Trading_Interval", "TRADING_DAY_INTERVAL"],
);
/// Metered output of a facility interval row.
pub const ACTUAL_MW: FieldResolver =
    FieldResolver::new("actual_mw", &["ACTUAL_MW", "Actual_MW", "MW"]);

// --- Pulse ---

/// Trading interval timestamp.
pub const INTERVAL_TIME: FieldResolver = FieldResolver::new(
    "interval_time",
    &["TRADING_DAY_INTERVAL", "Trading_Interval", "PERIOD"],
);
/// Energy price.
pub const ENERGY_PRICE: FieldResolver =
    FieldResolver::new("energy_price", &["ENERGY_PRICE", "Price", "PRICE"]);
/// Demand (forecast end-of-interval first).
pub const DEMAND: FieldResolver = FieldResolver::new(
    "demand",
    &["FORECAST_EOI_MW", "FORECAST_MW", "TOTAL_DEMAND", "Demand", "DEMAND"],
);
/// Forecast demand only.
pub const FORECAST_DEMAND: FieldResolver =
    FieldResolver::new("forecast_demand", &["FORECAST_EOI_MW", "FORECAST_MW"]);
/// Actual total generation, populated retroactively upstream.
pub const ACTUAL_GENERATION: FieldResolver = FieldResolver::new(
    "actual_generation",
    &["ACTUAL_TOTAL_GENERATION", "TOTAL_GENERATION", "Generation", "GENERATION"],
);
/// Total outage MW.
pub const TOTAL_OUTAGE: FieldResolver =
    FieldResolver::new("total_outage", &["TOTAL_OUTAGE_MW", "Total_Outages"]);
/// Planned outage MW.
pub const PLANNED_OUTAGE: FieldResolver =
    FieldResolver::new("planned_outage", &["PLANNED_OUTAGE_MW", "Planned_Outages"]);
/// Forced outage MW.
pub const FORCED_OUTAGE: FieldResolver =
    FieldResolver::new("forced_outage", &["FORCED_OUTAGE_MW", "Forced_Outages"]);
/// Consequential outage MW.
pub const CONSEQUENTIAL_OUTAGE: FieldResolver =
    FieldResolver::new("consequential_outage", &["CONS_OUTAGE_MW", "Consequential_Outages"]);
/// Regulation raise price.
pub const REG_RAISE_PRICE: FieldResolver =
    FieldResolver::new("reg_raise_price", &["REG_RAISE_PRICE", "Regulation_Raise_Price"]);
/// Regulation lower price.
pub const REG_LOWER_PRICE: FieldResolver =
    FieldResolver::new("reg_lower_price", &["REG_LOWER_PRICE", "Regulation_Lower_Price"]);
/// Contingency raise price.
pub const CONT_RAISE_PRICE: FieldResolver =
    FieldResolver::new("cont_raise_price", &["CONT_RAISE_PRICE", "Contingency_Raise_Price"]);
/// Contingency lower price.
pub const CONT_LOWER_PRICE: FieldResolver =
    FieldResolver::new("cont_lower_price", &["CONT_LOWER_PRICE", "Contingency_Lower_Price"]);
/// Rate-of-change-of-frequency price.
pub const ROCOF_PRICE: FieldResolver =
    FieldResolver::new("rocof_price", &["ROCOF_PRICE", "RoCoF_Price"]);
/// Real-time spinning reserve.
pub const SPINNING_RESERVE: FieldResolver =
    FieldResolver::new("spinning_reserve", &["RTD_TOTAL_SPINNING_RESERVE"]);
/// Load-following raise requirement.
pub const LFAS_UP: FieldResolver = FieldResolver::new("lfas_up", &["LFAS_UP_REQUIREMENT_MW"]);
/// Forecast non-scheduled generation.
pub const FORECAST_NSG: FieldResolver = FieldResolver::new("forecast_nsg", &["FORECAST_NSG_MW"]);
/// Actual non-scheduled generation.
pub const ACTUAL_NSG: FieldResolver = FieldResolver::new("actual_nsg", &["ACTUAL_NSG_MW"]);
/// Real-time dispatch total generation.
pub const RTD_GENERATION: FieldResolver =
    FieldResolver::new("rtd_generation", &["RTD_TOTAL_GENERATION"]);

// --- Distributed PV ---

/// DPV file timestamp.
pub const DPV_TIME: FieldResolver = FieldResolver::new(
    "dpv_time",
    &["Trading Interval", "TRADING_DAY_INTERVAL", "Trading_Interval", "Timestamp"],
);
/// Estimated rooftop PV output.
pub const DPV_MW: FieldResolver =
    FieldResolver::new("dpv_mw", &["Estimated DPV Generation (MW)", "DPV_MW", "DPV"]);
/// Operational demand.
pub const OPERATIONAL_DEMAND: FieldResolver = FieldResolver::new(
    "operational_demand",
    &["Operational Demand (MW)", "OPERATIONAL_DEMAND", "Op_Demand"],
);
