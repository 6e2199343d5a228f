//! # WEM Transforms
//!
//! Pure functions turning parsed WEM CSV rows ([`RawRow`]) into the shared
//! entity shapes. Nothing here performs I/O or fails: missing columns resolve
//! to defaults, unknown facilities land in the `Other` fuel bucket, and rows
//! that carry no usable data are dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Duration;

use super::entities::{
    DailyAverage, DispatchStack, DpvPoint, EssPricePoint, FacilityLocation, FuelMixItem,
    OutageSample, PeriodKind, PulseSnapshot, RegionSummary, ReservePoint, TimeSeriesPoint,
    WA_REGION,
};
use super::fields::*;
use super::fuel::{canonical_fuel, ordered_fuels, FuelLookup, OTHER_FUEL};
use super::periods::{calendar_date, offset_label, parse_timestamp};

/// Facilities whose published coordinates are wrong upstream: `(code, lat, lon)`.
pub const COORDINATE_OVERRIDES: [(&str, f64, f64); 4] = [
    ("COCKBURN_CCG1", -32.200, 115.774),
    ("KWINANA_GT2", -32.228, 115.773),
    ("KWINANA_GT3", -32.228, 115.773),
    ("PERTHENERGY_KWINANA_GT1", -32.228, 115.773),
];

/// Sums the most recent interval of every generating facility per fuel.
///
/// Non-positive readings are skipped. Facilities missing from `meta` are
/// summed under `Other`. Output follows the display fuel order.
pub fn join_fuel_mix(generation: &[RawRow], meta: &[RawRow]) -> Vec<FuelMixItem> {
    let lookup = FuelLookup::from_meta(meta);
    let mut by_fuel: HashMap<String, f64> = HashMap::new();

    for row in generation {
        let Some(mw) = LATEST_INTERVAL_MW.number(row).filter(|mw| *mw > 0.0) else {
            continue;
        };
        let fuel = lookup.fuel_for(FACILITY_CODE.text(row).as_deref());
        *by_fuel.entry(fuel.to_string()).or_default() += mw;
    }

    ordered_fuels(by_fuel.keys().map(String::as_str))
        .into_iter()
        .map(|fuel| FuelMixItem {
            supply: by_fuel.get(&fuel).copied().unwrap_or_default(),
            fuel_type: fuel,
            region_tag: WA_REGION.to_string(),
        })
        .collect()
}

fn interval_label(row: &RawRow) -> String {
    INTERVAL_TIME.text(row).unwrap_or_default()
}

fn sorted_by_interval(rows: &[RawRow]) -> Vec<&RawRow> {
    let mut sorted: Vec<&RawRow> = rows.iter().collect();
    sorted.sort_by_cached_key(|row| interval_label(row));
    sorted
}

/// Normalises the pulse file into every series derived from it.
///
/// Rows are ordered by interval. Rows with neither price nor demand are
/// unpopulated placeholders and are dropped from the interval series; a row
/// with a price is `ACTUAL`, one without is `FORECAST`. The summary reflects
/// the latest priced row, or the last row when none is priced.
pub fn normalise_pulse(rows: &[RawRow]) -> PulseSnapshot {
    if rows.is_empty() {
        return PulseSnapshot::default();
    }

    let sorted = sorted_by_interval(rows);
    let latest = sorted
        .iter()
        .rev()
        .find(|row| ENERGY_PRICE.is_present(row))
        .or_else(|| sorted.last())
        .copied();

    let summary = latest.map(|row| RegionSummary {
        region_tag: WA_REGION.to_string(),
        settlement_date: INTERVAL_TIME.text(row),
        price: ENERGY_PRICE.number(row),
        total_demand: DEMAND.number(row),
        // Actual generation is filled in retroactively; the grid is isolated,
        // so forecast demand stands in until then.
        scheduled_generation: ACTUAL_GENERATION
            .number(row)
            .filter(|v| *v != 0.0)
            .or_else(|| FORECAST_DEMAND.number(row).filter(|v| *v != 0.0))
            .unwrap_or(0.0),
        semi_scheduled_generation: 0.0,
        price_status: "FIRM".to_string(),
        interconnector_flows: Vec::new(),
    });

    let populated: Vec<&RawRow> = sorted
        .iter()
        .copied()
        .filter(|row| ENERGY_PRICE.is_present(row) || DEMAND.is_present(row))
        .collect();

    let time_series = populated
        .iter()
        .map(|row| TimeSeriesPoint {
            timestamp: interval_label(row),
            region_tag: WA_REGION.to_string(),
            price: ENERGY_PRICE.number(row),
            demand: DEMAND.number(row),
            period_kind: if ENERGY_PRICE.is_present(row) {
                PeriodKind::Actual
            } else {
                PeriodKind::Forecast
            },
            net_interchange: None,
            scheduled_generation: None,
            semi_scheduled_generation: None,
        })
        .collect();

    let outages = populated
        .iter()
        .map(|row| OutageSample {
            timestamp: interval_label(row),
            total: TOTAL_OUTAGE.number(row).unwrap_or(0.0),
            planned: PLANNED_OUTAGE.number(row).unwrap_or(0.0),
            forced: FORCED_OUTAGE.number(row).unwrap_or(0.0),
            consequential: CONSEQUENTIAL_OUTAGE.number(row).unwrap_or(0.0),
        })
        .collect();

    let ess_pricing = populated
        .iter()
        .map(|row| EssPricePoint {
            timestamp: interval_label(row),
            energy: ENERGY_PRICE.number(row),
            reg_raise: REG_RAISE_PRICE.number(row),
            reg_lower: REG_LOWER_PRICE.number(row),
            cont_raise: CONT_RAISE_PRICE.number(row),
            cont_lower: CONT_LOWER_PRICE.number(row),
            rocof: ROCOF_PRICE.number(row),
        })
        .collect();

    PulseSnapshot {
        summary,
        time_series,
        outages,
        ess_pricing,
        reserves: normalise_reserves(rows),
        daily_averages: daily_average_prices(rows),
    }
}

/// Reserve and non-scheduled generation series, for every row with a time.
pub fn normalise_reserves(rows: &[RawRow]) -> Vec<ReservePoint> {
    sorted_by_interval(rows)
        .into_iter()
        .filter(|row| INTERVAL_TIME.is_present(row))
        .map(|row| ReservePoint {
            timestamp: interval_label(row),
            spinning_reserve: SPINNING_RESERVE.number(row).unwrap_or(0.0),
            lfas_up: LFAS_UP.number(row).unwrap_or(0.0),
            forecast_demand: FORECAST_DEMAND.number(row),
            actual_generation: ACTUAL_GENERATION.number(row),
            forecast_nsg: FORECAST_NSG.number(row),
            actual_nsg: ACTUAL_NSG.number(row),
            rtd_generation: RTD_GENERATION.number(row),
        })
        .collect()
}

/// Mean energy price per calendar date, ascending by date.
///
/// Input order does not matter.
pub fn daily_average_prices(rows: &[RawRow]) -> Vec<DailyAverage> {
    let mut by_date: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for row in rows {
        let (Some(time), Some(price)) = (INTERVAL_TIME.text(row), ENERGY_PRICE.number(row)) else {
            continue;
        };
        let bucket = by_date.entry(calendar_date(&time).to_string()).or_default();
        bucket.0 += price;
        bucket.1 += 1;
    }

    by_date
        .into_iter()
        .map(|(date, (sum, count))| DailyAverage {
            date,
            region_tag: WA_REGION.to_string(),
            avg_price: format_price(sum / count as f64),
        })
        .collect()
}

/// Two-decimal price string.
pub fn format_price(value: f64) -> String {
    format!("{value:.2}")
}

/// Accumulates MW per (period, fuel) and turns it into an aligned stack.
#[derive(Default)]
struct StackBuilder {
    by_period: BTreeMap<String, BTreeMap<String, f64>>,
    capacity_by_fuel: BTreeMap<String, f64>,
}

impl StackBuilder {
    fn add(&mut self, period: String, fuel: &str, mw: f64) {
        if mw <= 0.0 {
            return;
        }
        *self
            .by_period
            .entry(period)
            .or_default()
            .entry(fuel.to_string())
            .or_default() += mw;
    }

    fn add_capacity(&mut self, fuel: &str, capacity: f64) {
        if capacity > 0.0 {
            *self.capacity_by_fuel.entry(fuel.to_string()).or_default() += capacity;
        }
    }

    fn finish(self) -> DispatchStack {
        let fuels: BTreeSet<&String> = self.by_period.values().flat_map(|m| m.keys()).collect();

        let series_by_fuel: BTreeMap<String, Vec<f64>> = fuels
            .iter()
            .map(|fuel| {
                let series: Vec<f64> = self
                    .by_period
                    .values()
                    .map(|m| m.get(*fuel).copied().unwrap_or(0.0))
                    .collect();
                ((*fuel).clone(), series)
            })
            .collect();

        DispatchStack {
            periods: self.by_period.keys().cloned().collect(),
            total_by_period: self.by_period.values().map(|m| m.values().sum::<f64>()).collect(),
            series_by_fuel,
            capacity_by_fuel: self.capacity_by_fuel,
        }
    }
}

/// Pivots per-facility, per-period rows (the last-96-intervals file) into a
/// stacked dispatch series.
pub fn build_dispatch_stack(intervals: &[RawRow], meta: &[RawRow]) -> DispatchStack {
    let lookup = FuelLookup::from_meta(meta);
    let mut builder = StackBuilder::default();

    for row in intervals {
        let Some(mw) = ACTUAL_MW.number(row) else {
            continue;
        };
        let Some(period) = DISPATCH_PERIOD.text(row) else {
            continue;
        };
        let fuel = lookup.fuel_for(FACILITY_CODE.text(row).as_deref());
        builder.add(period, fuel, mw);
    }

    builder.finish()
}

/// Interval offset columns (`I01`, `I02`, ...) present in any row, by index.
fn offset_columns(rows: &[RawRow]) -> Vec<(u32, String)> {
    let mut columns: BTreeMap<u32, String> = BTreeMap::new();
    for key in rows.iter().flat_map(|row| row.keys()) {
        let Some(digits) = key.strip_prefix('I') else {
            continue;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(index) = digits.parse::<u32>() {
            if index > 0 {
                columns.entry(index).or_insert_with(|| key.clone());
            }
        }
    }
    columns.into_iter().collect()
}

/// Pivots the generation file, where each facility row carries `I01..INN`
/// offsets back from its `AS_AT` anchor, into a chronological dispatch stack.
///
/// `I01` is the anchor interval itself and `INN` the oldest. Rows without a
/// parseable anchor fall back to the file's first `AS_AT`; if that is missing
/// too they are skipped. Installed capacity is totalled per fuel.
pub fn build_dispatch_stack_from_offsets(
    generation: &[RawRow],
    meta: &[RawRow],
    interval_width: Duration,
) -> DispatchStack {
    let lookup = FuelLookup::from_meta(meta);
    let columns = offset_columns(generation);
    let file_anchor = extract_data_timestamp(generation).and_then(|ts| parse_timestamp(&ts));
    let mut builder = StackBuilder::default();

    for row in generation {
        let fuel = lookup.fuel_for(FACILITY_CODE.text(row).as_deref());
        if let Some(capacity) = MAX_CAPACITY.number(row) {
            builder.add_capacity(fuel, capacity);
        }

        let Some(anchor) = AS_AT
            .text(row)
            .and_then(|ts| parse_timestamp(&ts))
            .or(file_anchor)
        else {
            continue;
        };

        for (index, column) in &columns {
            let Some(mw) = row.get(column).and_then(as_number) else {
                continue;
            };
            let Some(period) = offset_label(anchor, *index - 1, interval_width) else {
                continue;
            };
            builder.add(period, fuel, mw);
        }
    }

    builder.finish()
}

/// Rooftop PV against operational demand, ascending by time.
///
/// Rows without a timestamp cannot be placed and are skipped.
pub fn normalise_dpv(rows: &[RawRow]) -> Vec<DpvPoint> {
    let mut points: Vec<DpvPoint> = rows
        .iter()
        .filter_map(|row| {
            Some(DpvPoint {
                timestamp: DPV_TIME.text(row)?,
                dpv: DPV_MW.number(row).unwrap_or(0.0),
                demand: OPERATIONAL_DEMAND.number(row).unwrap_or(0.0),
            })
        })
        .collect();
    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    points
}

/// First non-empty `AS_AT` in the generation file.
pub fn extract_data_timestamp(rows: &[RawRow]) -> Option<String> {
    rows.iter().find_map(|row| AS_AT.text(row))
}

struct SiteMeta {
    name: String,
    fuel: String,
    latitude: f64,
    longitude: f64,
}

/// Joins current generation with facility coordinates.
///
/// Known-bad coordinates are replaced from [`COORDINATE_OVERRIDES`];
/// facilities that still have no coordinates are left out.
pub fn build_facilities(generation: &[RawRow], meta: &[RawRow]) -> Vec<FacilityLocation> {
    let mut sites: HashMap<String, SiteMeta> = HashMap::new();

    for row in meta {
        let Some(code) = FACILITY_CODE.text(row) else {
            continue;
        };
        let mut coords = (LATITUDE.number(row), LONGITUDE.number(row));
        if let Some((_, lat, lon)) = COORDINATE_OVERRIDES.iter().find(|(c, _, _)| *c == code) {
            coords = (Some(*lat), Some(*lon));
        }
        let (Some(latitude), Some(longitude)) = coords else {
            continue;
        };
        let fuel = FUEL_LABEL
            .text(row)
            .map(|label| canonical_fuel(&label))
            .unwrap_or_else(|| OTHER_FUEL.to_string());
        sites.insert(
            code,
            SiteMeta {
                name: DISPLAY_NAME.text(row).unwrap_or_default(),
                fuel,
                latitude,
                longitude,
            },
        );
    }

    generation
        .iter()
        .filter_map(|row| {
            let code = FACILITY_CODE.text(row)?;
            let site = sites.get(&code)?;
            Some(FacilityLocation {
                name: site.name.clone(),
                fuel: site.fuel.clone(),
                latitude: site.latitude,
                longitude: site.longitude,
                mw: CURRENT_INTERVAL_MW.number(row).unwrap_or(0.0),
                capacity: MAX_CAPACITY.number(row).unwrap_or(0.0),
                code,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn rows(values: Value) -> Vec<RawRow> {
        values
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn fuel_mix_sums_latest_interval_per_fuel() {
        let generation = rows(json!([{"FACILITY_CODE": "G1", "I01": 200}]));
        let meta = rows(json!([{"FACILITY_CODE": "G1", "PRIMARY_FUEL": "Coal"}]));
        let mix = join_fuel_mix(&generation, &meta);
        assert_eq!(
            mix,
            vec![FuelMixItem { fuel_type: "Coal".into(), supply: 200.0, region_tag: "WA1".into() }]
        );
    }

    #[test]
    fn fuel_mix_excludes_non_positive_and_keeps_unmapped_as_other() {
        let generation = rows(json!([
            {"FACILITY_CODE": "W1", "I01": 50},
            {"FACILITY_CODE": "W2", "I01": 0},
            {"FACILITY_CODE": "W3", "I01": -12.5},
            {"FACILITY_CODE": "MYSTERY", "I01": 7},
            {"FACILITY_CODE": "W4", "I01": null, "I48": 10},
        ]));
        let meta = rows(json!([
            {"FACILITY_CODE": "W1", "PRIMARY_FUEL": "Wind"},
            {"FACILITY_CODE": "W2", "PRIMARY_FUEL": "Wind"},
            {"FACILITY_CODE": "W3", "PRIMARY_FUEL": "Battery Storage"},
            {"FACILITY_CODE": "W4", "PRIMARY_FUEL": "Wind"},
        ]));
        let mix = join_fuel_mix(&generation, &meta);
        let supply: HashMap<_, _> = mix.iter().map(|i| (i.fuel_type.as_str(), i.supply)).collect();
        assert_eq!(supply.get("Wind"), Some(&60.0));
        assert_eq!(supply.get("Other"), Some(&7.0));
        assert!(!supply.contains_key("Battery"));
    }

    #[test]
    fn pulse_classifies_actual_and_forecast() {
        let pulse = rows(json!([
            {
                "TRADING_DAY_INTERVAL": "2026-02-05 08:30:00",
                "ENERGY_PRICE": null,
                "FORECAST_EOI_MW": 3100
            },
            {
                "TRADING_DAY_INTERVAL": "2026-02-05 08:00:00",
                "ENERGY_PRICE": 45,
                "FORECAST_EOI_MW": 3000
            },
        ]));
        let snap = normalise_pulse(&pulse);

        assert_eq!(snap.time_series.len(), 2);
        assert_eq!(snap.time_series[0].period_kind, PeriodKind::Actual);
        assert_eq!(snap.time_series[0].price, Some(45.0));
        assert_eq!(snap.time_series[0].demand, Some(3000.0));
        assert_eq!(snap.time_series[1].period_kind, PeriodKind::Forecast);
        assert_eq!(snap.time_series[1].price, None);
        assert_eq!(snap.time_series[1].demand, Some(3100.0));

        let summary = snap.summary.expect("summary");
        assert_eq!(summary.price, Some(45.0));
        assert_eq!(summary.scheduled_generation, 3000.0);
        assert_eq!(summary.price_status, "FIRM");
        assert!(summary.interconnector_flows.is_empty());
    }

    #[test]
    fn pulse_drops_unpopulated_rows() {
        let pulse = rows(json!([
            {
                "TRADING_DAY_INTERVAL": "2026-02-05 08:00:00",
                "ENERGY_PRICE": 45,
                "TOTAL_OUTAGE_MW": 120
            },
            {"TRADING_DAY_INTERVAL": "2026-02-05 08:30:00"},
            {
                "TRADING_DAY_INTERVAL": "2026-02-05 09:00:00",
                "ENERGY_PRICE": null,
                "FORECAST_MW": null
            },
        ]));
        let snap = normalise_pulse(&pulse);
        assert!(snap.time_series.len() <= pulse.len());
        assert_eq!(snap.time_series.len(), 1);
        assert_eq!(snap.outages.len(), 1);
        assert_eq!(snap.outages[0].total, 120.0);
        assert_eq!(snap.outages[0].forced, 0.0);
        assert_eq!(snap.reserves.len(), 3);
    }

    #[test]
    fn pulse_summary_falls_back_to_last_row() {
        let pulse = rows(json!([
            {"Trading_Interval": "2026-02-05 09:00:00", "DEMAND": 2800},
            {"Trading_Interval": "2026-02-05 08:30:00", "DEMAND": 2900},
        ]));
        let summary = normalise_pulse(&pulse).summary.expect("summary");
        assert_eq!(summary.settlement_date.as_deref(), Some("2026-02-05 09:00:00"));
        assert_eq!(summary.price, None);
        assert_eq!(summary.scheduled_generation, 0.0);
    }

    #[test]
    fn empty_pulse_has_no_summary() {
        assert_eq!(normalise_pulse(&[]), PulseSnapshot::default());
    }

    #[test]
    fn daily_average_formats_two_decimals() {
        let pulse = rows(json!([
            {"TRADING_DAY_INTERVAL": "2026-02-05 08:00:00", "ENERGY_PRICE": 40},
            {"TRADING_DAY_INTERVAL": "2026-02-05 08:30:00", "ENERGY_PRICE": 60},
        ]));
        let daily = daily_average_prices(&pulse);
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].date, "2026-02-05");
        assert_eq!(daily[0].avg_price, "50.00");
    }

    #[test]
    fn daily_average_ignores_input_order() {
        let mut pulse = rows(json!([
            {"TRADING_DAY_INTERVAL": "2026-02-06T00:30:00", "ENERGY_PRICE": 10},
            {"TRADING_DAY_INTERVAL": "2026-02-05 08:00:00", "ENERGY_PRICE": 33.3},
            {"TRADING_DAY_INTERVAL": "2026-02-05 08:30:00", "ENERGY_PRICE": 12},
            {"TRADING_DAY_INTERVAL": "2026-02-06 01:00:00", "ENERGY_PRICE": 15},
            {"TRADING_DAY_INTERVAL": "2026-02-06 01:30:00"},
        ]));
        let forward = daily_average_prices(&pulse);
        pulse.reverse();
        pulse.swap(0, 2);
        assert_eq!(forward, daily_average_prices(&pulse));
        let dates: Vec<&str> = forward.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, ["2026-02-05", "2026-02-06"]);
        assert_eq!(forward[1].avg_price, "12.50");
    }

    #[test]
    fn dispatch_stack_series_are_aligned_and_zero_filled() {
        let intervals = rows(json!([
            {"FACILITY_CODE": "C1", "PERIOD": "2026-02-05 08:00:00", "ACTUAL_MW": 300},
            {"FACILITY_CODE": "S1", "PERIOD": "2026-02-05 08:30:00", "ACTUAL_MW": 80},
            {"FACILITY_CODE": "C1", "PERIOD": "2026-02-05 08:30:00", "ACTUAL_MW": 310},
            {"FACILITY_CODE": "S1", "PERIOD": "2026-02-05 08:00:00", "ACTUAL_MW": 0},
            {"FACILITY_CODE": "X9", "PERIOD": "2026-02-05 09:00:00", "ACTUAL_MW": 5},
        ]));
        let meta = rows(json!([
            {"FACILITY_CODE": "C1", "PRIMARY_FUEL": "Coal"},
            {"FACILITY_CODE": "S1", "PRIMARY_FUEL": "Utility Solar PV"},
        ]));
        let stack = build_dispatch_stack(&intervals, &meta);

        assert_eq!(stack.periods.len(), 3);
        for series in stack.series_by_fuel.values() {
            assert_eq!(series.len(), stack.periods.len());
        }
        assert_eq!(stack.series_by_fuel["Coal"], vec![300.0, 310.0, 0.0]);
        assert_eq!(stack.series_by_fuel["Solar"], vec![0.0, 80.0, 0.0]);
        assert_eq!(stack.series_by_fuel["Other"], vec![0.0, 0.0, 5.0]);
        assert_eq!(stack.total_by_period, vec![300.0, 390.0, 5.0]);
    }

    #[test]
    fn dispatch_stack_from_offsets_is_chronological() {
        let generation = rows(json!([
            {
                "FACILITY_CODE": "W1",
                "AS_AT": "2026-02-05 08:30:00",
                "MAX_GEN_CAPACITY": 200,
                "I01": 90,
                "I02": 80,
                "I03": 70
            },
            {
                "FACILITY_CODE": "G1",
                "AS_AT": "2026-02-05 08:30:00",
                "MAX_GEN_CAPACITY": 150,
                "I01": 0,
                "I02": 20,
                "I03": null
            },
        ]));
        let meta = rows(json!([
            {"FACILITY_CODE": "W1", "PRIMARY_FUEL": "Wind"},
            {"FACILITY_CODE": "G1", "PRIMARY_FUEL": "Natural Gas"},
        ]));
        let stack = build_dispatch_stack_from_offsets(&generation, &meta, Duration::minutes(30));

        assert_eq!(
            stack.periods,
            vec!["2026-02-05 07:30:00", "2026-02-05 08:00:00", "2026-02-05 08:30:00"]
        );
        assert_eq!(stack.series_by_fuel["Wind"], vec![70.0, 80.0, 90.0]);
        assert_eq!(stack.series_by_fuel["Gas"], vec![0.0, 20.0, 0.0]);
        assert_eq!(stack.capacity_by_fuel["Wind"], 200.0);
        assert_eq!(stack.capacity_by_fuel["Gas"], 150.0);
    }

    #[test]
    fn facilities_apply_overrides_and_drop_unplaceable() {
        let generation = rows(json!([
            {"FACILITY_CODE": "COCKBURN_CCG1", "I01": 120, "MAX_GEN_CAPACITY": 240},
            {"FACILITY_CODE": "NOWHERE", "I01": 5},
            {"FACILITY_CODE": "ALBANY_WF1", "I01": 10},
        ]));
        let meta = rows(json!([
            {
                "FACILITY_CODE": "COCKBURN_CCG1",
                "DISPLAY_NAME": "Cockburn",
                "PRIMARY_FUEL": "Gas",
                "LATITUDE": "-31.95",
                "LONGITUDE": "115.86"
            },
            {"FACILITY_CODE": "NOWHERE", "PRIMARY_FUEL": "Wind", "LATITUDE": "", "LONGITUDE": ""},
            {
                "FACILITY_CODE": "ALBANY_WF1",
                "DISPLAY_NAME": "Albany",
                "PRIMARY_FUEL": "Wind",
                "LATITUDE": -35.06,
                "LONGITUDE": 117.8
            },
        ]));
        let sites = build_facilities(&generation, &meta);

        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].code, "COCKBURN_CCG1");
        assert_eq!((sites[0].latitude, sites[0].longitude), (-32.200, 115.774));
        assert_eq!(sites[0].capacity, 240.0);
        assert_eq!(sites[1].name, "Albany");
    }

    #[test]
    fn dpv_defaults_and_sorts() {
        let dpv = rows(json!([
            {"Trading Interval": "2026-02-05 09:00:00", "Estimated DPV Generation (MW)": 900},
            {
                "Trading Interval": "2026-02-05 08:30:00",
                "Operational Demand (MW)": 1800,
                "DPV_MW": 850
            },
            {"Estimated DPV Generation (MW)": 1},
        ]));
        let points = normalise_dpv(&dpv);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].dpv, 850.0);
        assert_eq!(points[0].demand, 1800.0);
        assert_eq!(points[1].demand, 0.0);
    }

    #[test]
    fn data_timestamp_is_first_non_empty() {
        let generation = rows(json!([{"AS_AT": ""}, {"As_At": " 2026-02-05 08:30:00 "}]));
        assert_eq!(extract_data_timestamp(&generation).as_deref(), Some("2026-02-05 08:30:00"));
        assert_eq!(extract_data_timestamp(&[]), None);
    }
}
