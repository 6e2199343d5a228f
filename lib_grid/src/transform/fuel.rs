//! Canonical fuel categories.
//!
//! Vendor labels ("Natural Gas", "Dual (Gas/Distillate)", "Utility Solar PV")
//! are folded into a small fixed set of categories. Unknown labels pass
//! through unchanged so new fuels still show up, and facilities with no
//! metadata at all fall into [`OTHER_FUEL`].

use std::collections::{BTreeSet, HashMap};

use super::entities::{FuelMixItem, RenewableShare};
use super::fields::{RawRow, FACILITY_CODE, FUEL_LABEL};

/// Bucket for facilities whose fuel cannot be determined.
pub const OTHER_FUEL: &str = "Other";

/// Display order of the canonical categories.
pub const FUEL_ORDER: [&str; 9] = [
    "Black coal",
    "Brown coal",
    "Gas",
    "Hydro",
    "Wind",
    "Solar",
    "Battery",
    "Biomass",
    "Liquid Fuel",
];

/// Categories counted as renewable.
pub const RENEWABLE_FUELS: [&str; 9] = [
    "Hydro",
    "Wind",
    "Solar",
    "Biomass",
    "Battery",
    "Rooftop PV",
    "Distributed PV",
    "Utility-scale Solar",
    "Dpv",
];

const FUEL_SYNONYMS: [(&str, &str); 13] = [
    ("Wind", "Wind"),
    ("Gas", "Gas"),
    ("Natural Gas", "Gas"),
    ("Dual (Gas/Distillate)", "Gas"),
    ("Coal", "Coal"),
    ("Solar", "Solar"),
    ("Utility Solar PV", "Solar"),
    ("Distillate", "Liquid Fuel"),
    ("Landfill Gas", "Biomass"),
    ("Landfill / Sewage Gas", "Biomass"),
    ("Waste to Energy", "Biomass"),
    ("Battery", "Battery"),
    ("Battery Storage", "Battery"),
];

/// Maps a vendor label onto its canonical category; unmapped labels pass through.
pub fn canonical_fuel(label: &str) -> String {
    let label = label.trim();
    FUEL_SYNONYMS
        .iter()
        .find(|(raw, _)| *raw == label)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| label.to_string())
}

/// True for categories counted as renewable.
pub fn is_renewable(fuel: &str) -> bool {
    RENEWABLE_FUELS.contains(&fuel)
}

/// Sorts fuels into display order: canonical categories first, then any
/// extras alphabetically, with [`OTHER_FUEL`] last.
pub fn ordered_fuels<'a, I>(fuels: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: BTreeSet<&str> = fuels.into_iter().collect();
    let mut ordered: Vec<String> = FUEL_ORDER
        .iter()
        .filter(|f| present.contains(*f))
        .map(|f| f.to_string())
        .collect();
    ordered.extend(
        present
            .iter()
            .filter(|f| !FUEL_ORDER.contains(*f) && **f != OTHER_FUEL)
            .map(|f| f.to_string()),
    );
    if present.contains(OTHER_FUEL) {
        ordered.push(OTHER_FUEL.to_string());
    }
    ordered
}

/// Splits a fuel mix into renewable and non-renewable totals.
pub fn renewable_share(mix: &[FuelMixItem]) -> RenewableShare {
    let (renewable, non_renewable) = mix.iter().fold((0.0, 0.0), |(r, n), item| {
        if is_renewable(&item.fuel_type) {
            (r + item.supply, n)
        } else {
            (r, n + item.supply)
        }
    });
    let total = renewable + non_renewable;
    let percent = if total > 0.0 { renewable / total * 100.0 } else { 0.0 };
    RenewableShare {
        renewable,
        non_renewable,
        percent,
    }
}

/// [`renewable_share`] over the items of one region only, or all items when
/// `region` is `None`.
pub fn renewable_share_for(mix: &[FuelMixItem], region: Option<&str>) -> RenewableShare {
    match region {
        Some(tag) => {
            let filtered: Vec<FuelMixItem> = mix
                .iter()
                .filter(|i| i.region_tag == tag)
                .cloned()
                .collect();
            renewable_share(&filtered)
        }
        None => renewable_share(mix),
    }
}

/// Facility code to canonical fuel, built from facility metadata rows.
#[derive(Debug, Clone, Default)]
pub struct FuelLookup {
    by_code: HashMap<String, String>,
}

impl FuelLookup {
    /// Indexes metadata rows; rows missing a code or a fuel label are skipped.
    pub fn from_meta(meta: &[RawRow]) -> Self {
        let by_code = meta
            .iter()
            .filter_map(|row| {
                let code = FACILITY_CODE.text(row)?;
                let fuel = FUEL_LABEL.text(row)?;
                Some((code, canonical_fuel(&fuel)))
            })
            .collect();
        Self { by_code }
    }

    /// Canonical fuel for `code`, or [`OTHER_FUEL`] when unknown.
    pub fn fuel_for(&self, code: Option<&str>) -> &str {
        code.and_then(|c| self.by_code.get(c))
            .map(String::as_str)
            .unwrap_or(OTHER_FUEL)
    }

    /// Canonical fuel only when the code is known.
    pub fn get(&self, code: &str) -> Option<&str> {
        self.by_code.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
