//! Helpers for choosing start and end columns.

use crate::error::{GeocodeError, Result};
use crate::manifest::Manifest;
use std::collections::BTreeSet;

/// Geography prefixes and what they denote. Add a two digit year and the code
/// suffix to get a column name, e.g. `WD` + `22` + `CD`.
const GEOGRAPHY_KEYS: &[(&str, &str)] = &[
    ("BUA", "Built-up area"),
    ("BUASD", "Built-up area sub-divisions"),
    ("CAUTH", "Combined authority"),
    ("CCG", "Clinical commissioning group"),
    ("CED", "County electoral division"),
    ("CMWD", "Census-merged wards"),
    ("CTRY", "Country"),
    ("CTY", "County"),
    ("EER", "European electoral region"),
    ("LAD", "Local authority district"),
    ("LAU1", "Local administrative unit 1 (Eurostat)"),
    ("LAU2", "Local administrative unit 2 (Eurostat)"),
    ("LPA", "Local planning authority"),
    ("LSOA", "Lower layer super output area"),
    ("LTLA", "Lower-tier local authority"),
    ("MSOA", "Middle layer super output area"),
    ("NAT", "Nations"),
    ("NHSER", "NHS England region"),
    ("NUTS1", "Nomenclature of territorial units for statistics level 1 (Eurostat)"),
    ("NUTS2", "Nomenclature of territorial units for statistics level 2 (Eurostat)"),
    ("NUTS3", "Nomenclature of territorial units for statistics level 3 (Eurostat)"),
    ("OA", "Output area"),
    ("PCO", "Primary care organisation"),
    ("PCON", "Westminster parliamentary constituency"),
    ("RGN", "Region"),
    ("SHA", "Strategic health authority"),
    ("STP", "Sustainability and transformation partnerships"),
    ("TTWA", "Travel to work area"),
    ("UA", "Unitary authority"),
    ("UTLA", "Upper-tier local authority"),
    ("WD", "Ward"),
    ("WZ", "Workplace zone"),
];

pub fn geography_keys() -> &'static [(&'static str, &'static str)] {
    GEOGRAPHY_KEYS
}

/// Grouping keys (usually years) present in the manifest, sorted.
pub fn groupings(manifest: &Manifest) -> Vec<&str> {
    manifest.groupings.keys().map(String::as_str).collect()
}

/// Sorted distinct code columns, for one grouping or across all of them.
pub fn available_geographies(manifest: &Manifest, grouping: Option<&str>) -> Result<Vec<String>> {
    let selected: Vec<_> = match grouping {
        Some(key) => {
            let tables = manifest.groupings.get(key).ok_or_else(|| {
                GeocodeError::UnknownGrouping(format!("{} (options: {})", key, groupings(manifest).join(", ")))
            })?;
            vec![tables]
        }
        None => manifest.groupings.values().collect(),
    };

    let columns: BTreeSet<String> = selected
        .into_iter()
        .flat_map(|tables| tables.values())
        .flat_map(|entry| entry.code_columns.iter().cloned())
        .collect();
    Ok(columns.into_iter().collect())
}
