//! Column variants
//!
//! Geography columns are named `<FAMILY><YY><SUFFIX>`, e.g. `LSOA21CD` is the
//! 2021 vintage of the LSOA code. When several join paths tie on length, the
//! variant policy orders them so paths built from the same vintage as the
//! requested end column come first.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};

lazy_static! {
    static ref VARIANT_RE: Regex = Regex::new(r"^(?P<family>.+?)(?P<year>\d{2})(?P<suffix>[A-Z]{2})$").unwrap();
}

/// How ties between minimal paths are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VariantPolicy {
    /// Deterministic lexical order only
    Ignore,

    /// Paths matching the end column's vintage first, newer before older
    #[default]
    Prefer,

    /// Only the best scoring paths are kept
    Restrict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnVariant {
    pub family: String,
    pub year: u16,
    pub suffix: String,
}

impl ColumnVariant {
    pub fn parse(column: &str) -> Option<Self> {
        let caps = VARIANT_RE.captures(column)?;
        let yy: u16 = caps["year"].parse().ok()?;
        let year = if yy < 70 { 2000 + yy } else { 1900 + yy };
        Some(Self {
            family: caps["family"].to_string(),
            year,
            suffix: caps["suffix"].to_string(),
        })
    }
}

/// How well a path's intermediate columns and tables match the end column's vintage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariantScore {
    /// Columns or groupings of the same vintage
    pub matching: usize,

    /// Columns older than the requested vintage
    pub older: usize,

    /// Latest year seen, favouring newer variants among otherwise equal paths
    pub newest: u16,
}

impl VariantScore {
    pub fn compute(columns: &[&str], groupings: &[&str], end_column: &str) -> Self {
        let target = ColumnVariant::parse(end_column).map(|v| v.year);
        let mut score = VariantScore::default();

        for variant in columns.iter().filter_map(|c| ColumnVariant::parse(c)) {
            score.newest = score.newest.max(variant.year);
            match target {
                Some(year) if variant.year == year => score.matching += 1,
                Some(year) if variant.year < year => score.older += 1,
                _ => {}
            }
        }

        if let Some(year) = target {
            let yy = format!("{:02}", year % 100);
            let full = year.to_string();
            score.matching += groupings
                .iter()
                .filter(|g| g.contains(&full) || g.ends_with(&yy))
                .count();
        }
        score
    }

    fn rank(&self) -> (Reverse<usize>, usize, Reverse<u16>) {
        (Reverse(self.matching), self.older, Reverse(self.newest))
    }
}

impl PartialOrd for VariantScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Better scores sort first.
impl Ord for VariantScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variant() {
        let v = ColumnVariant::parse("LSOA21CD").unwrap();
        assert_eq!(v.family, "LSOA");
        assert_eq!(v.year, 2021);
        assert_eq!(v.suffix, "CD");

        let nuts = ColumnVariant::parse("NUTS121CD").unwrap();
        assert_eq!(nuts.family, "NUTS1");

        assert_eq!(ColumnVariant::parse("WD91NM").unwrap().year, 1991);
        assert!(ColumnVariant::parse("FID").is_none());
        assert!(ColumnVariant::parse("LAD22").is_none());
    }

    #[test]
    fn test_matching_vintage_ranks_first() {
        let same = VariantScore::compute(&["LSOA21CD"], &["2021"], "OA21CD");
        let older = VariantScore::compute(&["LSOA11CD"], &["2011"], "OA21CD");
        assert!(same < older);
        assert_eq!(same.matching, 2);
        assert_eq!(older.older, 1);
    }

    #[test]
    fn test_newer_breaks_remaining_ties() {
        let newer = VariantScore::compute(&["WD23CD"], &[], "LAD");
        let older = VariantScore::compute(&["WD19CD"], &[], "LAD");
        assert!(newer < older);
    }

    #[test]
    fn test_more_columns_are_not_newer() {
        let two_old = VariantScore::compute(&["WD11CD", "LSOA11CD"], &[], "LAD");
        let one_new = VariantScore::compute(&["WD23CD"], &[], "LAD");
        assert_eq!(two_old.newest, 2011);
        assert!(one_new < two_old);
    }
}
