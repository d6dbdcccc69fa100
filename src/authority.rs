//! Local Authority Filter
//!
//! Restricts a materialized lookup to rows whose local authority name is in a
//! caller supplied set. The authority column is found by name: the first
//! column starting with one of the authority prefixes and ending with the name
//! suffix, e.g. `LAD22NM`.

use crate::config::LookupConfig;
use crate::error::{GeocodeError, Result};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info};

/// What a filter pass did to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Rows matched and were kept
    Filtered { column: String, rows: usize },

    /// No row matched any of the names
    Empty { column: String },
}

impl FilterOutcome {
    pub fn column(&self) -> &str {
        match self {
            FilterOutcome::Filtered { column, .. } | FilterOutcome::Empty { column } => column,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FilterOutcome::Empty { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AuthorityFilter {
    names: HashSet<String>,
    prefixes: Vec<String>,
    name_suffix: String,
}

impl AuthorityFilter {
    pub fn new<I, S>(names: I, config: &LookupConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            prefixes: config
                .authority_prefixes
                .iter()
                .map(|p| LookupConfig::normalize_column(p))
                .collect(),
            name_suffix: LookupConfig::normalize_column(&config.name_suffix),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Authority name column among `columns`, by prefix preference then column order.
    pub fn find_column(&self, columns: &[&str]) -> Option<String> {
        self.prefixes.iter().find_map(|prefix| {
            columns
                .iter()
                .find(|c| c.starts_with(prefix.as_str()) && c.ends_with(self.name_suffix.as_str()))
                .map(|c| c.to_string())
        })
    }

    /// Keep the rows of `df` whose authority name is one of the filter's names.
    pub fn apply(&self, df: &DataFrame) -> Result<(DataFrame, FilterOutcome)> {
        let column = self
            .find_column(&df.get_column_names())
            .ok_or_else(|| self.missing_column())?;
        self.apply_on(df, &column)
    }

    pub(crate) fn missing_column(&self) -> GeocodeError {
        GeocodeError::NoAuthorityColumn(format!("{} with suffix {}", self.prefixes.join("/"), self.name_suffix))
    }

    /// Filter on a column chosen by the caller.
    pub fn apply_on(&self, df: &DataFrame, column: &str) -> Result<(DataFrame, FilterOutcome)> {
        let column = column.to_string();
        let values = df.column(&column)?.cast(&DataType::String)?;
        let mask: BooleanChunked = values
            .str()?
            .into_iter()
            .map(|v| v.map_or(false, |v| self.names.contains(v)))
            .collect();
        let filtered = df.filter(&mask)?;
        debug!("Filter on {}: {} -> {} rows", column, df.height(), filtered.height());

        let outcome = if filtered.height() == 0 {
            info!("⚠️  No rows in {} match the requested authorities", column);
            FilterOutcome::Empty { column }
        } else {
            FilterOutcome::Filtered {
                column,
                rows: filtered.height(),
            }
        };
        Ok((filtered, outcome))
    }
}
