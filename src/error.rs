use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Lookup directory not found: {0}")]
    MissingLookupDir(PathBuf),

    #[error("Unreadable table {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Could not decode {path} as UTF-8 or {fallback}")]
    Decode { path: PathBuf, fallback: String },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("No path connects {start} to {end}")]
    NoPath { start: String, end: String },

    #[error("Start and end column are the same: {0}")]
    SameColumn(String),

    #[error("Stale manifest: {0}")]
    StaleManifest(String),

    #[error("No local authority name column in table (looked for {0})")]
    NoAuthorityColumn(String),

    #[error("Unknown grouping: {0}")]
    UnknownGrouping(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Join error: {0}")]
    Join(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for GeocodeError {
    fn from(err: polars::error::PolarsError) -> Self {
        GeocodeError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeocodeError>;
