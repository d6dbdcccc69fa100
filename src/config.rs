//! Lookup Configuration
//!
//! Defaults, optionally overlaid by a JSON config file and then by
//! `GEOCODE_*` environment variables. CLI flags are applied last by the binary.

use crate::error::{GeocodeError, Result};
use crate::variant::VariantPolicy;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_LOOKUPS_DIR: &str = "GEOCODE_LOOKUPS_DIR";
pub const ENV_MANIFEST: &str = "GEOCODE_MANIFEST";
pub const ENV_FALLBACK_ENCODING: &str = "GEOCODE_FALLBACK_ENCODING";

/// Which columns become graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphScope {
    /// Every column of every table
    #[default]
    AllColumns,

    /// Only columns ending in the code suffix
    CodeColumns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Root directory holding one subdirectory per grouping key
    pub lookups_dir: PathBuf,

    /// Manifest file name, stored directly under `lookups_dir`
    pub manifest_file: String,

    /// Suffix marking a geographic code column
    pub code_suffix: String,

    /// Suffix marking an area name column
    pub name_suffix: String,

    /// Column prefixes identifying local authority columns, in preference order
    pub authority_prefixes: Vec<String>,

    /// Bookkeeping columns removed at ingestion
    pub dropped_columns: Vec<String>,

    /// WHATWG label of the encoding tried when UTF-8 decoding fails
    pub fallback_encoding: String,

    pub graph_scope: GraphScope,

    /// Upper bound on tied paths enumerated per resolution
    pub max_paths: usize,

    pub variant_policy: VariantPolicy,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            lookups_dir: PathBuf::from("lookups"),
            manifest_file: "lookup_manifest.json".to_string(),
            code_suffix: "CD".to_string(),
            name_suffix: "NM".to_string(),
            authority_prefixes: vec!["LAD".to_string(), "UTLA".to_string(), "LTLA".to_string()],
            dropped_columns: vec!["OBJECTID".to_string()],
            fallback_encoding: "latin1".to_string(),
            graph_scope: GraphScope::AllColumns,
            max_paths: 64,
            variant_policy: VariantPolicy::Prefer,
        }
    }
}

impl LookupConfig {
    pub fn with_lookups_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lookups_dir = dir.into();
        self
    }

    /// Load a JSON config file; missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GeocodeError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| GeocodeError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Overlay values from the process environment.
    pub fn apply_env(self) -> Self {
        self.overlay_env(|key| std::env::var(key).ok())
    }

    pub fn overlay_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_LOOKUPS_DIR).filter(|v| !v.trim().is_empty()) {
            self.lookups_dir = PathBuf::from(dir);
        }
        if let Some(manifest) = lookup(ENV_MANIFEST).filter(|v| !v.trim().is_empty()) {
            self.manifest_file = manifest;
        }
        if let Some(label) = lookup(ENV_FALLBACK_ENCODING).filter(|v| !v.trim().is_empty()) {
            self.fallback_encoding = label;
        }
        self
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.lookups_dir.join(&self.manifest_file)
    }

    pub fn fallback_encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.fallback_encoding.trim().as_bytes()).ok_or_else(|| {
            GeocodeError::Config(format!("Unknown fallback encoding: {}", self.fallback_encoding))
        })
    }

    /// Trim and upper-case a column name the same way headers are normalized.
    pub fn normalize_column(name: &str) -> String {
        name.trim().to_uppercase()
    }

    pub fn is_code_column(&self, column: &str) -> bool {
        column.len() > self.code_suffix.len() && column.ends_with(&self.code_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = LookupConfig::default();
        assert_eq!(config.code_suffix, "CD");
        assert_eq!(config.manifest_path(), PathBuf::from("lookups/lookup_manifest.json"));
        assert_eq!(config.fallback_encoding().unwrap(), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("geocode.json");
        std::fs::write(&path, r#"{"lookups_dir": "/data/lookups", "max_paths": 5}"#).unwrap();

        let config = LookupConfig::load(&path).unwrap();
        assert_eq!(config.lookups_dir, PathBuf::from("/data/lookups"));
        assert_eq!(config.max_paths, 5);
        assert_eq!(config.authority_prefixes, vec!["LAD", "UTLA", "LTLA"]);
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            (ENV_LOOKUPS_DIR, "/srv/lookups"),
            (ENV_FALLBACK_ENCODING, "utf-16le"),
        ]
        .into_iter()
        .collect();

        let config = LookupConfig::default().overlay_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.lookups_dir, PathBuf::from("/srv/lookups"));
        assert_eq!(config.manifest_file, "lookup_manifest.json");
        assert_eq!(config.fallback_encoding().unwrap(), encoding_rs::UTF_16LE);
    }

    #[test]
    fn test_unknown_encoding_is_config_error() {
        let mut config = LookupConfig::default();
        config.fallback_encoding = "klingon".to_string();
        assert!(matches!(config.fallback_encoding(), Err(GeocodeError::Config(_))));
    }

    #[test]
    fn test_code_column_classification() {
        let config = LookupConfig::default();
        assert!(config.is_code_column("LSOA21CD"));
        assert!(!config.is_code_column("LSOA21NM"));
        assert!(!config.is_code_column("CD"));
    }
}
