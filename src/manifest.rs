//! Table Indexer and Manifest
//!
//! The indexer walks the lookups directory (one subdirectory per grouping
//! key, usually a year) and records the header of every tabular file. The
//! result is persisted as a JSON manifest so later runs skip the scan. A
//! manifest is never partially trusted: if any listed file disappeared or
//! changed, `verify` reports it stale and the caller rebuilds.

use crate::config::LookupConfig;
use crate::error::{GeocodeError, Result};
use crate::reader::{TableFormat, TableReader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Identity of a lookup table: grouping key plus path within that grouping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub grouping: String,
    pub file: String,
}

impl TableRef {
    pub fn new(grouping: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            grouping: grouping.into(),
            file: file.into(),
        }
    }

    pub fn path_under(&self, root: &Path) -> PathBuf {
        let mut path = root.join(&self.grouping);
        for part in self.file.split('/') {
            path.push(part);
        }
        path
    }

    /// File name without directories or extension, upper-cased for use in column names.
    pub fn stem(&self) -> String {
        let name = self.file.rsplit('/').next().unwrap_or(&self.file);
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        stem.to_uppercase()
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.grouping, self.file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Normalized column names in file order
    pub columns: Vec<String>,

    /// Columns ending in the code suffix
    pub code_columns: Vec<String>,

    /// Byte size when indexed
    #[serde(default)]
    pub size: u64,

    /// Modification time (unix seconds) when indexed
    #[serde(default)]
    pub modified: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub code_suffix: String,

    /// grouping key -> file -> entry
    pub groupings: BTreeMap<String, BTreeMap<String, TableEntry>>,

    /// Files skipped while indexing
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GeocodeError::Manifest(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| GeocodeError::Manifest(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!("Wrote manifest {}", path.display());
        Ok(())
    }

    /// All tables in grouping then file order.
    pub fn tables(&self) -> impl Iterator<Item = (TableRef, &TableEntry)> + '_ {
        self.groupings.iter().flat_map(|(grouping, files)| {
            files
                .iter()
                .map(move |(file, entry)| (TableRef::new(grouping.clone(), file.clone()), entry))
        })
    }

    pub fn table(&self, table: &TableRef) -> Option<&TableEntry> {
        self.groupings.get(&table.grouping)?.get(&table.file)
    }

    pub fn table_count(&self) -> usize {
        self.groupings.values().map(|files| files.len()).sum()
    }

    /// Check every listed file still exists unchanged.
    pub fn verify(&self, config: &LookupConfig) -> Result<()> {
        if self.code_suffix != config.code_suffix {
            return Err(GeocodeError::StaleManifest(format!(
                "indexed with code suffix {}, configured {}",
                self.code_suffix, config.code_suffix
            )));
        }

        for (table, entry) in self.tables() {
            let path = table.path_under(&config.lookups_dir);
            let meta = std::fs::metadata(&path)
                .map_err(|_| GeocodeError::StaleManifest(format!("{} no longer exists", path.display())))?;
            if meta.len() != entry.size || modified_secs(&meta) != entry.modified {
                return Err(GeocodeError::StaleManifest(format!("{} changed since indexing", path.display())));
            }
        }
        Ok(())
    }
}

fn modified_secs(meta: &std::fs::Metadata) -> Option<i64> {
    meta.modified().ok().map(|t| DateTime::<Utc>::from(t).timestamp())
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("~$")
}

pub struct TableIndexer<'a> {
    config: &'a LookupConfig,
}

impl<'a> TableIndexer<'a> {
    pub fn new(config: &'a LookupConfig) -> Self {
        Self { config }
    }

    /// Scan the lookups directory and build a fresh manifest.
    pub fn scan(&self) -> Result<Manifest> {
        let root = &self.config.lookups_dir;
        if !root.is_dir() {
            return Err(GeocodeError::MissingLookupDir(root.clone()));
        }

        let reader = TableReader::new(self.config)?;
        let mut groupings = BTreeMap::new();
        let mut warnings = Vec::new();

        for dir in sorted_entries(root)? {
            let name = match dir.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if is_hidden(&name) {
                continue;
            }
            if !dir.is_dir() {
                if dir.file_name().and_then(|n| n.to_str()) != Some(self.config.manifest_file.as_str()) {
                    debug!("Ignoring {} outside any grouping directory", dir.display());
                }
                continue;
            }

            let mut files = BTreeMap::new();
            self.scan_grouping(&reader, &dir, &dir, &mut files, &mut warnings)?;
            info!("📂 Indexed grouping {} ({} tables)", name, files.len());
            groupings.insert(name, files);
        }

        let manifest = Manifest {
            generated_at: Utc::now(),
            code_suffix: self.config.code_suffix.clone(),
            groupings,
            warnings,
        };
        info!(
            "✅ Manifest built: {} tables, {} skipped",
            manifest.table_count(),
            manifest.warnings.len()
        );
        Ok(manifest)
    }

    fn scan_grouping(
        &self,
        reader: &TableReader,
        grouping_dir: &Path,
        dir: &Path,
        files: &mut BTreeMap<String, TableEntry>,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        for path in sorted_entries(dir)? {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name.is_empty() || is_hidden(name) {
                continue;
            }
            if path.is_dir() {
                self.scan_grouping(reader, grouping_dir, &path, files, warnings)?;
                continue;
            }

            let key = relative_key(grouping_dir, &path);
            if TableFormat::from_path(&path).is_none() {
                let message = format!("{}: not a tabular file", path.display());
                warn!("Skipping {}", message);
                warnings.push(message);
                continue;
            }

            match self.index_file(reader, &path) {
                Ok(entry) => {
                    files.insert(key, entry);
                }
                Err(e) => {
                    warn!("Skipping unreadable table: {}", e);
                    warnings.push(e.to_string());
                }
            }
        }
        Ok(())
    }

    fn index_file(&self, reader: &TableReader, path: &Path) -> Result<TableEntry> {
        let columns = reader.read_headers(path)?;
        let code_columns = columns
            .iter()
            .filter(|c| self.config.is_code_column(c))
            .cloned()
            .collect();
        let meta = std::fs::metadata(path)?;
        Ok(TableEntry {
            columns,
            code_columns,
            size: meta.len(),
            modified: modified_secs(&meta),
        })
    }

    /// Scan and persist the manifest at the configured location.
    pub fn rebuild(&self) -> Result<Manifest> {
        let manifest = self.scan()?;
        manifest.save(self.config.manifest_path())?;
        Ok(manifest)
    }

    /// Reuse the persisted manifest when it is present and verifies, else rebuild.
    pub fn load_or_rebuild(&self) -> Result<Manifest> {
        let path = self.config.manifest_path();
        if !path.exists() {
            info!("No manifest at {}, indexing lookup tables", path.display());
            return self.rebuild();
        }

        let manifest = match Manifest::load(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!("Discarding unreadable manifest: {}", e);
                return self.rebuild();
            }
        };
        match manifest.verify(self.config) {
            Ok(()) => {
                info!("📖 Reusing manifest {} ({} tables)", path.display(), manifest.table_count());
                Ok(manifest)
            }
            Err(e) => {
                warn!("{}; rebuilding", e);
                self.rebuild()
            }
        }
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn relative_key(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build an in-memory manifest from (grouping, file, columns) triples.
#[cfg(test)]
pub(crate) fn manifest_of(tables: &[(&str, &str, &[&str])]) -> Manifest {
    let mut groupings: BTreeMap<String, BTreeMap<String, TableEntry>> = BTreeMap::new();
    for (grouping, file, columns) in tables {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let code_columns = columns.iter().filter(|c| c.ends_with("CD")).cloned().collect();
        groupings.entry(grouping.to_string()).or_default().insert(
            file.to_string(),
            TableEntry {
                columns,
                code_columns,
                size: 0,
                modified: None,
            },
        );
    }
    Manifest {
        generated_at: Utc::now(),
        code_suffix: "CD".to_string(),
        groupings,
        warnings: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, LookupConfig) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("2021/nested")).unwrap();
        std::fs::create_dir_all(root.join("2022")).unwrap();
        std::fs::write(root.join("2021/oa_lsoa.csv"), "OA21CD,LSOA21CD,LSOA21NM,OBJECTID\nE00,E01,Lewisham 001,1\n").unwrap();
        std::fs::write(root.join("2021/nested/lsoa_msoa.csv"), "LSOA21CD,MSOA21CD\nE01,E02\n").unwrap();
        std::fs::write(root.join("2022/wd_lad.csv"), "WD22CD,LAD22CD,LAD22NM\nE05,E09,Lewisham\n").unwrap();
        std::fs::write(root.join("2022/readme.md"), "not a table").unwrap();
        std::fs::write(root.join("2022/empty.csv"), "").unwrap();
        let config = LookupConfig::default().with_lookups_dir(root);
        (temp_dir, config)
    }

    #[test]
    fn test_scan_indexes_groupings() {
        let (_dir, config) = fixture();
        let manifest = TableIndexer::new(&config).scan().unwrap();

        assert_eq!(manifest.groupings.keys().collect::<Vec<_>>(), vec!["2021", "2022"]);
        assert_eq!(manifest.table_count(), 3);

        let entry = manifest.table(&TableRef::new("2021", "oa_lsoa.csv")).unwrap();
        assert_eq!(entry.columns, vec!["OA21CD", "LSOA21CD", "LSOA21NM"]);
        assert_eq!(entry.code_columns, vec!["OA21CD", "LSOA21CD"]);
        assert!(manifest.table(&TableRef::new("2021", "nested/lsoa_msoa.csv")).is_some());
    }

    #[test]
    fn test_scan_indexes_spreadsheets() {
        let (dir, config) = fixture();
        let fixture = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/wd_lad.xlsx"));
        std::fs::copy(fixture, dir.path().join("2022/wd_lad.xlsx")).unwrap();

        let manifest = TableIndexer::new(&config).scan().unwrap();
        let entry = manifest.table(&TableRef::new("2022", "wd_lad.xlsx")).unwrap();
        assert_eq!(entry.code_columns, vec!["WD22CD", "LAD22CD", "TTWA11CD"]);
    }

    #[test]
    fn test_bad_files_are_warnings_not_errors() {
        let (_dir, config) = fixture();
        let manifest = TableIndexer::new(&config).scan().unwrap();
        assert_eq!(manifest.warnings.len(), 2);
        assert!(manifest.warnings.iter().any(|w| w.contains("readme.md")));
        assert!(manifest.warnings.iter().any(|w| w.contains("empty.csv")));
    }

    #[test]
    fn test_missing_root_is_error() {
        let config = LookupConfig::default().with_lookups_dir("/definitely/not/here");
        assert!(matches!(
            TableIndexer::new(&config).scan(),
            Err(GeocodeError::MissingLookupDir(_))
        ));
    }

    #[test]
    fn test_rebuild_persists_and_reloads() {
        let (_dir, config) = fixture();
        let built = TableIndexer::new(&config).rebuild().unwrap();
        assert!(config.manifest_path().exists());

        let loaded = Manifest::load(config.manifest_path()).unwrap();
        assert_eq!(built, loaded);

        // the manifest file itself is not indexed on the next scan
        let rescanned = TableIndexer::new(&config).scan().unwrap();
        assert_eq!(rescanned.table_count(), 3);
    }

    #[test]
    fn test_verify_detects_deleted_file() {
        let (dir, config) = fixture();
        let manifest = TableIndexer::new(&config).scan().unwrap();
        assert!(manifest.verify(&config).is_ok());

        std::fs::remove_file(dir.path().join("2022/wd_lad.csv")).unwrap();
        assert!(matches!(manifest.verify(&config), Err(GeocodeError::StaleManifest(_))));
    }

    #[test]
    fn test_verify_detects_changed_file() {
        let (dir, config) = fixture();
        let manifest = TableIndexer::new(&config).scan().unwrap();

        std::fs::write(dir.path().join("2022/wd_lad.csv"), "WD22CD,LAD22CD,LAD22NM,CTRY22CD\nE05,E09,Lewisham,E92\n").unwrap();
        assert!(matches!(manifest.verify(&config), Err(GeocodeError::StaleManifest(_))));
    }

    #[test]
    fn test_load_or_rebuild_replaces_stale_manifest() {
        let (dir, config) = fixture();
        let indexer = TableIndexer::new(&config);
        indexer.rebuild().unwrap();

        std::fs::remove_file(dir.path().join("2021/oa_lsoa.csv")).unwrap();
        let manifest = indexer.load_or_rebuild().unwrap();
        assert_eq!(manifest.table_count(), 2);
        assert!(manifest.verify(&config).is_ok());
    }

    #[test]
    fn test_table_ref_paths() {
        let table = TableRef::new("2021", "nested/lsoa_msoa.csv");
        assert_eq!(table.path_under(Path::new("/lookups")), PathBuf::from("/lookups/2021/nested/lsoa_msoa.csv"));
        assert_eq!(table.stem(), "LSOA_MSOA");
        assert_eq!(table.to_string(), "2021/nested/lsoa_msoa.csv");
    }
}
