//! Join Executor
//!
//! Turns a resolved `JoinPath` into one table: each table on the path is read
//! in full and inner-joined onto the accumulated frame on the column the edge
//! says they share.

use crate::authority::{AuthorityFilter, FilterOutcome};
use crate::config::LookupConfig;
use crate::error::{GeocodeError, Result};
use crate::manifest::TableRef;
use crate::reader::TableReader;
use crate::resolver::JoinPath;
use itertools::Itertools;
use polars::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A materialized lookup
#[derive(Debug, Clone)]
pub struct GeocodeResult {
    pub frame: DataFrame,
    pub path: JoinPath,
    /// Outcome of the last filter pass, when authorities were requested
    pub filter: Option<FilterOutcome>,
}

impl GeocodeResult {
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Sorted distinct values of `column`, ready to hand to the statistics API.
    pub fn code_values(&self, column: &str) -> Result<Vec<String>> {
        let column = LookupConfig::normalize_column(column);
        let series = self
            .frame
            .column(&column)
            .map_err(|_| GeocodeError::UnknownColumn(column.clone()))?;
        let values: BTreeSet<String> = series
            .str()?
            .into_iter()
            .flatten()
            .map(|v| v.to_string())
            .collect();
        Ok(values.into_iter().collect())
    }
}

pub struct JoinExecutor {
    root: PathBuf,
    reader: TableReader,
}

impl JoinExecutor {
    pub fn new(config: &LookupConfig) -> Result<Self> {
        Ok(Self {
            root: config.lookups_dir.clone(),
            reader: TableReader::new(config)?,
        })
    }

    pub fn materialize(&self, path: &JoinPath, filter: Option<&AuthorityFilter>) -> Result<GeocodeResult> {
        let tables = path.tables();
        if tables.is_empty() {
            return Err(GeocodeError::Join("cannot materialize an empty path".to_string()));
        }
        info!("🔄 Materializing {}", path);

        let frames = tables
            .iter()
            .map(|table| self.load(table))
            .collect::<Result<Vec<_>>>()?;

        // One authority column for the whole path, picked from every table's schema.
        let authority = match filter {
            Some(filter) => {
                let columns: Vec<&str> = frames.iter().flat_map(|df| df.get_column_names()).unique().collect();
                let column = filter.find_column(&columns).ok_or_else(|| filter.missing_column())?;
                debug!("Filtering on {}", column);
                Some((filter, column))
            }
            None => None,
        };

        let mut frames = tables.iter().zip(frames);
        let mut joined: HashSet<&TableRef> = HashSet::new();
        let mut df = DataFrame::default();
        let mut outcome = None;

        for (i, edge) in path.edges.iter().enumerate() {
            if !joined.insert(&edge.table) {
                continue;
            }
            let right = match frames.next() {
                Some((_, right)) => right,
                None => break,
            };
            df = if i == 0 { right } else { join_on(df, right, &edge.from, &edge.table)? };

            if let Some((filter, column)) = authority.as_ref().filter(|_| outcome.is_none()) {
                if df.column(column).is_ok() {
                    let (filtered, early) = filter.apply_on(&df, column)?;
                    df = filtered;
                    outcome = Some(early);
                }
            }
        }

        if let Some((filter, column)) = &authority {
            let (filtered, last) = filter.apply_on(&df, column)?;
            df = filtered;
            outcome = Some(last);
        }

        let df = df.lazy().unique_stable(None, UniqueKeepStrategy::First).collect()?;
        let df = drop_empty_columns(df, path)?;
        info!("✅ Materialized {} rows x {} columns", df.height(), df.width());

        Ok(GeocodeResult {
            frame: df,
            path: path.clone(),
            filter: outcome,
        })
    }

    /// Full read of a manifest table; a file gone from disk means the manifest is stale.
    fn load(&self, table: &TableRef) -> Result<DataFrame> {
        let path = table.path_under(&self.root);
        if !path.is_file() {
            return Err(GeocodeError::StaleManifest(format!(
                "{} is listed but no longer exists",
                path.display()
            )));
        }
        self.reader.read_table(&path)
    }
}

/// Inner join of `right` onto `left` on `key`, renaming clashing columns of `right`.
fn join_on(left: DataFrame, mut right: DataFrame, key: &str, table: &TableRef) -> Result<DataFrame> {
    if left.column(key).is_err() || right.column(key).is_err() {
        return Err(GeocodeError::Join(format!("{} is not shared with {}", key, table)));
    }

    let existing: HashSet<String> = left.get_column_names().iter().map(|c| c.to_string()).collect();
    let incoming: Vec<String> = right.get_column_names().iter().map(|c| c.to_string()).collect();
    let mut taken: HashSet<String> = existing.iter().chain(incoming.iter()).cloned().collect();
    for name in incoming.iter().filter(|c| c.as_str() != key && existing.contains(*c)) {
        let renamed = unique_name(&format!("{}_{}", name, table.stem()), &taken);
        debug!("Renaming {} from {} to {}", name, table, renamed);
        right.rename(name, &renamed)?;
        taken.insert(renamed);
    }

    let before = left.height();
    let result = left
        .lazy()
        .join(right.lazy(), [col(key)], [col(key)], JoinArgs::new(JoinType::Inner))
        .collect()
        .map_err(|e| GeocodeError::Join(format!("Join with {} on {} failed: {}", table, key, e)))?;

    if before > 0 && result.height() > before * 10 {
        warn!("Join with {} on {} grew {} rows to {}", table, key, before, result.height());
    }
    Ok(result)
}

fn unique_name(candidate: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(candidate) {
        return candidate.to_string();
    }
    (2..)
        .map(|i| format!("{}_{}", candidate, i))
        .find(|c| !taken.contains(c))
        .unwrap_or_else(|| candidate.to_string())
}

/// Drop columns with no values at all, keeping the path's endpoints.
fn drop_empty_columns(df: DataFrame, path: &JoinPath) -> Result<DataFrame> {
    if df.height() == 0 {
        return Ok(df);
    }
    let keep: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|s| s.null_count() < s.len() || s.name() == path.start() || s.name() == path.end())
        .map(|s| s.name().to_string())
        .collect();
    if keep.len() == df.width() {
        return Ok(df);
    }
    Ok(df.select(keep)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ColumnEdge;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, LookupConfig) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("2021")).unwrap();
        std::fs::create_dir_all(root.join("2022")).unwrap();
        std::fs::write(
            root.join("2021/oa_lsoa.csv"),
            "OA21CD,LSOA21CD,NOTES\n\
             E00000001,E01000001,\n\
             E00000002,E01000001,\n\
             E00000003,E01000002,\n\
             E00000004,E01000003,\n",
        )
        .unwrap();
        std::fs::write(
            root.join("2022/lsoa_lad.csv"),
            "LSOA21CD,LAD22CD,LAD22NM,NOTES\n\
             E01000001,E09000023,Lewisham,a\n\
             E01000002,E09000028,Southwark,b\n\
             E01000002,E09000028,Southwark,b\n",
        )
        .unwrap();
        let config = LookupConfig::default().with_lookups_dir(root);
        (temp_dir, config)
    }

    fn two_table_path() -> JoinPath {
        JoinPath {
            edges: vec![
                ColumnEdge {
                    from: "OA21CD".to_string(),
                    to: "LSOA21CD".to_string(),
                    table: TableRef::new("2021", "oa_lsoa.csv"),
                },
                ColumnEdge {
                    from: "LSOA21CD".to_string(),
                    to: "LAD22CD".to_string(),
                    table: TableRef::new("2022", "lsoa_lad.csv"),
                },
            ],
        }
    }

    #[test]
    fn test_inner_join_through_shared_column() {
        let (_dir, config) = fixture();
        let executor = JoinExecutor::new(&config).unwrap();
        let result = executor.materialize(&two_table_path(), None).unwrap();

        // E01000003 has no LAD row; the duplicate Southwark row collapses.
        assert_eq!(result.height(), 3);
        assert!(result.filter.is_none());
        assert_eq!(result.code_values("lad22cd").unwrap(), vec!["E09000023", "E09000028"]);
        assert_eq!(
            result.code_values("OA21CD").unwrap(),
            vec!["E00000001", "E00000002", "E00000003"]
        );
    }

    #[test]
    fn test_colliding_columns_are_renamed() {
        let (_dir, config) = fixture();
        let executor = JoinExecutor::new(&config).unwrap();
        let result = executor.materialize(&two_table_path(), None).unwrap();
        let names = result.frame.get_column_names();

        // The left NOTES column is all empty and gets dropped.
        assert!(!names.contains(&"NOTES"));
        assert!(names.contains(&"NOTES_LSOA_LAD"));
    }

    #[test]
    fn test_filter_applies_to_materialized_rows() {
        let (_dir, config) = fixture();
        let executor = JoinExecutor::new(&config).unwrap();
        let filter = AuthorityFilter::new(["Lewisham"], &config);
        let result = executor.materialize(&two_table_path(), Some(&filter)).unwrap();

        assert_eq!(result.height(), 2);
        assert_eq!(result.code_values("LAD22NM").unwrap(), vec!["Lewisham"]);
        assert!(matches!(result.filter, Some(FilterOutcome::Filtered { rows: 2, .. })));
    }

    #[test]
    fn test_filter_with_no_match_is_empty() {
        let (_dir, config) = fixture();
        let executor = JoinExecutor::new(&config).unwrap();
        let filter = AuthorityFilter::new(["Nonexistent Borough"], &config);
        let result = executor.materialize(&two_table_path(), Some(&filter)).unwrap();

        assert!(result.is_empty());
        assert!(result.filter.unwrap().is_empty());
    }

    #[test]
    fn test_filter_without_authority_column_errors() {
        let (_dir, config) = fixture();
        let executor = JoinExecutor::new(&config).unwrap();
        let path = JoinPath {
            edges: vec![two_table_path().edges[0].clone()],
        };
        let filter = AuthorityFilter::new(["Lewisham"], &config);
        let err = executor.materialize(&path, Some(&filter)).unwrap_err();
        assert!(matches!(err, GeocodeError::NoAuthorityColumn(_)));
    }

    #[test]
    fn test_unknown_code_column() {
        let (_dir, config) = fixture();
        let executor = JoinExecutor::new(&config).unwrap();
        let result = executor.materialize(&two_table_path(), None).unwrap();
        assert!(matches!(result.code_values("FOO"), Err(GeocodeError::UnknownColumn(_))));
    }

    fn edge(from: &str, to: &str, grouping: &str, file: &str) -> ColumnEdge {
        ColumnEdge {
            from: from.to_string(),
            to: to.to_string(),
            table: TableRef::new(grouping, file),
        }
    }

    #[test]
    fn test_filter_column_does_not_depend_on_direction() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("2022")).unwrap();
        std::fs::write(
            root.join("2022/lsoa_utla.csv"),
            "UTLA22CD,UTLA22NM,LSOA21CD\n\
             E10000016,Kent,E01024001\n\
             E10000016,Kent,E01024500\n",
        )
        .unwrap();
        std::fs::write(
            root.join("2022/lsoa_lad.csv"),
            "LSOA21CD,LAD22CD,LAD22NM\n\
             E01024001,E07000110,Maidstone\n\
             E01024500,E07000108,Dover\n",
        )
        .unwrap();
        let config = LookupConfig::default().with_lookups_dir(root);
        let executor = JoinExecutor::new(&config).unwrap();
        let filter = AuthorityFilter::new(["Maidstone"], &config);

        let forward = JoinPath {
            edges: vec![
                edge("UTLA22CD", "LSOA21CD", "2022", "lsoa_utla.csv"),
                edge("LSOA21CD", "LAD22CD", "2022", "lsoa_lad.csv"),
            ],
        };
        let backward = forward.reversed();

        let unfiltered = executor.materialize(&forward, None).unwrap();
        assert_eq!(unfiltered.height(), 2);

        for path in [&forward, &backward] {
            let result = executor.materialize(path, Some(&filter)).unwrap();
            assert_eq!(result.height(), 1);
            assert_eq!(result.code_values("LAD22CD").unwrap(), vec!["E07000110"]);
            assert_eq!(
                result.filter,
                Some(FilterOutcome::Filtered {
                    column: "LAD22NM".to_string(),
                    rows: 1
                })
            );
        }
    }

    #[test]
    fn test_deleted_table_is_stale_manifest() {
        let (dir, config) = fixture();
        let executor = JoinExecutor::new(&config).unwrap();
        std::fs::remove_file(dir.path().join("2022/lsoa_lad.csv")).unwrap();

        let err = executor.materialize(&two_table_path(), None).unwrap_err();
        assert!(matches!(err, GeocodeError::StaleManifest(_)));
    }
}
