//! Path Resolver
//!
//! Breadth-first search over the column graph. Every predecessor edge found on
//! the level that first reaches the end column is kept, so all paths tying
//! for the fewest joins come back, not just one.

use crate::config::LookupConfig;
use crate::error::{GeocodeError, Result};
use crate::graph::{ColumnEdge, ColumnGraph};
use crate::manifest::TableRef;
use crate::variant::{VariantPolicy, VariantScore};
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Ordered chain of joins from a start column to an end column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JoinPath {
    pub edges: Vec<ColumnEdge>,
}

impl JoinPath {
    /// Number of joins.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn start(&self) -> &str {
        self.edges.first().map(|e| e.from.as_str()).unwrap_or_default()
    }

    pub fn end(&self) -> &str {
        self.edges.last().map(|e| e.to.as_str()).unwrap_or_default()
    }

    /// Distinct tables in the order they are joined.
    pub fn tables(&self) -> Vec<&TableRef> {
        self.edges.iter().map(|e| &e.table).unique().collect()
    }

    /// Columns shared between consecutive tables.
    pub fn join_columns(&self) -> Vec<&str> {
        self.edges
            .iter()
            .take(self.edges.len().saturating_sub(1))
            .map(|e| e.to.as_str())
            .collect()
    }

    pub fn reversed(&self) -> JoinPath {
        JoinPath {
            edges: self.edges.iter().rev().map(ColumnEdge::reversed).collect(),
        }
    }

    fn variant_score(&self) -> VariantScore {
        let groupings: Vec<&str> = self.tables().iter().map(|t| t.grouping.as_str()).collect();
        VariantScore::compute(&self.join_columns(), &groupings, self.end())
    }
}

impl fmt::Display for JoinPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut previous: Option<&TableRef> = None;
        write!(f, "{}", self.start())?;
        for edge in &self.edges {
            if previous == Some(&edge.table) {
                continue;
            }
            match previous {
                None => write!(f, " -> {}", edge.table)?,
                Some(_) => write!(f, " -[{}]-> {}", edge.from, edge.table)?,
            }
            previous = Some(&edge.table);
        }
        write!(f, " -> {}", self.end())
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub policy: VariantPolicy,

    /// Cap on returned paths, applied after the variant policy
    pub max_paths: usize,

    /// Local authority names constraining materialized results
    pub authorities: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from_config(&LookupConfig::default())
    }
}

impl ResolveOptions {
    pub fn from_config(config: &LookupConfig) -> Self {
        Self {
            policy: config.variant_policy,
            max_paths: config.max_paths,
            authorities: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: VariantPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_authorities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorities = names.into_iter().map(Into::into).collect();
        self
    }
}

pub struct PathResolver<'g> {
    graph: &'g ColumnGraph,
}

impl<'g> PathResolver<'g> {
    pub fn new(graph: &'g ColumnGraph) -> Self {
        Self { graph }
    }

    /// All minimum-length paths from `start` to `end`, ordered by the variant policy.
    pub fn resolve(&self, start: &str, end: &str, options: &ResolveOptions) -> Result<Vec<JoinPath>> {
        let start = LookupConfig::normalize_column(start);
        let end = LookupConfig::normalize_column(end);
        info!("🔍 Resolving join path {} -> {}", start, end);

        for column in [&start, &end] {
            if !self.graph.contains(column) {
                return Err(GeocodeError::UnknownColumn(column.clone()));
            }
        }
        if start == end {
            return Err(GeocodeError::SameColumn(start));
        }

        let mut paths = self.same_table_paths(&start, &end);
        if paths.is_empty() {
            paths = self.shortest_paths(&start, &end)?;
        } else {
            debug!("{} and {} share {} table(s)", start, end, paths.len());
        }

        // Every tie is ranked before the cap applies.
        paths.sort();
        let mut paths = apply_policy(paths, options.policy);
        let cap = options.max_paths.max(1);
        if paths.len() > cap {
            debug!("Keeping {} of {} tied paths", cap, paths.len());
            paths.truncate(cap);
        }
        info!(
            "✅ Found {} path(s) of {} join(s)",
            paths.len(),
            paths.first().map(JoinPath::len).unwrap_or_default()
        );
        Ok(paths)
    }

    fn same_table_paths(&self, start: &str, end: &str) -> Vec<JoinPath> {
        self.graph
            .shared_tables(start, end)
            .into_iter()
            .map(|table| JoinPath {
                edges: vec![ColumnEdge {
                    from: start.to_string(),
                    to: end.to_string(),
                    table,
                }],
            })
            .collect()
    }

    fn shortest_paths(&self, start: &str, end: &str) -> Result<Vec<JoinPath>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut predecessors: HashMap<&str, Vec<(&str, &TableRef)>> = HashMap::new();
        let mut frontier = vec![start];
        depth.insert(start, 0);

        let mut level = 0;
        while !depth.contains_key(end) {
            if frontier.is_empty() {
                return Err(GeocodeError::NoPath {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }

            level += 1;
            let mut next = Vec::new();
            for &node in &frontier {
                for neighbor in self.graph.neighbors(node) {
                    let column = neighbor.column.as_str();
                    match depth.get(column) {
                        None => {
                            depth.insert(column, level);
                            next.push(column);
                            predecessors.entry(column).or_default().push((node, &neighbor.table));
                        }
                        Some(&d) if d == level => {
                            predecessors.entry(column).or_default().push((node, &neighbor.table));
                        }
                        Some(_) => {}
                    }
                }
            }
            debug!("BFS level {}: {} new column(s)", level, next.len());
            frontier = next;
        }

        let mut paths = Vec::new();
        let mut suffix = Vec::new();
        collect_paths(&predecessors, start, end, &mut suffix, &mut paths);
        Ok(paths)
    }
}

/// Walk predecessor edges back from `node` to `start`, emitting each complete path.
fn collect_paths(
    predecessors: &HashMap<&str, Vec<(&str, &TableRef)>>,
    start: &str,
    node: &str,
    suffix: &mut Vec<ColumnEdge>,
    out: &mut Vec<JoinPath>,
) {
    if node == start {
        out.push(JoinPath {
            edges: suffix.iter().rev().cloned().collect(),
        });
        return;
    }

    for &(previous, table) in predecessors.get(node).map(Vec::as_slice).unwrap_or(&[]) {
        suffix.push(ColumnEdge {
            from: previous.to_string(),
            to: node.to_string(),
            table: table.clone(),
        });
        collect_paths(predecessors, start, previous, suffix, out);
        suffix.pop();
    }
}

fn apply_policy(mut paths: Vec<JoinPath>, policy: VariantPolicy) -> Vec<JoinPath> {
    match policy {
        VariantPolicy::Ignore => paths,
        VariantPolicy::Prefer => {
            paths.sort_by_cached_key(JoinPath::variant_score);
            paths
        }
        VariantPolicy::Restrict => {
            let best = paths.iter().map(JoinPath::variant_score).min();
            paths.retain(|p| Some(p.variant_score()) == best);
            paths
        }
    }
}
