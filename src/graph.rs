use crate::config::GraphScope;
use crate::manifest::{Manifest, TableRef};
use std::collections::BTreeMap;

/// One side of a column co-occurrence: the neighbouring column and the table
/// in which both appear.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Neighbor {
    pub column: String,
    pub table: TableRef,
}

/// A traversed edge: `from` and `to` co-occur in `table`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnEdge {
    pub from: String,
    pub to: String,
    pub table: TableRef,
}

impl ColumnEdge {
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            table: self.table.clone(),
        }
    }
}

/// Undirected multigraph of column names. Every pair of columns in a table is
/// connected, and the same pair seen in two tables yields two parallel edges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnGraph {
    adjacency: BTreeMap<String, Vec<Neighbor>>,
    edge_count: usize,
}

impl ColumnGraph {
    pub fn from_manifest(manifest: &Manifest, scope: GraphScope) -> Self {
        let mut graph = ColumnGraph::default();

        for (table, entry) in manifest.tables() {
            let columns = match scope {
                GraphScope::AllColumns => &entry.columns,
                GraphScope::CodeColumns => &entry.code_columns,
            };
            let mut columns: Vec<&String> = columns.iter().collect();
            columns.sort();
            columns.dedup();

            for column in &columns {
                graph.adjacency.entry((*column).clone()).or_default();
            }
            for (i, a) in columns.iter().enumerate() {
                for b in &columns[i + 1..] {
                    graph.add_edge(a, b, &table);
                }
            }
        }

        for neighbors in graph.adjacency.values_mut() {
            neighbors.sort();
        }
        tracing::info!(
            "🔗 Column graph built: {} columns, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    fn add_edge(&mut self, a: &str, b: &str, table: &TableRef) {
        self.adjacency.entry(a.to_string()).or_default().push(Neighbor {
            column: b.to_string(),
            table: table.clone(),
        });
        self.adjacency.entry(b.to_string()).or_default().push(Neighbor {
            column: a.to_string(),
            table: table.clone(),
        });
        self.edge_count += 1;
    }

    pub fn contains(&self, column: &str) -> bool {
        self.adjacency.contains_key(column)
    }

    pub fn neighbors(&self, column: &str) -> &[Neighbor] {
        self.adjacency.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tables in which both columns appear.
    pub fn shared_tables(&self, a: &str, b: &str) -> Vec<TableRef> {
        self.neighbors(a)
            .iter()
            .filter(|n| n.column == b)
            .map(|n| n.table.clone())
            .collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Undirected edge count, parallel edges counted separately.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}
