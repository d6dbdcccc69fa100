//! Geocode Lookup
//!
//! Owns the cached manifest and column graph and exposes the resolution API.
//! Both caches stay valid until `invalidate` or `rebuild`; both take
//! `&mut self`, so no resolution can observe a half rebuilt graph.

use crate::authority::AuthorityFilter;
use crate::config::LookupConfig;
use crate::error::Result;
use crate::executor::{GeocodeResult, JoinExecutor};
use crate::graph::ColumnGraph;
use crate::manifest::{Manifest, TableIndexer};
use crate::resolver::{JoinPath, PathResolver, ResolveOptions};
use tracing::info;

/// How much of the cached state is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    ManifestReady,
    GraphReady,
}

pub struct GeocodeLookup {
    config: LookupConfig,
    manifest: Option<Manifest>,
    graph: Option<ColumnGraph>,
}

impl GeocodeLookup {
    /// Create without touching storage; the manifest is loaded on first use.
    pub fn new(config: LookupConfig) -> Self {
        Self {
            config,
            manifest: None,
            graph: None,
        }
    }

    /// Load the persisted manifest, rebuilding it when missing or stale.
    pub fn open(config: LookupConfig) -> Result<Self> {
        let mut lookup = Self::new(config);
        lookup.manifest()?;
        Ok(lookup)
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        match (&self.manifest, &self.graph) {
            (_, Some(_)) => Stage::GraphReady,
            (Some(_), None) => Stage::ManifestReady,
            (None, None) => Stage::Init,
        }
    }

    pub fn manifest(&mut self) -> Result<&Manifest> {
        let manifest = match self.manifest.take() {
            Some(m) => m,
            None => TableIndexer::new(&self.config).load_or_rebuild()?,
        };
        Ok(self.manifest.insert(manifest))
    }

    /// The column graph, built once per manifest.
    pub fn build_graph(&mut self) -> Result<&ColumnGraph> {
        let scope = self.config.graph_scope;
        let graph = match self.graph.take() {
            Some(g) => g,
            None => ColumnGraph::from_manifest(self.manifest()?, scope),
        };
        Ok(self.graph.insert(graph))
    }

    /// True when the cached manifest no longer describes the files on disk.
    pub fn is_stale(&self) -> bool {
        match &self.manifest {
            None => true,
            Some(m) => !self.config.manifest_path().exists() || m.verify(&self.config).is_err(),
        }
    }

    /// Drop the cached manifest and graph and delete the persisted manifest.
    pub fn invalidate(&mut self) -> Result<()> {
        let path = self.config.manifest_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.manifest = None;
        self.graph = None;
        info!("🗑️  Lookup cache invalidated");
        Ok(())
    }

    /// Re-index the lookup tables now and persist the result.
    pub fn rebuild(&mut self) -> Result<&Manifest> {
        let manifest = TableIndexer::new(&self.config).rebuild()?;
        self.graph = None;
        Ok(self.manifest.insert(manifest))
    }

    pub fn resolve(&mut self, start: &str, end: &str, options: &ResolveOptions) -> Result<Vec<JoinPath>> {
        let graph = self.build_graph()?;
        PathResolver::new(graph).resolve(start, end, options)
    }

    pub fn materialize(&self, path: &JoinPath, authorities: Option<&[String]>) -> Result<GeocodeResult> {
        let filter = authorities.map(|names| AuthorityFilter::new(names.iter().cloned(), &self.config));
        JoinExecutor::new(&self.config)?.materialize(path, filter.as_ref())
    }

    /// Materialize the first `n` paths in resolution order.
    pub fn top_results(
        &mut self,
        start: &str,
        end: &str,
        options: &ResolveOptions,
        n: usize,
    ) -> Result<Vec<GeocodeResult>> {
        let paths = self.resolve(start, end, options)?;
        let authorities = (!options.authorities.is_empty()).then_some(options.authorities.as_slice());
        paths
            .iter()
            .take(n)
            .map(|path| self.materialize(path, authorities))
            .collect()
    }
}
