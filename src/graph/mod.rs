//! Code graph module: the structural backbone of Codeweave.
//!
//! Provides the graph data model, the petgraph-backed engine, identity
//! preserving incremental updates, discovery and building, and the resolver
//! that derives reference edges from extracted sites.

pub mod builder;
pub mod engine;
pub mod mutation;
pub mod query;
pub mod resolver;
pub mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use builder::{build_graph, discover, extract_parallel, is_indexable, read_sources};
pub use engine::CodeGraph;
pub use resolver::resolve_files;
pub use types::{
    Certainty, EdgeData, EdgeKind, FileExtraction, GraphStats, IdentityHint, ImportResolution,
    ResolutionWarning, Span, Symbol, SymbolId, SymbolInfo, SymbolKind, SymbolKindTag, UnusedImport,
    Usage, WarningKind,
};

/// The set of current extractions the resolver reads from.
pub trait ExtractionSet: Sync {
    fn extraction(&self, path: &Path) -> Option<&FileExtraction>;

    /// Every path in the set, sorted.
    fn paths(&self) -> Vec<PathBuf>;
}

impl ExtractionSet for BTreeMap<PathBuf, FileExtraction> {
    fn extraction(&self, path: &Path) -> Option<&FileExtraction> {
        self.get(path)
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.keys().cloned().collect()
    }
}
