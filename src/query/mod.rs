//! Whole-codebase analyses over the resolved graph.
//!
//! Per-symbol queries (usages, call sites, unused imports) live on
//! `CodeGraph`; the analyses here also need the file extractions.

pub mod complexity;
pub mod cycles;
pub mod dead;
pub mod types;

use crate::graph::ExtractionSet;

pub use complexity::complexity_report;
pub use cycles::import_cycles;
pub use dead::{dead_code, Liveness};
pub use types::{
    ClassComplexity, ComplexityReport, DeadCodeReport, FileComplexity, FileDiagnostics,
    FunctionComplexity, ImportCycle,
};

/// Syntax errors of every partially parsed file, by path.
pub fn parse_diagnostics(files: &dyn ExtractionSet) -> Vec<FileDiagnostics> {
    files
        .paths()
        .into_iter()
        .filter_map(|path| {
            let ext = files.extraction(&path)?;
            let diagnostics = ext.status.diagnostics();
            (!diagnostics.is_empty()).then(|| FileDiagnostics {
                file: path.clone(),
                diagnostics: diagnostics.to_vec(),
            })
        })
        .collect()
}
