//
//  types.rs
//  Codeweave
//

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::graph::types::ParseDiagnostic;
use crate::graph::{SymbolId, SymbolInfo};

/// Symbols nothing keeps alive, and files nothing loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeadCodeReport {
    pub dead_symbols: Vec<SymbolInfo>,
    /// Files with no entry point, no importer and no live symbol.
    pub dead_files: Vec<PathBuf>,
    pub live_symbols: usize,
}

impl DeadCodeReport {
    pub fn contains(&self, id: SymbolId) -> bool {
        self.dead_symbols.iter().any(|s| s.id == id)
    }
}

/// One strongly connected group of files in the import graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCycle {
    /// Starts at the smallest path, then follows import statements in order.
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionComplexity {
    pub id: SymbolId,
    pub qualified_name: String,
    pub file: PathBuf,
    pub line: usize,
    pub complexity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassComplexity {
    pub id: SymbolId,
    pub qualified_name: String,
    pub file: PathBuf,
    pub methods: usize,
    pub total: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileComplexity {
    pub file: PathBuf,
    pub functions: usize,
    pub total: u32,
    pub max: u32,
    pub average: f64,
}

/// Cyclomatic complexity per function, aggregated per class and file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplexityReport {
    /// Most complex first.
    pub functions: Vec<FunctionComplexity>,
    pub classes: Vec<ClassComplexity>,
    pub files: Vec<FileComplexity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiagnostics {
    pub file: PathBuf,
    pub diagnostics: Vec<ParseDiagnostic>,
}
