//! # Codeweave
//!
//! A resolved graph of a Python and JavaScript codebase, with transactional
//! refactors that keep every reference pointing where it did.
//!
//! ## Key Features
//!
//! - **Resolved references**: every name use is linked to its declaration
//!   through imports, re-exports and wildcards, or reported as unresolved
//! - **Incremental**: changed files and their dependents are re-resolved,
//!   unchanged files come from a content-hashed cache
//! - **Transactional**: moves, renames and deletes are planned against a
//!   scratch copy and only written when every check passes
//! - **Conservative analyses**: dead code, import cycles, complexity
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! let codebase = codeweave::load("my_project").unwrap();
//!
//! // Move a function; every import of it is rewritten
//! let helper = codebase.symbol("util.py", "helper").unwrap();
//! helper.move_to("lib/util2.py").unwrap();
//!
//! // Nothing refers to these
//! let report = codebase.dead_code_report();
//! ```

pub mod cache;
pub mod cli;
pub mod codebase;
pub mod config;
pub mod error;
pub mod graph;
pub mod parser;
pub mod query;
pub mod transaction;
pub mod watch;
pub mod workspace;
pub mod write;

// Re-exports for convenience
pub use codebase::{Codebase, CodebaseStats, SymbolHandle};
pub use config::CodeweaveConfig;
pub use error::{Error, Result};
pub use graph::{CodeGraph, ResolutionWarning, Span, SymbolId, SymbolInfo, Usage};
pub use parser::{ImportRequest, SupportedLanguage};
pub use query::{ComplexityReport, DeadCodeReport, ImportCycle};
pub use transaction::{
    Operation, RejectReason, Transaction, TransactionError, TransactionReport, TransactionResult,
    TransactionStatus,
};

use std::path::Path;

/// Load the codebase rooted at `root`, using `<root>/.codeweave/config.toml`
/// when present.
pub fn load(root: impl AsRef<Path>) -> Result<Codebase> {
    Codebase::load(root)
}
