//
//  error.rs
//  Codeweave
//

//! Error types for the engine.
//!
//! Parse problems and resolution warnings are not errors: they are recorded on
//! the file and in the graph so queries keep working. Transaction failures have
//! their own typed results in [`crate::transaction`].

use std::path::PathBuf;

/// Crate-level error for loading, parsing and persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported language for file: {0}")]
    UnsupportedLanguage(PathBuf),

    #[error("Failed to initialise parser for {language}: {reason}")]
    ParserInit { language: String, reason: String },

    #[error("tree-sitter returned no tree for {0} source")]
    TreeSitterParseFailed(String),

    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Cache blob error: {0}")]
    Cache(#[from] bincode::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
