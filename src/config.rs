//
//  config.rs
//  Codeweave
//

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::parser::SupportedLanguage;

/// Directory (relative to the project root) holding config and cache.
pub const STATE_DIR: &str = ".codeweave";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeweaveConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub python: PythonConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub transaction: TransactionConfig,
}

/// Project-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Languages to parse.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Extra directory names skipped during discovery.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Custom ignore file honoured next to .gitignore.
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,
}

/// Python module-path settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Directories (relative to root) that act as import roots.
    #[serde(default = "default_source_roots")]
    pub source_roots: Vec<String>,
}

/// Incremental cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path for the persisted cache blob.
    #[serde(default = "default_cache_path")]
    pub path: String,
}

/// Dead-code analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Public symbols of a wildcard-imported file stay live while the importer is live.
    #[serde(default = "default_true")]
    pub wildcard_keeps_live: bool,
    /// Methods whose name is accessed on an unknown receiver are kept live.
    #[serde(default = "default_true")]
    pub member_access_keeps_live: bool,
}

/// Transaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Reject edits that leave a previously clean file with syntax errors.
    #[serde(default = "default_true")]
    pub verify_syntax: bool,
    /// Create missing parent directories for a move target.
    #[serde(default = "default_true")]
    pub create_dirs: bool,
    /// Persist the cache after every applied transaction.
    #[serde(default = "default_true")]
    pub save_cache: bool,
}

fn default_languages() -> Vec<String> {
    vec!["python".to_string(), "javascript".to_string()]
}

fn default_ignore_file() -> String {
    ".codeweaveignore".to_string()
}

fn default_source_roots() -> Vec<String> {
    vec![".".to_string()]
}

fn default_cache_path() -> String {
    format!("{STATE_DIR}/cache.bin")
}

fn default_true() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            exclude: Vec::new(),
            ignore_file: default_ignore_file(),
        }
    }
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            source_roots: default_source_roots(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            wildcard_keeps_live: true,
            member_access_keeps_live: true,
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            verify_syntax: true,
            create_dirs: true,
            save_cache: true,
        }
    }
}

impl CodeweaveConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "malformed config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Load `<root>/.codeweave/config.toml`.
    pub fn load_for_root(root: &Path) -> Self {
        Self::load(&root.join(STATE_DIR).join("config.toml"))
    }

    /// Resolve the cache blob path against the project root.
    pub fn resolve_cache_path(&self, root: &Path) -> PathBuf {
        root.join(&self.cache.path)
    }

    /// Whether files of `lang` should be indexed.
    pub fn language_enabled(&self, lang: SupportedLanguage) -> bool {
        self.project
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(lang.config_key()))
    }
}
