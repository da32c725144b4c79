//! Language detection and tree-sitter grammar loading.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tree_sitter::Language;

/// Supported programming languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SupportedLanguage {
    Python,
    JavaScript,
}

impl SupportedLanguage {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "py" | "pyw" => Some(SupportedLanguage::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(SupportedLanguage::JavaScript),
            _ => None,
        }
    }

    /// Get the tree-sitter Language for this language.
    pub fn tree_sitter_language(&self) -> Language {
        match self {
            SupportedLanguage::Python => tree_sitter_python::LANGUAGE.into(),
            SupportedLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            SupportedLanguage::Python => "Python",
            SupportedLanguage::JavaScript => "JavaScript",
        }
    }

    /// Key used in `[project] languages`.
    pub fn config_key(&self) -> &'static str {
        match self {
            SupportedLanguage::Python => "python",
            SupportedLanguage::JavaScript => "javascript",
        }
    }

    /// Extensions tried when resolving an extension-less module path.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SupportedLanguage::Python => &["py"],
            SupportedLanguage::JavaScript => &["js", "mjs", "cjs", "jsx"],
        }
    }
}

impl fmt::Display for SupportedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(
            SupportedLanguage::from_path(Path::new("pkg/mod.py")),
            Some(SupportedLanguage::Python)
        );
        assert_eq!(
            SupportedLanguage::from_path(Path::new("web/app.mjs")),
            Some(SupportedLanguage::JavaScript)
        );
        assert_eq!(SupportedLanguage::from_path(Path::new("main.rs")), None);
        assert_eq!(SupportedLanguage::from_path(Path::new("Makefile")), None);
    }
}
