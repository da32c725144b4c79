//
//  mod.rs
//  Codeweave
//

mod helpers;
pub(crate) mod javascript;
pub(crate) mod python;

use std::path::Path;
use std::sync::Arc;

use super::adapter::adapter_for;
use super::language::SupportedLanguage;
use super::tree::SyntaxTree;
use crate::error::{Error, Result};
use crate::graph::types::*;

/// A parsed file: its extraction plus the arena tree edits are planned on.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub extraction: FileExtraction,
    pub tree: Arc<SyntaxTree>,
}

/// Parse a source file and extract its symbols, scopes and reference sites.
///
/// Syntax errors do not fail the call: the file comes back with a
/// `PartialError` status and everything outside the broken regions.
pub fn extract_file(path: &Path, source: &str) -> Result<ParsedFile> {
    let lang = SupportedLanguage::from_path(path)
        .ok_or_else(|| Error::UnsupportedLanguage(path.to_path_buf()))?;
    let adapter = adapter_for(lang);

    let (tree, diagnostics) = adapter.parse(source)?.into_parts();
    let status = if diagnostics.is_empty() {
        ParseStatus::Clean
    } else {
        tracing::debug!(
            file = %path.display(),
            errors = diagnostics.len(),
            "Parsed with syntax errors"
        );
        ParseStatus::PartialError(diagnostics)
    };

    let extraction = adapter.extract(path, &tree, source, status);
    Ok(ParsedFile {
        extraction,
        tree: Arc::new(tree),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension() {
        let err = extract_file(Path::new("main.rs"), "fn main() {}").unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let src = "import os\n\ndef f():\n    return os.getcwd()\n";
        let a = extract_file(Path::new("a.py"), src).unwrap();
        let b = extract_file(Path::new("a.py"), src).unwrap();
        assert_eq!(a.extraction, b.extraction);
    }
}
