//
//  mod.rs
//  Codeweave
//

//! Language adapters.
//!
//! Every language sits behind [`LanguageAdapter`]; the graph builder, the
//! resolver and the transaction engine only ever talk to the trait.

mod javascript;
mod python;

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::Result;
use crate::graph::types::{FileExtraction, ImportForm, ParseStatus};
use crate::parser::tree::{ParseOutcome, SyntaxTree};
use crate::parser::SupportedLanguage;

pub use javascript::JavaScriptAdapter;
pub use python::PythonAdapter;

/// Project-level facts module resolution needs.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// Python import roots, relative to the project root.
    pub source_roots: Vec<PathBuf>,
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self {
            source_roots: vec![PathBuf::new()],
        }
    }
}

/// An import statement to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub specifier: String,
    pub form: ImportForm,
    /// Imported name for `Named`/`Default` forms.
    pub name: Option<String>,
    pub alias: Option<String>,
}

impl ImportRequest {
    pub fn named(specifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            form: ImportForm::Named,
            name: Some(name.into()),
            alias: None,
        }
    }

    pub fn module(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            form: ImportForm::Module,
            name: None,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    /// Name this import binds in the importing file.
    pub fn local_name(&self) -> Option<String> {
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        match self.form {
            ImportForm::Module | ImportForm::Require => {
                self.specifier.split('.').next().map(str::to_string)
            }
            ImportForm::Wildcard => None,
            _ => self.name.clone(),
        }
    }
}

/// Capability interface for one source language.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> SupportedLanguage;

    /// Parse text into an arena tree. Syntax errors yield a partial tree.
    fn parse(&self, text: &str) -> Result<ParseOutcome>;

    /// Walk a parsed tree and emit symbols, scopes and reference sites.
    fn extract(
        &self,
        path: &Path,
        tree: &SyntaxTree,
        text: &str,
        status: ParseStatus,
    ) -> FileExtraction;

    /// Candidate files for a module specifier, in priority order, relative
    /// to the project root. Empty when the specifier names an external package.
    fn module_candidates(&self, importer: &Path, specifier: &str, ctx: &ModuleContext) -> Vec<PathBuf>;

    /// Files that `name` may denote as a submodule of `package_file`.
    fn submodule_candidates(&self, _package_file: &Path, _name: &str) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Specifier `importer` should use to import `target`.
    fn module_specifier(&self, importer: &Path, target: &Path, ctx: &ModuleContext) -> Option<String>;

    /// Specifier relative to the importer's own package, for languages
    /// that also have an absolute form.
    fn relative_specifier(&self, _importer: &Path, _target: &Path) -> Option<String> {
        None
    }

    /// Source text of one import statement, without trailing newline.
    fn render_import(&self, request: &ImportRequest) -> String;

    /// Source text re-exporting from another module, where the language
    /// has a statement for it.
    fn render_reexport(&self, _request: &ImportRequest) -> Option<String> {
        None
    }

    /// Marker that starts a line comment.
    fn line_comment(&self) -> &'static str;

    fn is_builtin(&self, name: &str) -> bool;

    fn is_valid_identifier(&self, name: &str) -> bool;

    /// Names that denote the current instance inside a method.
    fn self_names(&self) -> &'static [&'static str];

    /// Whether a module-level name is part of the file's public surface.
    fn is_public_name(&self, name: &str) -> bool {
        !name.starts_with('_')
    }

    /// Prefix that exports a top-level declaration, where exports are explicit.
    fn export_prefix(&self) -> Option<&'static str> {
        None
    }

    /// Text placed between an existing top-level declaration and one
    /// appended after it.
    fn declaration_separator(&self) -> &'static str {
        "\n"
    }
}

static PYTHON: PythonAdapter = PythonAdapter;
static JAVASCRIPT: JavaScriptAdapter = JavaScriptAdapter;

/// The adapter for a language.
pub fn adapter_for(language: SupportedLanguage) -> &'static dyn LanguageAdapter {
    match language {
        SupportedLanguage::Python => &PYTHON,
        SupportedLanguage::JavaScript => &JAVASCRIPT,
    }
}

/// Lexically normalise a relative path (`a/./b/../c` -> `a/c`).
/// Returns `None` if it escapes the root.
pub(crate) fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        assert_eq!(
            normalize_relative(Path::new("a/./b/../c.js")),
            Some(PathBuf::from("a/c.js"))
        );
        assert_eq!(normalize_relative(Path::new("../x.js")), None);
    }

    #[test]
    fn test_request_local_name() {
        assert_eq!(
            ImportRequest::module("os.path").local_name().as_deref(),
            Some("os")
        );
        assert_eq!(
            ImportRequest::named("util", "helper")
                .with_alias(Some("h".into()))
                .local_name()
                .as_deref(),
            Some("h")
        );
    }
}
