//! Python adapter: dotted module paths, package `__init__.py`, relative imports.

use std::path::{Path, PathBuf};

use super::{normalize_relative, ImportRequest, LanguageAdapter, ModuleContext};
use crate::error::Result;
use crate::graph::types::{FileExtraction, ImportForm, ParseStatus};
use crate::parser::extractor::python as extractor;
use crate::parser::tree::{parse_with, ParseOutcome, SyntaxTree};
use crate::parser::SupportedLanguage;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes", "callable",
    "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate",
    "eval", "exec", "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr",
    "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len",
    "list", "locals", "map", "max", "memoryview", "min", "next", "object", "oct", "open", "ord",
    "pow", "print", "property", "range", "repr", "reversed", "round", "set", "setattr", "slice",
    "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "__import__",
    "__name__", "__file__", "__doc__", "__spec__", "__package__", "__builtins__", "__debug__",
    "NotImplemented", "Ellipsis", "Exception", "BaseException", "ArithmeticError",
    "AssertionError", "AttributeError", "EOFError", "FileNotFoundError", "ImportError",
    "IndexError", "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError",
    "ModuleNotFoundError", "NameError", "NotImplementedError", "OSError", "OverflowError",
    "PermissionError", "RecursionError", "RuntimeError", "StopIteration", "StopAsyncIteration",
    "SyntaxError", "SystemExit", "TimeoutError", "TypeError", "UnicodeError", "ValueError",
    "ZeroDivisionError", "Warning", "DeprecationWarning", "UserWarning",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct PythonAdapter;

fn dotted_to_path(dotted: &str) -> PathBuf {
    dotted.split('.').filter(|s| !s.is_empty()).collect()
}

fn module_files(base: &Path) -> [PathBuf; 2] {
    [base.with_extension("py"), base.join("__init__.py")]
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> SupportedLanguage {
        SupportedLanguage::Python
    }

    fn parse(&self, text: &str) -> Result<ParseOutcome> {
        parse_with(self.language(), text)
    }

    fn extract(
        &self,
        path: &Path,
        tree: &SyntaxTree,
        text: &str,
        status: ParseStatus,
    ) -> FileExtraction {
        extractor::extract(path, tree, text, status)
    }

    fn module_candidates(&self, importer: &Path, specifier: &str, ctx: &ModuleContext) -> Vec<PathBuf> {
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        let rest = &specifier[dots..];

        if dots > 0 {
            let mut base = importer.parent().map(Path::to_path_buf).unwrap_or_default();
            for _ in 1..dots {
                base = match base.parent() {
                    Some(p) => p.to_path_buf(),
                    None => return Vec::new(),
                };
            }
            if rest.is_empty() {
                return normalize_relative(&base.join("__init__.py")).into_iter().collect();
            }
            let base = base.join(dotted_to_path(rest));
            return module_files(&base)
                .iter()
                .filter_map(|p| normalize_relative(p))
                .collect();
        }

        if rest.is_empty() {
            return Vec::new();
        }
        let module = dotted_to_path(rest);
        ctx.source_roots
            .iter()
            .flat_map(|root| module_files(&root.join(&module)))
            .filter_map(|p| normalize_relative(&p))
            .collect()
    }

    fn submodule_candidates(&self, package_file: &Path, name: &str) -> Vec<PathBuf> {
        if package_file.file_name().and_then(|n| n.to_str()) != Some("__init__.py") {
            return Vec::new();
        }
        let dir = package_file.parent().unwrap_or(Path::new(""));
        module_files(&dir.join(name)).to_vec()
    }

    fn module_specifier(&self, _importer: &Path, target: &Path, ctx: &ModuleContext) -> Option<String> {
        let relative = ctx
            .source_roots
            .iter()
            .filter_map(|root| target.strip_prefix(root).ok().map(|rest| (root, rest)))
            .max_by_key(|(root, _)| root.components().count())
            .map(|(_, rest)| rest.to_path_buf())?;

        let mut parts: Vec<String> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str().map(str::to_string))
            .collect();
        let last = parts.pop()?;
        let stem = last.strip_suffix(".py").unwrap_or(&last);
        if stem != "__init__" {
            parts.push(stem.to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        }
    }

    fn relative_specifier(&self, importer: &Path, target: &Path) -> Option<String> {
        let from: Vec<&str> = importer
            .parent()
            .unwrap_or(Path::new(""))
            .iter()
            .map(|c| c.to_str())
            .collect::<Option<_>>()?;
        let mut to: Vec<&str> = target.iter().map(|c| c.to_str()).collect::<Option<_>>()?;
        let stem = to.pop()?.strip_suffix(".py")?;
        let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
        // Outside a shared top-level package a relative import cannot reach.
        if common == 0 {
            return None;
        }

        let mut rest: Vec<&str> = to[common..].to_vec();
        if stem != "__init__" {
            rest.push(stem);
        }
        Some(format!("{}{}", ".".repeat(from.len() - common + 1), rest.join(".")))
    }

    fn render_import(&self, request: &ImportRequest) -> String {
        let alias = request
            .alias
            .as_ref()
            .map(|a| format!(" as {a}"))
            .unwrap_or_default();
        match (request.form, &request.name) {
            (ImportForm::Wildcard, _) => format!("from {} import *", request.specifier),
            (ImportForm::Named | ImportForm::Default, Some(name)) => {
                format!("from {} import {name}{alias}", request.specifier)
            }
            _ => format!("import {}{alias}", request.specifier),
        }
    }

    fn line_comment(&self) -> &'static str {
        "#"
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(&name)
    }

    fn is_valid_identifier(&self, name: &str) -> bool {
        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c == '_' || c.is_alphabetic());
        first_ok && chars.all(|c| c == '_' || c.is_alphanumeric()) && !KEYWORDS.contains(&name)
    }

    fn self_names(&self) -> &'static [&'static str] {
        &["self", "cls"]
    }

    fn declaration_separator(&self) -> &'static str {
        "\n\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ModuleContext {
        ModuleContext::default()
    }

    #[test]
    fn test_absolute_candidates() {
        let adapter = PythonAdapter;
        let c = adapter.module_candidates(Path::new("main.py"), "lib.util2", &ctx());
        assert_eq!(
            c,
            vec![
                PathBuf::from("lib/util2.py"),
                PathBuf::from("lib/util2/__init__.py")
            ]
        );
    }

    #[test]
    fn test_relative_candidates() {
        let adapter = PythonAdapter;
        let c = adapter.module_candidates(Path::new("pkg/sub/a.py"), "..b", &ctx());
        assert_eq!(c[0], PathBuf::from("pkg/b.py"));
        let c = adapter.module_candidates(Path::new("pkg/a.py"), ".", &ctx());
        assert_eq!(c, vec![PathBuf::from("pkg/__init__.py")]);
    }

    #[test]
    fn test_source_roots() {
        let adapter = PythonAdapter;
        let ctx = ModuleContext {
            source_roots: vec![PathBuf::from("src"), PathBuf::new()],
        };
        let c = adapter.module_candidates(Path::new("src/app.py"), "core", &ctx);
        assert_eq!(c[0], PathBuf::from("src/core.py"));
        assert_eq!(
            adapter.module_specifier(Path::new("x.py"), Path::new("src/core/models.py"), &ctx),
            Some("core.models".to_string())
        );
    }

    #[test]
    fn test_module_specifier() {
        let adapter = PythonAdapter;
        assert_eq!(
            adapter.module_specifier(Path::new("main.py"), Path::new("lib/util2.py"), &ctx()),
            Some("lib.util2".to_string())
        );
        assert_eq!(
            adapter.module_specifier(Path::new("main.py"), Path::new("pkg/__init__.py"), &ctx()),
            Some("pkg".to_string())
        );
    }

    #[test]
    fn test_relative_specifier() {
        let adapter = PythonAdapter;
        let main = Path::new("pkg/sub/main.py");
        assert_eq!(
            adapter.relative_specifier(main, Path::new("pkg/sub/tools.py")),
            Some(".tools".to_string())
        );
        assert_eq!(
            adapter.relative_specifier(main, Path::new("pkg/other/__init__.py")),
            Some("..other".to_string())
        );
        assert_eq!(adapter.relative_specifier(main, Path::new("pkg/__init__.py")), Some("..".to_string()));
        assert_eq!(adapter.relative_specifier(main, Path::new("lib/util2.py")), None);

        let spec = adapter.relative_specifier(main, Path::new("pkg/core.py")).unwrap();
        assert_eq!(spec, "..core");
        assert_eq!(adapter.module_candidates(main, &spec, &ctx())[0], PathBuf::from("pkg/core.py"));
    }

    #[test]
    fn test_render_import() {
        let adapter = PythonAdapter;
        assert_eq!(
            adapter.render_import(&ImportRequest::named("lib.util2", "helper")),
            "from lib.util2 import helper"
        );
        assert_eq!(
            adapter.render_import(&ImportRequest::module("os").with_alias(Some("o".into()))),
            "import os as o"
        );
    }

    #[test]
    fn test_identifiers() {
        let adapter = PythonAdapter;
        assert!(adapter.is_valid_identifier("helper_2"));
        assert!(!adapter.is_valid_identifier("2x"));
        assert!(!adapter.is_valid_identifier("class"));
        assert!(adapter.is_builtin("print"));
    }
}
