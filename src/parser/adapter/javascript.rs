//! JavaScript adapter: ES modules plus CommonJS `require`, relative specifiers.

use std::path::{Component, Path, PathBuf};

use super::{normalize_relative, ImportRequest, LanguageAdapter, ModuleContext};
use crate::error::Result;
use crate::graph::types::{FileExtraction, ImportForm, ParseStatus};
use crate::parser::extractor::javascript as extractor;
use crate::parser::tree::{parse_with, ParseOutcome, SyntaxTree};
use crate::parser::SupportedLanguage;

const KEYWORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

const GLOBALS: &[&str] = &[
    "console", "window", "document", "globalThis", "Math", "JSON", "Object", "Array",
    "Promise", "Date", "Error", "TypeError", "RangeError", "SyntaxError", "String", "Number",
    "Boolean", "Symbol", "BigInt", "Map", "Set", "WeakMap", "WeakSet", "RegExp", "Reflect",
    "Proxy", "Intl", "undefined", "NaN", "Infinity", "parseInt", "parseFloat", "isNaN",
    "isFinite", "setTimeout", "clearTimeout", "setInterval", "clearInterval", "queueMicrotask",
    "structuredClone", "fetch", "require", "module", "exports", "process", "Buffer",
    "__dirname", "__filename", "arguments", "eval",
];

const SOURCE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx"];

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScriptAdapter;

fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".."
}

impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> SupportedLanguage {
        SupportedLanguage::JavaScript
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

    fn module_candidates(&self, importer: &Path, specifier: &str, _ctx: &ModuleContext) -> Vec<PathBuf> {
        let base = if let Some(rooted) = specifier.strip_prefix('/') {
            PathBuf::from(rooted)
        } else if is_relative_specifier(specifier) {
            importer.parent().unwrap_or(Path::new("")).join(specifier)
        } else {
            // Bare specifier: a package outside the tree.
            return Vec::new();
        };
        let Some(base) = normalize_relative(&base) else {
            return Vec::new();
        };

        let has_source_ext = base
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e));
        let mut candidates = Vec::new();
        if has_source_ext {
            candidates.push(base.clone());
        }
        for ext in SOURCE_EXTENSIONS {
            let mut with_ext = base.clone().into_os_string();
            with_ext.push(".");
            with_ext.push(ext);
            candidates.push(PathBuf::from(with_ext));
        }
        candidates.push(base.join("index.js"));
        candidates
    }

    fn module_specifier(&self, importer: &Path, target: &Path, _ctx: &ModuleContext) -> Option<String> {
        let from: Vec<Component> = importer.parent().unwrap_or(Path::new("")).components().collect();
        let to: Vec<Component> = target.components().collect();
        let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

        let mut parts: Vec<String> = Vec::new();
        for _ in common..from.len() {
            parts.push("..".to_string());
        }
        for comp in &to[common..] {
            parts.push(comp.as_os_str().to_str()?.to_string());
        }
        let last = parts.pop()?;
        let stem = last.strip_suffix(".js").unwrap_or(&last);
        parts.push(stem.to_string());

        let joined = parts.join("/");
        if joined.starts_with("..") {
            Some(joined)
        } else {
            Some(format!("./{joined}"))
        }
    }

    fn render_import(&self, request: &ImportRequest) -> String {
        let spec = &request.specifier;
        let name = request.name.clone().unwrap_or_default();
        match request.form {
            ImportForm::Named => match &request.alias {
                Some(alias) => format!("import {{ {name} as {alias} }} from '{spec}';"),
                None => format!("import {{ {name} }} from '{spec}';"),
            },
            ImportForm::Default => {
                let local = request.alias.clone().unwrap_or(name);
                format!("import {local} from '{spec}';")
            }
            ImportForm::Namespace => {
                let local = request.alias.clone().unwrap_or(name);
                format!("import * as {local} from '{spec}';")
            }
            ImportForm::Wildcard => format!("export * from '{spec}';"),
            ImportForm::Require => {
                let local = request.alias.clone().unwrap_or(name);
                format!("const {local} = require('{spec}');")
            }
            ImportForm::Module => format!("import '{spec}';"),
        }
    }

    fn render_reexport(&self, request: &ImportRequest) -> Option<String> {
        let spec = &request.specifier;
        match (request.form, &request.name, &request.alias) {
            (ImportForm::Named, Some(name), Some(alias)) => {
                Some(format!("export {{ {name} as {alias} }} from '{spec}';"))
            }
            (ImportForm::Named, Some(name), None) => Some(format!("export {{ {name} }} from '{spec}';")),
            (ImportForm::Wildcard, _, _) => Some(format!("export * from '{spec}';")),
            (ImportForm::Namespace, name, alias) => {
                let local = alias.as_ref().or(name.as_ref())?;
                Some(format!("export * as {local} from '{spec}';"))
            }
            _ => None,
        }
    }

    fn line_comment(&self) -> &'static str {
        "//"
    }

    fn is_builtin(&self, name: &str) -> bool {
        GLOBALS.contains(&name)
    }

    fn is_valid_identifier(&self, name: &str) -> bool {
        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c == '_' || c == '$' || c.is_alphabetic());
        first_ok
            && chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
            && !KEYWORDS.contains(&name)
    }

    fn self_names(&self) -> &'static [&'static str] {
        &["this"]
    }

    fn is_public_name(&self, _name: &str) -> bool {
        true
    }

    fn export_prefix(&self) -> Option<&'static str> {
        Some("export ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_candidates() {
        let adapter = JavaScriptAdapter;
        let c = adapter.module_candidates(
            Path::new("src/app.js"),
            "../lib/util",
            &ModuleContext::default(),
        );
        assert_eq!(c[0], PathBuf::from("lib/util.js"));
        assert_eq!(c.last(), Some(&PathBuf::from("lib/util/index.js")));
    }

    #[test]
    fn test_bare_specifier_is_external() {
        let adapter = JavaScriptAdapter;
        assert!(adapter
            .module_candidates(Path::new("a.js"), "react", &ModuleContext::default())
            .is_empty());
    }

    #[test]
    fn test_module_specifier() {
        let adapter = JavaScriptAdapter;
        let ctx = ModuleContext::default();
        assert_eq!(
            adapter.module_specifier(Path::new("main.js"), Path::new("lib/util2.js"), &ctx),
            Some("./lib/util2".to_string())
        );
        assert_eq!(
            adapter.module_specifier(Path::new("src/a/b.js"), Path::new("src/c.js"), &ctx),
            Some("../c".to_string())
        );
    }

    #[test]
    fn test_render_import() {
        let adapter = JavaScriptAdapter;
        assert_eq!(
            adapter.render_import(&ImportRequest::named("./lib/util2", "helper")),
            "import { helper } from './lib/util2';"
        );
        assert_eq!(
            adapter
                .render_reexport(&ImportRequest::named("./util", "helper").with_alias(Some("h".into())))
                .as_deref(),
            Some("export { helper as h } from './util';")
        );
    }
}
