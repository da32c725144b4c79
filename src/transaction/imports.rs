//! Import statements as edits: render, insert and remove.

use std::collections::BTreeMap;
use std::path::Path;

use super::edit::{clause_removal, line_end, statement_removal, TextEdit};
use super::RejectReason;
use crate::graph::types::{ImportBinding, ImportForm, ImportResolution, Span};
use crate::graph::FileExtraction;
use crate::parser::{ImportRequest, LanguageAdapter, ModuleContext};

/// Specifier `importer` uses for `target`.
pub(super) fn specifier(
    adapter: &dyn LanguageAdapter,
    importer: &Path,
    target: &Path,
    ctx: &ModuleContext,
) -> Result<String, RejectReason> {
    adapter
        .module_specifier(importer, target, ctx)
        .ok_or_else(|| RejectReason::Unimportable {
            from: importer.to_path_buf(),
            to: target.to_path_buf(),
        })
}

/// Like [`specifier`], keeping the relative form when the statement being
/// rewritten was written relative and the target is reachable that way.
pub(super) fn specifier_like(
    adapter: &dyn LanguageAdapter,
    importer: &Path,
    target: &Path,
    ctx: &ModuleContext,
    written: &str,
) -> Result<String, RejectReason> {
    if written.starts_with('.') {
        if let Some(relative) = adapter.relative_specifier(importer, target) {
            if adapter.module_candidates(importer, &relative, ctx).iter().any(|c| c == target) {
                return Ok(relative);
            }
        }
    }
    specifier(adapter, importer, target, ctx)
}

/// The request that re-creates `binding` with a different specifier.
pub(super) fn request_for(binding: &ImportBinding, specifier: String) -> ImportRequest {
    // `from pkg import sub` bound a submodule; say so explicitly.
    if binding.form == ImportForm::Named && matches!(binding.resolution, ImportResolution::Module(_)) {
        return ImportRequest::module(specifier).with_alias(Some(binding.local_name.clone()));
    }
    let name = match binding.form {
        ImportForm::Named => binding.imported.clone(),
        ImportForm::Default | ImportForm::Namespace | ImportForm::Require => {
            Some(binding.local_name.clone())
        }
        ImportForm::Module | ImportForm::Wildcard => None,
    };
    let alias = match binding.form {
        ImportForm::Named | ImportForm::Module => binding.alias.clone(),
        _ => None,
    };
    ImportRequest {
        specifier,
        form: binding.form,
        name,
        alias,
    }
}

/// Whether an existing binding already is what `request` would add.
pub(super) fn same_import(binding: &ImportBinding, request: &ImportRequest) -> bool {
    if binding.module != request.specifier || binding.form != request.form || binding.reexport {
        return false;
    }
    match request.form {
        ImportForm::Wildcard => true,
        ImportForm::Named => binding.imported == request.name && binding.alias == request.alias,
        _ => request.local_name().as_deref() == Some(binding.local_name.as_str()),
    }
}

/// One rendered import or re-export line.
pub(super) fn render(
    adapter: &dyn LanguageAdapter,
    request: &ImportRequest,
    reexport: bool,
) -> Option<String> {
    if reexport {
        adapter.render_reexport(request)
    } else {
        Some(adapter.render_import(request))
    }
}

/// Whether the statement binds through `require` rather than import syntax.
pub(super) fn is_require_statement(text: &str, extraction: &FileExtraction, statement: usize) -> bool {
    extraction
        .import_statements
        .get(statement)
        .is_some_and(|s| s.span.slice(text).contains("require("))
}

/// Insert `lines` at the file's import insertion point.
pub(super) fn insertion(
    extraction: Option<&FileExtraction>,
    text: &str,
    separator: &str,
    lines: &[String],
) -> Option<TextEdit> {
    if lines.is_empty() {
        return None;
    }
    let at = extraction.map_or(0, |e| e.import_insertion.min(text.len()));
    let mut block = lines.join("\n");
    block.push('\n');
    if at > 0 && !text[..at].ends_with('\n') {
        block.insert(0, '\n');
    }
    let has_imports = extraction.is_some_and(|e| e.import_statements.iter().any(|s| s.top_level));
    let rest = &text[at..];
    if !has_imports && !rest.trim().is_empty() && !rest.starts_with('\n') {
        block.push_str(separator);
    }
    Some(TextEdit::insert(at, block))
}

/// Edits removing the given binding symbols (extraction indices). A statement
/// that loses every binding goes entirely.
pub(super) fn removal_edits(extraction: &FileExtraction, text: &str, bindings: &[usize]) -> Vec<TextEdit> {
    let mut by_statement: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &index in bindings {
        let Some(binding) = extraction.symbols.get(index).and_then(|s| s.kind.as_import()) else {
            continue;
        };
        by_statement.entry(binding.statement).or_default().push(index);
    }

    let mut edits = Vec::new();
    for (statement, mut indices) in by_statement {
        let Some(stmt) = extraction.import_statements.get(statement) else {
            continue;
        };
        indices.sort_unstable();
        indices.dedup();
        if stmt.bindings.iter().all(|b| indices.contains(b)) {
            let (start, end) = statement_removal(text, stmt.span);
            edits.push(TextEdit::delete(start, end));
            continue;
        }
        let named: Vec<usize> = stmt
            .bindings
            .iter()
            .copied()
            .filter(|&b| {
                extraction
                    .symbols
                    .get(b)
                    .and_then(|s| s.kind.as_import())
                    .is_some_and(|i| i.form == ImportForm::Named)
            })
            .collect();
        if !named.is_empty() && named.iter().all(|b| indices.contains(b)) {
            if let Some((start, end)) = named_group_removal(extraction, text, stmt.span, &named) {
                edits.push(TextEdit::delete(start, end));
                indices.retain(|i| !named.contains(i));
            }
        }
        for index in indices {
            if let Some(binding) = extraction.symbols[index].kind.as_import() {
                let (start, end) = clause_removal(text, binding.clause_span, stmt.span);
                edits.push(TextEdit::delete(start, end));
            }
        }
    }
    edits
}

/// Range removing a whole `{ ... }` group, with the comma joining it to the
/// default import (`import main, { a } from 'm'`).
fn named_group_removal(
    extraction: &FileExtraction,
    text: &str,
    statement: Span,
    named: &[usize],
) -> Option<(usize, usize)> {
    let clauses: Vec<Span> = named
        .iter()
        .filter_map(|&b| extraction.symbols.get(b)?.kind.as_import())
        .map(|b| b.clause_span)
        .collect();
    let first = clauses.iter().map(|c| c.start).min()?;
    let last = clauses.iter().map(|c| c.end).max()?;
    let open = statement.start + text.get(statement.start..first)?.rfind('{')?;
    let close = last + text.get(last..statement.end)?.find('}')? + 1;
    let before = text.get(statement.start..open)?.trim_end();
    if before.ends_with(',') {
        return Some((statement.start + before.len() - 1, close));
    }
    let after = text.get(close..statement.end)?;
    let trimmed = after.trim_start();
    if trimmed.starts_with(',') {
        let comma = close + (after.len() - trimmed.len());
        let rest = text.get(comma + 1..statement.end)?;
        let spaces = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        return Some((open, comma + 1 + spaces));
    }
    None
}

/// Insert `lines` on their own lines right after an import statement.
pub(super) fn after_statement(
    extraction: &FileExtraction,
    text: &str,
    statement: usize,
    lines: &[String],
) -> Option<TextEdit> {
    let stmt = extraction.import_statements.get(statement)?;
    let at = line_end(text, stmt.span.end.saturating_sub(1).max(stmt.span.start));
    let mut block = lines.join("\n");
    block.push('\n');
    if at == text.len() && !text.ends_with('\n') {
        block.insert(0, '\n');
    }
    Some(TextEdit::insert(at, block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{adapter_for, extract_file, SupportedLanguage};
    use crate::transaction::edit::apply_edits;

    fn extract(path: &str, text: &str) -> FileExtraction {
        extract_file(Path::new(path), text).unwrap().extraction
    }

    fn index_of(ext: &FileExtraction, local: &str) -> usize {
        ext.symbols
            .iter()
            .position(|s| s.kind.as_import().is_some_and(|b| b.local_name == local))
            .unwrap()
    }

    #[test]
    fn test_insertion_after_imports() {
        let text = "import os\n\n\ndef f():\n    pass\n";
        let ext = extract("a.py", text);
        let edit = insertion(Some(&ext), text, "\n\n", &["from util import helper".into()]).unwrap();
        let out = apply_edits(Path::new("a.py"), text, &[edit]).unwrap();
        assert_eq!(out, "import os\nfrom util import helper\n\n\ndef f():\n    pass\n");
    }

    #[test]
    fn test_insertion_without_imports() {
        let text = "\"\"\"Docs.\"\"\"\ndef f():\n    pass\n";
        let ext = extract("a.py", text);
        let edit = insertion(Some(&ext), text, "\n\n", &["import os".into()]).unwrap();
        let out = apply_edits(Path::new("a.py"), text, &[edit]).unwrap();
        assert_eq!(out, "\"\"\"Docs.\"\"\"\nimport os\n\n\ndef f():\n    pass\n");
    }

    #[test]
    fn test_removal_whole_statement_or_clause() {
        let text = "from util import a, b\nimport os\n\na()\n";
        let ext = extract("m.py", text);
        let one = removal_edits(&ext, text, &[index_of(&ext, "b")]);
        assert_eq!(
            apply_edits(Path::new("m.py"), text, &one).unwrap(),
            "from util import a\nimport os\n\na()\n"
        );
        let both = removal_edits(&ext, text, &[index_of(&ext, "a"), index_of(&ext, "b")]);
        assert_eq!(apply_edits(Path::new("m.py"), text, &both).unwrap(), "import os\n\na()\n");
    }

    #[test]
    fn test_removal_drops_empty_named_group() {
        let text = "import main, { a, b } from './a';\n\nmain();\n";
        let ext = extract("m.js", text);
        let named = removal_edits(&ext, text, &[index_of(&ext, "a"), index_of(&ext, "b")]);
        assert_eq!(
            apply_edits(Path::new("m.js"), text, &named).unwrap(),
            "import main from './a';\n\nmain();\n"
        );
        let one = removal_edits(&ext, text, &[index_of(&ext, "b")]);
        assert_eq!(
            apply_edits(Path::new("m.js"), text, &one).unwrap(),
            "import main, { a } from './a';\n\nmain();\n"
        );
    }

    #[test]
    fn test_request_for_rerenders_binding() {
        let text = "import { a as b } from './util';\nimport * as ns from './util';\n";
        let ext = extract("m.js", text);
        let adapter = adapter_for(SupportedLanguage::JavaScript);
        let binding = ext.symbols[index_of(&ext, "b")].kind.as_import().unwrap();
        let request = request_for(binding, "./lib/util".into());
        assert_eq!(adapter.render_import(&request), "import { a as b } from './lib/util';");
        assert!(same_import(binding, &ImportRequest {
            specifier: "./util".into(),
            form: ImportForm::Named,
            name: Some("a".into()),
            alias: Some("b".into()),
        }));

        let ns = ext.symbols[index_of(&ext, "ns")].kind.as_import().unwrap();
        let request = request_for(ns, "../util".into());
        assert_eq!(adapter.render_import(&request), "import * as ns from '../util';");
        assert_eq!(
            render(adapter, &request, true).as_deref(),
            Some("export * as ns from '../util';")
        );
    }

    #[test]
    fn test_after_statement_at_eof() {
        let text = "from util import a, b";
        let ext = extract("m.py", text);
        let edit = after_statement(&ext, text, 0, &["from lib import c".into()]).unwrap();
        assert_eq!(
            apply_edits(Path::new("m.py"), text, &[edit]).unwrap(),
            "from util import a, b\nfrom lib import c\n"
        );
    }
}
