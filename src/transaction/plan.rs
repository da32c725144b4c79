//
//  plan.rs
//  Codeweave
//

//! Validation: plan every operation against a scratch workspace.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::edit::{apply_edits, declaration_lines, EditSet, TextEdit};
use super::imports::{insertion, removal_edits, same_import};
use super::{Operation, RejectReason, Transaction, TransactionResult, TransactionStatus};
use crate::graph::{CodeGraph, IdentityHint, Symbol, SymbolId};
use crate::parser::adapter::normalize_relative;
use crate::parser::{adapter_for, ImportRequest, LanguageAdapter};
use crate::workspace::{FileChange, SourceFile, UpdateSummary, Workspace};

/// Final text of one file a transaction rewrites.
#[derive(Debug, Clone)]
pub(crate) struct PlannedFile {
    pub path: PathBuf,
    /// Text before the transaction; `None` for a file it creates.
    pub original: Option<String>,
    pub text: String,
}

/// A validated transaction: the files to write and the workspace that
/// results from writing them.
#[derive(Debug)]
pub(crate) struct Plan {
    pub base_generation: u64,
    pub scratch: Option<Workspace>,
    pub files: Vec<PlannedFile>,
    pub update: UpdateSummary,
}

/// Plan every operation in order. On success the transaction holds its plan
/// and is `Validated`; on failure it is `Rejected` and nothing changed.
pub fn validate(ws: &Workspace, tx: &mut Transaction) -> TransactionResult {
    tx.require(TransactionStatus::Pending)?;
    let started = Instant::now();
    match plan_operations(ws, &tx.operations) {
        Ok(plan) => {
            info!(
                tx = %tx.id,
                files = plan.files.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Transaction validated"
            );
            tx.plan = Some(plan);
            tx.status = TransactionStatus::Validated;
            Ok(tx.report(UpdateSummary::default()))
        }
        Err(reason) => {
            info!(tx = %tx.id, reason = %reason, "Transaction rejected");
            tx.status = TransactionStatus::Rejected;
            Err(reason.into())
        }
    }
}

fn plan_operations(ws: &Workspace, operations: &[Operation]) -> Result<Plan, RejectReason> {
    let mut planner = Planner::new(ws);
    for op in operations {
        debug!(op = op.label(), "Planning operation");
        planner.plan(op)?;
    }
    planner.finish()
}

pub(super) struct Planner<'w> {
    base: &'w Workspace,
    pub(super) scratch: Workspace,
    /// Text of every touched file before the transaction.
    originals: BTreeMap<PathBuf, Option<String>>,
    update: UpdateSummary,
}

impl<'w> Planner<'w> {
    pub(super) fn new(base: &'w Workspace) -> Self {
        Self {
            base,
            scratch: base.clone(),
            originals: BTreeMap::new(),
            update: UpdateSummary::default(),
        }
    }

    fn plan(&mut self, op: &Operation) -> Result<(), RejectReason> {
        match op {
            Operation::MoveSymbol { symbol, target } => self.move_symbol(*symbol, target),
            Operation::RenameSymbol { symbol, new_name } => self.rename_symbol(*symbol, new_name),
            Operation::DeleteSymbol { symbol } => self.delete_symbol(*symbol),
            Operation::InsertImport { file, request } => self.insert_import(file, request),
            Operation::RemoveImport { file, local_name } => self.remove_import(file, local_name),
            Operation::RewriteSpan {
                file,
                start,
                end,
                text,
                expected,
            } => self.rewrite_span(file, *start, *end, text, expected.as_deref()),
        }
    }

    fn finish(self) -> Result<Plan, RejectReason> {
        let Planner {
            base,
            scratch,
            originals,
            update,
        } = self;
        scratch
            .check_invariants()
            .map_err(|detail| RejectReason::InvariantViolated { detail })?;

        let files = originals
            .into_iter()
            .filter_map(|(path, original)| {
                let text = scratch.file(&path)?.text.clone();
                (original.as_deref() != Some(text.as_str())).then_some(PlannedFile { path, original, text })
            })
            .collect();
        Ok(Plan {
            base_generation: base.generation(),
            scratch: Some(scratch),
            files,
            update,
        })
    }

    // ─── Shared lookups ─────────────────────────────────────────

    pub(super) fn graph(&self) -> &CodeGraph {
        self.scratch.graph()
    }

    pub(super) fn symbol(&self, id: SymbolId) -> Result<Symbol, RejectReason> {
        self.graph()
            .symbol(id)
            .cloned()
            .ok_or(RejectReason::SymbolNotFound { symbol: id })
    }

    pub(super) fn source(&self, path: &Path) -> Result<Arc<SourceFile>, RejectReason> {
        self.scratch
            .file(path)
            .cloned()
            .ok_or_else(|| RejectReason::FileNotFound {
                file: path.to_path_buf(),
            })
    }

    pub(super) fn adapter_of(&self, path: &Path) -> Result<&'static dyn LanguageAdapter, RejectReason> {
        Ok(adapter_for(self.source(path)?.language()))
    }

    /// Root-relative, lexically normalised form of a caller-supplied path.
    pub(super) fn normalize(&self, path: &Path) -> PathBuf {
        let relative = self.scratch.relative(path);
        normalize_relative(&relative).unwrap_or(relative)
    }

    /// Hints that keep `id` and everything nested in it under their ids
    /// once they live in `file` with requalified names.
    pub(super) fn identity_hints(
        &self,
        id: SymbolId,
        file: &Path,
        requalify: impl Fn(&str) -> String,
    ) -> Vec<IdentityHint> {
        let graph = self.graph();
        let Some(symbol) = graph.symbol(id) else {
            return Vec::new();
        };
        graph
            .symbols_in(&symbol.file)
            .iter()
            .filter(|&&member| graph.is_within(member, id))
            .filter_map(|&member| graph.symbol(member))
            .map(|s| IdentityHint {
                id: s.id,
                file: file.to_path_buf(),
                qualified_name: requalify(&s.qualified_name),
                kind: s.kind.tag(),
            })
            .collect()
    }

    // ─── Applying edits to the scratch workspace ────────────────

    /// Apply one operation's edits to the scratch texts and re-resolve.
    pub(super) fn commit(&mut self, edits: EditSet, hints: &[IdentityHint]) -> Result<(), RejectReason> {
        let verify_syntax = self.scratch.config().transaction.verify_syntax;
        let mut changes = Vec::new();
        let mut touched = Vec::new();
        for (path, file_edits) in edits.into_files() {
            let current = self.scratch.file(&path).cloned();
            let before = current.as_ref().map_or("", |f| f.text.as_str());
            let after = apply_edits(&path, before, &file_edits)?;
            if current.is_some() && before == after {
                continue;
            }

            let file = SourceFile::parse(&path, after).map_err(|e| RejectReason::Unreadable {
                file: path.clone(),
                detail: e.to_string(),
            })?;
            let was_clean = current.as_ref().map_or(true, |f| f.is_clean());
            if verify_syntax && was_clean && !file.is_clean() {
                return Err(RejectReason::SyntaxBroken {
                    file: path,
                    errors: file.extraction.status.diagnostics().len(),
                });
            }
            touched.push(path);
            changes.push(FileChange::Upsert(Arc::new(file)));
        }

        for path in touched {
            let original = self.base.file(&path).map(|f| f.text.clone());
            self.originals.entry(path).or_insert(original);
        }
        let summary = self.scratch.apply_changes(changes, hints);
        self.update.changed += summary.changed;
        self.update.removed += summary.removed;
        self.update.resolved += summary.resolved;
        Ok(())
    }

    /// After a move or rename: the symbol is where and what it should be,
    /// and every use still binds to it.
    pub(super) fn verify_identity(
        &self,
        id: SymbolId,
        file: &Path,
        name: &str,
        usages_before: usize,
    ) -> Result<(), RejectReason> {
        let graph = self.graph();
        graph
            .symbol(id)
            .filter(|s| s.file == file && s.name == name)
            .ok_or_else(|| RejectReason::IdentityLost {
                symbol: id,
                file: file.to_path_buf(),
                expected: name.to_string(),
            })?;
        let after = graph.usages(id).len();
        if after != usages_before {
            return Err(RejectReason::UsageCountChanged {
                symbol: id,
                before: usages_before,
                after,
            });
        }
        Ok(())
    }

    // ─── Delete ─────────────────────────────────────────────────

    fn delete_symbol(&mut self, id: SymbolId) -> Result<(), RejectReason> {
        let symbol = self.symbol(id)?;
        if symbol.kind.as_import().is_some() {
            return Err(RejectReason::Unsupported {
                detail: "import bindings are removed with remove_import".into(),
            });
        }
        let graph = self.graph();
        let external = graph.external_usages(id);
        if !external.is_empty() {
            return Err(RejectReason::StillReferenced {
                symbol: id,
                usages: external.len(),
            });
        }
        if let Some(importer) = graph.importers_of(id).first() {
            return Err(RejectReason::StillImported {
                symbol: id,
                file: importer.file.clone(),
            });
        }

        let file = self.source(&symbol.file)?;
        let ext = &file.extraction;
        if symbol.is_top_level()
            && ext
                .export_list
                .iter()
                .flatten()
                .any(|(name, _)| name == &symbol.name)
        {
            return Err(RejectReason::StillExported {
                symbol: id,
                file: symbol.file.clone(),
            });
        }

        let adapter = adapter_for(file.language());
        let lines = declaration_lines(&file.text, symbol.span, adapter.line_comment()).ok_or_else(|| {
            RejectReason::Unsupported {
                detail: format!("`{}` shares its lines with other code", symbol.name),
            }
        })?;
        let (start, end) = lines.removal;
        let mut edits = EditSet::default();
        edits.push(&symbol.file, TextEdit::delete(start, end));

        // Imports only the deleted body used go with it.
        let graph = self.graph();
        let orphaned: Vec<usize> = graph
            .symbols_in(&symbol.file)
            .iter()
            .filter_map(|&b| graph.symbol(b))
            .filter(|b| {
                let Some(binding) = b.kind.as_import() else {
                    return false;
                };
                if binding.reexport || b.attributes.exported || (b.span.start < end && start < b.span.end) {
                    return false;
                }
                let uses = graph.binding_uses(b.id);
                !uses.is_empty() && uses.iter().all(|u| u.from.is_some_and(|f| graph.is_within(f, id)))
            })
            .map(|b| b.index)
            .collect();
        for edit in removal_edits(ext, &file.text, &orphaned) {
            edits.push(&symbol.file, edit);
        }

        debug!(symbol = %id, file = %symbol.file.display(), orphaned = orphaned.len(), "Planned delete");
        self.commit(edits, &[])
    }

    // ─── Import edits ───────────────────────────────────────────

    fn insert_import(&mut self, file: &Path, request: &ImportRequest) -> Result<(), RejectReason> {
        let path = self.normalize(file);
        let source = self.source(&path)?;
        let ext = &source.extraction;
        let adapter = adapter_for(source.language());

        let existing: Vec<_> = ext
            .symbols
            .iter()
            .filter(|s| s.scope == 0 && s.parent.is_none())
            .collect();
        if existing
            .iter()
            .filter_map(|s| s.kind.as_import())
            .any(|b| same_import(b, request))
        {
            debug!(file = %path.display(), "Import already present");
            return Ok(());
        }
        if let Some(local) = request.local_name() {
            let bound = existing.iter().any(|s| s.name == local)
                || ext.scopes.first().is_some_and(|scope| scope.bindings.contains_key(&local));
            if bound {
                return Err(RejectReason::NameCollision {
                    file: path,
                    name: local,
                });
            }
        }

        let line = adapter.render_import(request);
        let mut edits = EditSet::default();
        if let Some(edit) = insertion(Some(ext), &source.text, adapter.declaration_separator(), &[line]) {
            edits.push(&path, edit);
        }
        self.commit(edits, &[])
    }

    fn remove_import(&mut self, file: &Path, local_name: &str) -> Result<(), RejectReason> {
        let path = self.normalize(file);
        let source = self.source(&path)?;
        let graph = self.graph();
        let bindings: Vec<&Symbol> = graph
            .symbols_in(&path)
            .iter()
            .filter_map(|&id| graph.symbol(id))
            .filter(|s| s.parent.is_none())
            .filter(|s| s.kind.as_import().is_some_and(|b| b.local_name == local_name))
            .collect();
        if bindings.is_empty() {
            return Err(RejectReason::ImportNotFound {
                file: path,
                name: local_name.to_string(),
            });
        }

        let listed = source
            .extraction
            .export_list
            .iter()
            .flatten()
            .any(|(name, _)| name == local_name);
        for binding in &bindings {
            let reexport = binding.kind.as_import().is_some_and(|b| b.reexport);
            if listed || reexport || binding.attributes.exported || !graph.binding_uses(binding.id).is_empty() {
                return Err(RejectReason::ImportInUse {
                    file: path,
                    name: local_name.to_string(),
                });
            }
        }

        let indices: Vec<usize> = bindings.iter().map(|b| b.index).collect();
        let mut edits = EditSet::default();
        for edit in removal_edits(&source.extraction, &source.text, &indices) {
            edits.push(&path, edit);
        }
        self.commit(edits, &[])
    }

    // ─── Raw span rewrite ───────────────────────────────────────

    fn rewrite_span(
        &mut self,
        file: &Path,
        start: usize,
        end: usize,
        text: &str,
        expected: Option<&str>,
    ) -> Result<(), RejectReason> {
        let path = self.normalize(file);
        let source = self.source(&path)?;
        let current = source.text.get(start..end).ok_or_else(|| RejectReason::InvalidSpan {
            file: path.clone(),
            start,
            end,
        })?;
        if let Some(expected) = expected {
            if current != expected {
                return Err(RejectReason::UnexpectedText {
                    file: path,
                    expected: expected.to_string(),
                    found: current.to_string(),
                });
            }
        }
        let mut edits = EditSet::default();
        edits.push(&path, TextEdit::replace(start, end, text));
        self.commit(edits, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodeweaveConfig;
    use crate::transaction::{Operation, TransactionError};
    use std::fs;
    use tempfile::tempdir;

    fn workspace(files: &[(&str, &str)]) -> (tempfile::TempDir, Workspace) {
        let dir = tempdir().unwrap();
        for (rel, text) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let mut config = CodeweaveConfig::default();
        config.cache.enabled = false;
        let ws = Workspace::load(dir.path(), config).unwrap();
        (dir, ws)
    }

    fn find(ws: &Workspace, file: &str, name: &str) -> SymbolId {
        ws.graph().find_qualified(Path::new(file), name).unwrap()
    }

    fn rejection(ws: &Workspace, op: Operation) -> RejectReason {
        let mut tx = Transaction::single(op);
        match validate(ws, &mut tx) {
            Err(TransactionError::Rejected { reason }) => {
                assert_eq!(tx.status(), TransactionStatus::Rejected);
                reason
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_referenced_rejected() {
        let (_dir, ws) = workspace(&[
            ("util.py", "def helper():\n    pass\n"),
            ("main.py", "from util import helper\n\nhelper()\n"),
        ]);
        let helper = find(&ws, "util.py", "helper");
        assert!(matches!(
            rejection(&ws, Operation::DeleteSymbol { symbol: helper }),
            RejectReason::StillReferenced { usages: 1, .. }
        ));
    }

    #[test]
    fn test_delete_drops_orphaned_imports() {
        let (_dir, ws) = workspace(&[(
            "a.py",
            "import os\nimport sys\n\n\ndef keep():\n    return sys.argv\n\n\ndef gone():\n    return os.getcwd()\n",
        )]);
        let gone = find(&ws, "a.py", "gone");
        let mut tx = Transaction::single(Operation::DeleteSymbol { symbol: gone });
        validate(&ws, &mut tx).unwrap();
        assert_eq!(
            tx.planned_text(Path::new("a.py")),
            Some("import sys\n\n\ndef keep():\n    return sys.argv\n")
        );
    }

    #[test]
    fn test_insert_import_collision_and_noop() {
        let (_dir, ws) = workspace(&[("a.py", "import os\n\n\ndef helper():\n    pass\n")]);
        let same = Operation::InsertImport {
            file: "a.py".into(),
            request: ImportRequest::module("os"),
        };
        let mut tx = Transaction::single(same);
        validate(&ws, &mut tx).unwrap();
        assert!(tx.is_noop());

        let clash = Operation::InsertImport {
            file: "a.py".into(),
            request: ImportRequest::named("util", "helper"),
        };
        assert!(matches!(rejection(&ws, clash), RejectReason::NameCollision { .. }));
    }

    #[test]
    fn test_remove_import_in_use() {
        let (_dir, ws) = workspace(&[("a.py", "import os\nimport sys\n\nos.getcwd()\n")]);
        let used = Operation::RemoveImport {
            file: "a.py".into(),
            local_name: "os".into(),
        };
        assert!(matches!(rejection(&ws, used), RejectReason::ImportInUse { .. }));

        let mut tx = Transaction::single(Operation::RemoveImport {
            file: "a.py".into(),
            local_name: "sys".into(),
        });
        validate(&ws, &mut tx).unwrap();
        assert_eq!(tx.planned_text(Path::new("a.py")), Some("import os\n\nos.getcwd()\n"));
    }

    #[test]
    fn test_rewrite_span_checks_expected_text() {
        let (_dir, ws) = workspace(&[("a.py", "x = 1\n")]);
        let wrong = Operation::RewriteSpan {
            file: "a.py".into(),
            start: 4,
            end: 5,
            text: "2".into(),
            expected: Some("9".into()),
        };
        assert!(matches!(rejection(&ws, wrong), RejectReason::UnexpectedText { .. }));

        let broken = Operation::RewriteSpan {
            file: "a.py".into(),
            start: 4,
            end: 5,
            text: "(".into(),
            expected: Some("1".into()),
        };
        assert!(matches!(rejection(&ws, broken), RejectReason::SyntaxBroken { .. }));
    }

    #[test]
    fn test_operations_see_earlier_edits() {
        let (_dir, ws) = workspace(&[("a.py", "import os\n\nx = 1\n")]);
        let mut tx = Transaction::new(vec![
            Operation::InsertImport {
                file: "a.py".into(),
                request: ImportRequest::module("sys"),
            },
            Operation::RemoveImport {
                file: "a.py".into(),
                local_name: "sys".into(),
            },
        ]);
        validate(&ws, &mut tx).unwrap();
        assert!(tx.is_noop());
        assert_eq!(ws.text(Path::new("a.py")).unwrap(), "import os\n\nx = 1\n");
    }
}
