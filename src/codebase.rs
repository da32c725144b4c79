//
//  codebase.rs
//  Codeweave
//

//! The shared entry point: a workspace behind a reader/writer lock.
//!
//! Queries take the read guard. Transactions hold the write guard from
//! validation through apply, so no query ever sees a half-applied change.
//! Change notifications go into a separate dirty set and are synced before
//! the next query or mutation.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::config::CodeweaveConfig;
use crate::error::{Error, Result};
use crate::graph::{GraphStats, ResolutionWarning, SymbolId, SymbolInfo, UnusedImport, Usage};
use crate::query::{
    self, complexity_report, dead_code, import_cycles, ComplexityReport, DeadCodeReport,
    FileDiagnostics, ImportCycle, Liveness,
};
use crate::transaction::{self, Operation, Transaction, TransactionError, TransactionResult};
use crate::workspace::{UpdateSummary, Workspace};

/// Counts over the whole codebase.
#[derive(Debug, Clone, Serialize)]
pub struct CodebaseStats {
    pub generation: u64,
    #[serde(flatten)]
    pub graph: GraphStats,
    pub unused_imports: usize,
}

pub struct Codebase {
    root: PathBuf,
    workspace: RwLock<Workspace>,
    dirty: Mutex<HashSet<PathBuf>>,
}

impl Codebase {
    /// Load with `<root>/.codeweave/config.toml`, or defaults.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        Self::load_with_config(root, CodeweaveConfig::load_for_root(root))
    }

    pub fn load_with_config(root: impl AsRef<Path>, config: CodeweaveConfig) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .ok()
            .filter(|r| r.is_dir())
            .ok_or_else(|| Error::RootNotFound(root.to_path_buf()))?;
        let workspace = Workspace::load(&root, config)?;
        Ok(Self {
            root,
            workspace: RwLock::new(workspace),
            dirty: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─── Locking ────────────────────────────────────────────────

    fn write_guard(&self) -> RwLockWriteGuard<'_, Workspace> {
        let mut ws = self.workspace.write().unwrap_or_else(PoisonError::into_inner);
        self.sync_dirty(&mut ws);
        ws
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Workspace> {
        if self.has_dirty() {
            drop(self.write_guard());
        }
        self.workspace.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_dirty(&self) -> bool {
        !self.dirty.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn sync_dirty(&self, ws: &mut Workspace) {
        let paths: Vec<PathBuf> = {
            let mut dirty = self.dirty.lock().unwrap_or_else(PoisonError::into_inner);
            dirty.drain().collect()
        };
        if paths.is_empty() {
            return;
        }
        let summary = ws.sync(&paths);
        debug!(dirty = paths.len(), changed = summary.changed, "Synced dirty files");
    }

    /// Run `f` against the current workspace.
    pub fn with_workspace<T>(&self, f: impl FnOnce(&Workspace) -> T) -> T {
        let ws = self.read_guard();
        f(&ws)
    }

    // ─── Symbols ────────────────────────────────────────────────

    /// The symbol `qualified_name` declared in `file`.
    pub fn symbol(&self, file: impl AsRef<Path>, qualified_name: &str) -> Option<SymbolHandle<'_>> {
        let ws = self.read_guard();
        let file = ws.relative(file.as_ref());
        let id = ws.graph().find_qualified(&file, qualified_name)?;
        Some(SymbolHandle { codebase: self, id })
    }

    /// Every non-import symbol called `name`.
    pub fn find_symbols(&self, name: &str) -> Vec<SymbolHandle<'_>> {
        let ws = self.read_guard();
        ws.graph()
            .find_by_name(name)
            .into_iter()
            .filter(|&id| ws.graph().symbol(id).is_some_and(|s| s.kind.as_import().is_none()))
            .map(|id| SymbolHandle { codebase: self, id })
            .collect()
    }

    pub fn handle(&self, id: SymbolId) -> SymbolHandle<'_> {
        SymbolHandle { codebase: self, id }
    }

    // ─── Whole-codebase queries ─────────────────────────────────

    pub fn detect_import_cycles(&self) -> Vec<ImportCycle> {
        let ws = self.read_guard();
        import_cycles(ws.graph(), ws.files())
    }

    pub fn dead_code_report(&self) -> DeadCodeReport {
        let ws = self.read_guard();
        dead_code(ws.graph(), ws.files(), &ws.config().analysis)
    }

    pub fn complexity_report(&self) -> ComplexityReport {
        complexity_report(self.read_guard().graph())
    }

    pub fn unused_imports(&self) -> Vec<UnusedImport> {
        self.read_guard().graph().unused_imports()
    }

    pub fn resolution_warnings(&self) -> Vec<ResolutionWarning> {
        self.read_guard().graph().all_warnings()
    }

    pub fn parse_diagnostics(&self) -> Vec<FileDiagnostics> {
        query::parse_diagnostics(self.read_guard().files())
    }

    pub fn stats(&self) -> CodebaseStats {
        let ws = self.read_guard();
        CodebaseStats {
            generation: ws.generation(),
            graph: ws.graph().stats(),
            unused_imports: ws.graph().unused_imports().len(),
        }
    }

    // ─── Transactions ───────────────────────────────────────────

    /// Validate and apply under one write guard.
    pub fn execute(&self, tx: &mut Transaction) -> TransactionResult {
        let mut ws = self.write_guard();
        transaction::validate(&ws, tx)?;
        let result = transaction::apply(&mut ws, tx);
        drop(ws);
        self.after_apply(result)
    }

    pub fn validate(&self, tx: &mut Transaction) -> TransactionResult {
        let ws = self.write_guard();
        transaction::validate(&ws, tx)
    }

    /// Apply a validated transaction. Rejected as outdated when the
    /// codebase changed since validation.
    pub fn apply(&self, tx: &mut Transaction) -> TransactionResult {
        let result = {
            let mut ws = self.write_guard();
            transaction::apply(&mut ws, tx)
        };
        self.after_apply(result)
    }

    pub fn rollback(&self, tx: &mut Transaction) -> TransactionResult {
        transaction::rollback(tx)
    }

    pub fn cancel(&self, tx: &mut Transaction) -> std::result::Result<(), TransactionError> {
        tx.cancel()
    }

    fn after_apply(&self, result: TransactionResult) -> TransactionResult {
        if let Err(TransactionError::ApplyFailed { failure }) = &result {
            self.notify_changed(failure.possibly_inconsistent.iter().cloned());
        }
        result
    }

    // ─── Cache ──────────────────────────────────────────────────

    /// Mark files as changed on disk. They are re-read before the next
    /// query or mutation.
    pub fn notify_changed(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let mut dirty = self.dirty.lock().unwrap_or_else(PoisonError::into_inner);
        dirty.extend(paths);
    }

    /// Rescan the tree and re-process files whose content changed.
    pub fn refresh(&self) -> Result<UpdateSummary> {
        let mut ws = self.write_guard();
        let summary = ws.refresh()?;
        info!(changed = summary.changed, removed = summary.removed, "Refreshed");
        Ok(summary)
    }

    /// Re-parse and re-resolve every file.
    pub fn invalidate_all(&self) -> Result<UpdateSummary> {
        self.write_guard().rebuild()
    }

    pub fn save_cache(&self) -> Result<()> {
        self.read_guard().save_cache()
    }
}

/// A symbol of a [`Codebase`]. Every call reads the current graph, so a
/// handle stays valid across transactions that keep the symbol's id.
#[derive(Clone, Copy)]
pub struct SymbolHandle<'a> {
    codebase: &'a Codebase,
    id: SymbolId,
}

impl std::fmt::Debug for SymbolHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SymbolHandle").field(&self.id).finish()
    }
}

impl SymbolHandle<'_> {
    pub fn id(&self) -> SymbolId {
        self.id
    }

    /// `None` once the symbol no longer exists.
    pub fn info(&self) -> Option<SymbolInfo> {
        self.codebase
            .read_guard()
            .graph()
            .symbol(self.id)
            .map(SymbolInfo::from)
    }

    pub fn usages(&self) -> Vec<Usage> {
        self.codebase.read_guard().graph().usages(self.id)
    }

    pub fn call_sites(&self) -> Vec<Usage> {
        self.codebase.read_guard().graph().call_sites(self.id)
    }

    pub fn is_dead(&self) -> bool {
        let ws = self.codebase.read_guard();
        Liveness::compute(ws.graph(), ws.files(), &ws.config().analysis).is_dead(self.id)
    }

    pub fn move_to(&self, target: impl AsRef<Path>) -> TransactionResult {
        let target = target.as_ref().to_path_buf();
        self.run(Operation::MoveSymbol { symbol: self.id, target })
    }

    pub fn rename(&self, new_name: &str) -> TransactionResult {
        self.run(Operation::RenameSymbol {
            symbol: self.id,
            new_name: new_name.to_string(),
        })
    }

    pub fn delete(&self) -> TransactionResult {
        self.run(Operation::DeleteSymbol { symbol: self.id })
    }

    fn run(&self, operation: Operation) -> TransactionResult {
        self.codebase.execute(&mut Transaction::single(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{RejectReason, TransactionStatus};
    use std::fs;
    use tempfile::tempdir;

    fn codebase(files: &[(&str, &str)]) -> (tempfile::TempDir, Codebase) {
        let dir = tempdir().unwrap();
        for (rel, text) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let mut config = CodeweaveConfig::default();
        config.cache.enabled = false;
        let codebase = Codebase::load_with_config(dir.path(), config).unwrap();
        (dir, codebase)
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(Codebase::load(&missing), Err(Error::RootNotFound(_))));
    }

    #[test]
    fn test_handle_queries_and_rename() {
        let (dir, cb) = codebase(&[
            ("util.py", "def helper():\n    pass\n\n\ndef unused():\n    pass\n"),
            ("main.py", "from util import helper\n\nhelper()\n"),
        ]);
        let helper = cb.symbol("util.py", "helper").unwrap();
        assert_eq!(helper.usages().len(), 1);
        assert_eq!(helper.call_sites().len(), 1);
        assert!(!helper.is_dead());
        assert!(cb.symbol("util.py", "unused").unwrap().is_dead());

        let report = helper.rename("assist").unwrap();
        assert_eq!(report.status, TransactionStatus::Applied);
        assert_eq!(helper.info().unwrap().name, "assist");
        assert_eq!(
            fs::read_to_string(dir.path().join("main.py")).unwrap(),
            "from util import assist\n\nassist()\n"
        );
    }

    #[test]
    fn test_notify_changed_syncs_before_query() {
        let (dir, cb) = codebase(&[("util.py", "def helper():\n    pass\n")]);
        let helper = cb.symbol("util.py", "helper").unwrap();
        assert!(helper.usages().is_empty());

        fs::write(dir.path().join("main.py"), "from util import helper\n\nhelper()\n").unwrap();
        cb.notify_changed([PathBuf::from("main.py")]);
        assert_eq!(helper.usages().len(), 1);
        assert_eq!(cb.stats().generation, 1);
    }

    #[test]
    fn test_validate_then_apply_outdated() {
        let (dir, cb) = codebase(&[
            ("util.py", "def helper():\n    pass\n"),
            ("main.py", "from util import helper\n\nhelper()\n"),
        ]);
        let id = cb.symbol("util.py", "helper").unwrap().id();
        let mut tx = Transaction::single(Operation::DeleteSymbol { symbol: id });
        assert!(matches!(
            cb.validate(&mut tx),
            Err(TransactionError::Rejected {
                reason: RejectReason::StillReferenced { .. }
            })
        ));

        let mut tx = Transaction::single(Operation::RenameSymbol {
            symbol: id,
            new_name: "assist".into(),
        });
        cb.validate(&mut tx).unwrap();
        fs::write(dir.path().join("other.py"), "x = 1\n").unwrap();
        cb.refresh().unwrap();
        assert!(matches!(
            cb.apply(&mut tx),
            Err(TransactionError::Rejected {
                reason: RejectReason::Outdated { .. }
            })
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("util.py")).unwrap(),
            "def helper():\n    pass\n"
        );
    }

    #[test]
    fn test_cancel_pending_only() {
        let (dir, cb) = codebase(&[
            ("util.py", "def helper():\n    pass\n"),
            ("main.py", "from util import helper\n\nhelper()\n"),
        ]);
        let id = cb.symbol("util.py", "helper").unwrap().id();
        let rename = || {
            Transaction::single(Operation::RenameSymbol {
                symbol: id,
                new_name: "assist".into(),
            })
        };

        let mut tx = rename();
        cb.cancel(&mut tx).unwrap();
        assert_eq!(tx.status(), TransactionStatus::Cancelled);
        assert!(matches!(
            cb.validate(&mut tx),
            Err(TransactionError::InvalidState {
                expected: TransactionStatus::Pending,
                actual: TransactionStatus::Cancelled,
            })
        ));
        assert_eq!(cb.stats().generation, 0);
        assert_eq!(
            fs::read_to_string(dir.path().join("main.py")).unwrap(),
            "from util import helper\n\nhelper()\n"
        );

        let mut tx = rename();
        cb.validate(&mut tx).unwrap();
        assert!(matches!(cb.cancel(&mut tx), Err(TransactionError::InvalidState { .. })));
        assert_eq!(tx.status(), TransactionStatus::Validated);
    }
}
