//
//  apply.rs
//  Codeweave
//

use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use super::plan::Plan;
use super::{ApplyFailure, RejectReason, Transaction, TransactionError, TransactionResult, TransactionStatus};
use crate::cache::hash_content;
use crate::workspace::Workspace;
use crate::write::{write_atomic, Backup};

/// Write a validated transaction to disk and adopt its graph.
///
/// Files are re-checked against the hashes the workspace knows before any
/// write. If a write fails, every file written so far is restored from its
/// backup.
pub fn apply(ws: &mut Workspace, tx: &mut Transaction) -> TransactionResult {
    tx.require(TransactionStatus::Validated)?;
    let started = Instant::now();

    let Some(plan) = tx.plan.as_ref() else {
        return Err(TransactionError::InvalidState {
            expected: TransactionStatus::Validated,
            actual: tx.status,
        });
    };
    if let Err(reason) = check_fresh(ws, plan) {
        info!(tx = %tx.id, reason = %reason, "Transaction rejected at apply");
        tx.status = TransactionStatus::Rejected;
        tx.plan = None;
        return Err(reason.into());
    }

    if let Err(failure) = write_files(ws, plan) {
        warn!(
            tx = %tx.id,
            error = %failure.error,
            reverted = failure.reverted.len(),
            inconsistent = failure.possibly_inconsistent.len(),
            "Transaction apply failed"
        );
        tx.status = if failure.possibly_inconsistent.is_empty() {
            TransactionStatus::RolledBack
        } else {
            TransactionStatus::Failed
        };
        tx.plan = None;
        return Err(TransactionError::ApplyFailed { failure });
    }

    let update = plan.update;
    let files = plan.files.len();
    if let Some(scratch) = tx.plan.as_mut().and_then(|p| p.scratch.take()) {
        *ws = scratch;
    }
    tx.status = TransactionStatus::Applied;
    if files > 0 && ws.config().transaction.save_cache {
        if let Err(e) = ws.save_cache() {
            warn!(error = %e, "Failed to save cache after apply");
        }
    }
    info!(
        tx = %tx.id,
        files,
        generation = ws.generation(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Transaction applied"
    );
    Ok(tx.report(update))
}

/// Discard a validated plan without touching disk.
pub fn rollback(tx: &mut Transaction) -> TransactionResult {
    tx.require(TransactionStatus::Validated)?;
    let update = tx.plan.as_ref().map(|p| p.update).unwrap_or_default();
    let report = tx.report(update);
    tx.plan = None;
    tx.status = TransactionStatus::RolledBack;
    info!(tx = %tx.id, "Transaction rolled back");
    Ok(super::TransactionReport {
        status: tx.status,
        ..report
    })
}

/// The workspace and the disk still look the way they did at validation.
fn check_fresh(ws: &Workspace, plan: &Plan) -> Result<(), RejectReason> {
    if ws.generation() != plan.base_generation {
        return Err(RejectReason::Outdated {
            validated: plan.base_generation,
            current: ws.generation(),
        });
    }
    for file in &plan.files {
        let disk = ws.root().join(&file.path);
        let stale = match (&file.original, fs::read(&disk)) {
            (None, Ok(_)) => true,
            (None, Err(_)) => false,
            (Some(_), Ok(bytes)) => ws.known_hash(&file.path) != Some(hash_content(&bytes).as_str()),
            (Some(_), Err(_)) => true,
        };
        if stale {
            return Err(RejectReason::Stale {
                file: file.path.clone(),
            });
        }
    }
    Ok(())
}

fn write_files(ws: &Workspace, plan: &Plan) -> Result<(), ApplyFailure> {
    let create_dirs = ws.config().transaction.create_dirs;
    let mut done: Vec<(PathBuf, Backup)> = Vec::new();
    for file in &plan.files {
        let disk = ws.root().join(&file.path);
        let backup = match Backup::capture(&disk) {
            Ok(backup) => backup,
            Err(e) => return Err(revert(done, None, e.to_string())),
        };
        match write_atomic(&disk, &file.text, create_dirs) {
            Ok(_) => done.push((file.path.clone(), backup)),
            Err(e) => return Err(revert(done, Some((file.path.clone(), backup)), e.to_string())),
        }
    }
    Ok(())
}

/// Restore written files newest first. The file whose write failed is
/// restored too, since a failed rename may still have replaced it.
fn revert(done: Vec<(PathBuf, Backup)>, failed: Option<(PathBuf, Backup)>, error: String) -> ApplyFailure {
    let written: Vec<PathBuf> = done.iter().map(|(p, _)| p.clone()).collect();
    let mut reverted = Vec::new();
    let mut possibly_inconsistent = Vec::new();
    for (path, backup) in done.into_iter().rev().chain(failed) {
        match backup.restore() {
            Ok(()) => reverted.push(path),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to restore backup");
                possibly_inconsistent.push(path);
            }
        }
    }
    reverted.retain(|p| written.contains(p));
    ApplyFailure {
        error,
        written,
        reverted,
        possibly_inconsistent,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CodeweaveConfig;
    use crate::transaction::{
        apply, rollback, validate, Operation, RejectReason, Transaction, TransactionError, TransactionStatus,
    };
    use crate::workspace::Workspace;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Workspace) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("util.py"), "def helper():\n    pass\n").unwrap();
        fs::write(dir.path().join("main.py"), "from util import helper\n\nhelper()\n").unwrap();
        let mut config = CodeweaveConfig::default();
        config.cache.enabled = false;
        let ws = Workspace::load(dir.path(), config).unwrap();
        (dir, ws)
    }

    fn rename_tx(ws: &Workspace) -> Transaction {
        let symbol = ws.graph().find_qualified(Path::new("util.py"), "helper").unwrap();
        Transaction::single(Operation::RenameSymbol {
            symbol,
            new_name: "assist".into(),
        })
    }

    #[test]
    fn test_apply_writes_and_adopts_graph() {
        let (dir, mut ws) = setup();
        let mut tx = rename_tx(&ws);
        validate(&ws, &mut tx).unwrap();
        let report = apply(&mut ws, &mut tx).unwrap();
        assert_eq!(report.status, TransactionStatus::Applied);
        assert_eq!(report.files.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("main.py")).unwrap(),
            "from util import assist\n\nassist()\n"
        );
        let id = ws.graph().find_qualified(Path::new("util.py"), "assist").unwrap();
        assert_eq!(ws.graph().usages(id).len(), 1);
    }

    #[test]
    fn test_apply_rejects_stale_file() {
        let (dir, mut ws) = setup();
        let mut tx = rename_tx(&ws);
        validate(&ws, &mut tx).unwrap();
        fs::write(dir.path().join("main.py"), "from util import helper\n\nhelper()\nhelper()\n").unwrap();
        let err = apply(&mut ws, &mut tx).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::Rejected {
                reason: RejectReason::Stale { .. }
            }
        ));
        assert_eq!(tx.status(), TransactionStatus::Rejected);
        assert_eq!(
            fs::read_to_string(dir.path().join("util.py")).unwrap(),
            "def helper():\n    pass\n"
        );
    }

    #[test]
    fn test_apply_rejects_outdated_plan() {
        let (_dir, mut ws) = setup();
        let mut first = rename_tx(&ws);
        let mut second = rename_tx(&ws);
        validate(&ws, &mut first).unwrap();
        validate(&ws, &mut second).unwrap();
        apply(&mut ws, &mut first).unwrap();
        let err = apply(&mut ws, &mut second).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::Rejected {
                reason: RejectReason::Outdated { .. }
            }
        ));
    }

    #[test]
    fn test_failed_write_reverts_earlier_files() {
        let dir = tempdir().unwrap();
        let a = "def helper():\n    pass\n\n\ndef other():\n    pass\n";
        let b = "from a import helper\n\nhelper()\n";
        fs::write(dir.path().join("a.py"), a).unwrap();
        fs::write(dir.path().join("b.py"), b).unwrap();
        // A plain file where the target's directory has to go.
        fs::write(dir.path().join("zz"), "").unwrap();
        let mut config = CodeweaveConfig::default();
        config.cache.enabled = false;
        let mut ws = Workspace::load(dir.path(), config).unwrap();

        let symbol = ws.graph().find_qualified(Path::new("a.py"), "helper").unwrap();
        let mut tx = Transaction::single(Operation::MoveSymbol {
            symbol,
            target: "zz/x.py".into(),
        });
        validate(&ws, &mut tx).unwrap();
        let generation = ws.generation();

        let failure = match apply(&mut ws, &mut tx) {
            Err(TransactionError::ApplyFailed { failure }) => failure,
            other => panic!("expected a failed apply, got {other:?}"),
        };
        assert_eq!(failure.written, vec![PathBuf::from("a.py"), PathBuf::from("b.py")]);
        assert_eq!(failure.reverted, vec![PathBuf::from("b.py"), PathBuf::from("a.py")]);
        assert!(failure.possibly_inconsistent.is_empty());
        assert_eq!(tx.status(), TransactionStatus::RolledBack);

        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), a);
        assert_eq!(fs::read_to_string(dir.path().join("b.py")).unwrap(), b);
        assert_eq!(ws.generation(), generation);
        assert!(ws.graph().find_qualified(Path::new("a.py"), "helper").is_some());
    }

    #[test]
    fn test_rollback_only_from_validated() {
        let (dir, ws) = setup();
        let mut tx = rename_tx(&ws);
        assert!(matches!(rollback(&mut tx), Err(TransactionError::InvalidState { .. })));
        validate(&ws, &mut tx).unwrap();
        let report = rollback(&mut tx).unwrap();
        assert_eq!(report.status, TransactionStatus::RolledBack);
        assert!(tx.touched().is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("main.py")).unwrap(),
            "from util import helper\n\nhelper()\n"
        );
    }
}
