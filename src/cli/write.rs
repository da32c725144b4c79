//! Write commands: each one is a single transaction.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::print_json;
use super::read::find;
use crate::codebase::Codebase;
use crate::transaction::{Operation, Transaction, TransactionReport};

pub fn move_symbol(codebase: &Codebase, file: &Path, symbol: &str, target: PathBuf, dry_run: bool, json: bool) -> Result<()> {
    let handle = find(codebase, file, symbol)?;
    let op = Operation::MoveSymbol {
        symbol: handle.id(),
        target,
    };
    run(codebase, Transaction::single(op), dry_run, json)
}

pub fn rename(codebase: &Codebase, file: &Path, symbol: &str, new_name: String, dry_run: bool, json: bool) -> Result<()> {
    let handle = find(codebase, file, symbol)?;
    let op = Operation::RenameSymbol {
        symbol: handle.id(),
        new_name,
    };
    run(codebase, Transaction::single(op), dry_run, json)
}

pub fn delete(codebase: &Codebase, file: &Path, symbol: &str, dry_run: bool, json: bool) -> Result<()> {
    let handle = find(codebase, file, symbol)?;
    let op = Operation::DeleteSymbol { symbol: handle.id() };
    run(codebase, Transaction::single(op), dry_run, json)
}

/// Execute, or with `dry_run` validate and roll back.
pub fn run(codebase: &Codebase, mut tx: Transaction, dry_run: bool, json: bool) -> Result<()> {
    let report = if dry_run {
        codebase.validate(&mut tx)?;
        let mut report = codebase.rollback(&mut tx)?;
        // Report what would have been written.
        report.status = crate::transaction::TransactionStatus::Validated;
        report
    } else {
        codebase.execute(&mut tx)?
    };
    if json {
        return print_json(&report);
    }
    print_report(&report, dry_run);
    Ok(())
}

fn print_report(report: &TransactionReport, dry_run: bool) {
    if report.noop {
        println!("Nothing to change");
        return;
    }
    let verb = if dry_run { "would write" } else { "wrote" };
    for file in &report.files {
        let marker = if file.created { "+" } else { "~" };
        println!("{} {} ({} bytes)", marker, file.path.display(), file.bytes);
    }
    println!(
        "✓ {} {} {} file(s), {} re-resolved",
        report.operations.join(", "),
        verb,
        report.files.len(),
        report.update.resolved
    );
}
