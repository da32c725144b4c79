//! Plan execution: several operations from JSON, applied as one transaction.
//!
//! ```json
//! {
//!   "operations": [
//!     { "op": "move", "file": "util.py", "symbol": "helper", "target": "lib/util2.py" },
//!     { "op": "rename", "file": "util.py", "symbol": "other", "to": "assist" }
//!   ]
//! }
//! ```
//!
//! Symbols are looked up before anything runs; later operations still see
//! the edits of earlier ones, because ids survive moves and renames.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::read::find;
use super::write::run;
use crate::codebase::Codebase;
use crate::parser::ImportRequest;
use crate::transaction::{Operation, Transaction};

#[derive(Debug, Deserialize)]
pub struct PlanFile {
    pub operations: Vec<PlanOperation>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOperation {
    Move {
        file: PathBuf,
        symbol: String,
        target: PathBuf,
    },
    Rename {
        file: PathBuf,
        symbol: String,
        to: String,
    },
    Delete {
        file: PathBuf,
        symbol: String,
    },
    InsertImport {
        file: PathBuf,
        #[serde(flatten)]
        request: ImportRequest,
    },
    RemoveImport {
        file: PathBuf,
        local_name: String,
    },
    RewriteSpan {
        file: PathBuf,
        start: usize,
        end: usize,
        text: String,
        #[serde(default)]
        expected: Option<String>,
    },
}

/// Read a plan and turn its symbol references into operations.
pub fn load(codebase: &Codebase, path: &Path) -> Result<Vec<Operation>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read plan file {}: {}", path.display(), e))?;
    let plan: PlanFile = serde_json::from_str(&content).map_err(|e| anyhow!("Invalid plan JSON: {}", e))?;
    plan.operations
        .into_iter()
        .map(|op| resolve(codebase, op))
        .collect()
}

fn resolve(codebase: &Codebase, op: PlanOperation) -> Result<Operation> {
    Ok(match op {
        PlanOperation::Move { file, symbol, target } => Operation::MoveSymbol {
            symbol: find(codebase, &file, &symbol)?.id(),
            target,
        },
        PlanOperation::Rename { file, symbol, to } => Operation::RenameSymbol {
            symbol: find(codebase, &file, &symbol)?.id(),
            new_name: to,
        },
        PlanOperation::Delete { file, symbol } => Operation::DeleteSymbol {
            symbol: find(codebase, &file, &symbol)?.id(),
        },
        PlanOperation::InsertImport { file, request } => Operation::InsertImport { file, request },
        PlanOperation::RemoveImport { file, local_name } => Operation::RemoveImport { file, local_name },
        PlanOperation::RewriteSpan {
            file,
            start,
            end,
            text,
            expected,
        } => Operation::RewriteSpan {
            file,
            start,
            end,
            text,
            expected,
        },
    })
}

/// Execute a plan file.
pub fn execute(codebase: &Codebase, file: &Path, dry_run: bool, json: bool) -> Result<()> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        codebase.root().join(file)
    };
    let operations = load(codebase, &path)?;
    if !json {
        println!("Executing plan: {} operations", operations.len());
    }
    run(codebase, Transaction::new(operations), dry_run, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodeweaveConfig;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_plan_resolves_symbols() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("util.py"), "def helper():\n    pass\n").unwrap();
        fs::write(
            dir.path().join("plan.json"),
            r#"{"operations": [
                {"op": "rename", "file": "util.py", "symbol": "helper", "to": "assist"},
                {"op": "insert_import", "file": "util.py", "specifier": "os", "form": "module", "name": null, "alias": null}
            ]}"#,
        )
        .unwrap();
        let mut config = CodeweaveConfig::default();
        config.cache.enabled = false;
        let codebase = Codebase::load_with_config(dir.path(), config).unwrap();

        let ops = load(&codebase, &dir.path().join("plan.json")).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], Operation::RenameSymbol { new_name, .. } if new_name == "assist"));
        assert!(matches!(&ops[1], Operation::InsertImport { request, .. } if request.specifier == "os"));

        fs::write(
            dir.path().join("bad.json"),
            r#"{"operations": [{"op": "delete", "file": "util.py", "symbol": "missing"}]}"#,
        )
        .unwrap();
        assert!(load(&codebase, &dir.path().join("bad.json")).is_err());
    }
}
