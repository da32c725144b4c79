//
//  mod.rs
//  Codeweave
//

//! Transactions: validated, all-or-nothing sets of source edits.
//!
//! A transaction is planned against a scratch copy of the workspace. Each
//! operation's edits are applied to the scratch texts, the touched files are
//! re-extracted and re-resolved, and the next operation plans against the
//! result. Nothing reaches disk until [`apply`] writes the touched files.
//!
//! ```text
//! Pending ──validate──▶ Validated ──apply──▶ Applied
//!    │                     └──rollback──▶ RolledBack
//!    ├──(rejected)──▶ Rejected
//!    └──cancel──▶ Cancelled
//! ```

mod apply;
mod edit;
mod imports;
mod plan;
mod relocate;
mod rename;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::graph::SymbolId;
use crate::parser::{ImportRequest, SupportedLanguage};
use crate::workspace::UpdateSummary;

pub use apply::{apply, rollback};
pub use edit::TextEdit;
pub use plan::validate;
pub(crate) use plan::Plan;

/// One requested change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Operation {
    /// Move a top-level declaration into another file.
    MoveSymbol { symbol: SymbolId, target: PathBuf },
    RenameSymbol { symbol: SymbolId, new_name: String },
    DeleteSymbol { symbol: SymbolId },
    InsertImport { file: PathBuf, request: ImportRequest },
    RemoveImport { file: PathBuf, local_name: String },
    /// Replace the byte range `[start, end)` of a file.
    RewriteSpan {
        file: PathBuf,
        start: usize,
        end: usize,
        text: String,
        /// Text the range must currently hold.
        expected: Option<String>,
    },
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::MoveSymbol { .. } => "move_symbol",
            Operation::RenameSymbol { .. } => "rename_symbol",
            Operation::DeleteSymbol { .. } => "delete_symbol",
            Operation::InsertImport { .. } => "insert_import",
            Operation::RemoveImport { .. } => "remove_import",
            Operation::RewriteSpan { .. } => "rewrite_span",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Validated,
    Applied,
    RolledBack,
    Rejected,
    Cancelled,
    /// An I/O error interrupted the write; see [`ApplyFailure`].
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Validated => "validated",
            TransactionStatus::Applied => "applied",
            TransactionStatus::RolledBack => "rolled back",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why validation refused a transaction. Nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RejectReason {
    #[error("symbol {symbol} not found")]
    SymbolNotFound { symbol: SymbolId },

    #[error("file not found: {}", file.display())]
    FileNotFound { file: PathBuf },

    #[error("{symbol} cannot be moved: {detail}")]
    NotMovable { symbol: SymbolId, detail: String },

    #[error("cannot move {from} code into a {to} file")]
    LanguageMismatch {
        from: SupportedLanguage,
        to: SupportedLanguage,
    },

    #[error("{} is not an indexed source file", file.display())]
    UnsupportedTarget { file: PathBuf },

    #[error("`{name}` already exists in {}", file.display())]
    NameCollision { file: PathBuf, name: String },

    #[error("ambiguous reference to `{name}` at {}:{line}", file.display())]
    AmbiguousReference { file: PathBuf, line: usize, name: String },

    #[error("{} has no import path to {}", from.display(), to.display())]
    Unimportable { from: PathBuf, to: PathBuf },

    #[error("cannot rewrite use at {}:{line}: {detail}", file.display())]
    UnsupportedUsage { file: PathBuf, line: usize, detail: String },

    #[error("`{name}` is not a valid identifier")]
    InvalidIdentifier { name: String },

    #[error("`{name}` would be captured by a local binding at {}:{line}", file.display())]
    LocalCapture { file: PathBuf, line: usize, name: String },

    #[error("`{name}` is accessed on receivers of unknown type")]
    UnknownReceiver { name: String },

    #[error("{symbol} is still used in {usages} place(s)")]
    StillReferenced { symbol: SymbolId, usages: usize },

    #[error("{symbol} is listed as an export of {}", file.display())]
    StillExported { symbol: SymbolId, file: PathBuf },

    #[error("{symbol} is still imported by {}", file.display())]
    StillImported { symbol: SymbolId, file: PathBuf },

    #[error("no import binds `{name}` in {}", file.display())]
    ImportNotFound { file: PathBuf, name: String },

    #[error("import `{name}` is still used in {}", file.display())]
    ImportInUse { file: PathBuf, name: String },

    #[error("invalid span {start}..{end} in {}", file.display())]
    InvalidSpan { file: PathBuf, start: usize, end: usize },

    #[error("expected {expected:?} in {}, found {found:?}", file.display())]
    UnexpectedText {
        file: PathBuf,
        expected: String,
        found: String,
    },

    #[error("overlapping edits in {}", file.display())]
    OverlappingEdits { file: PathBuf },

    #[error("edit leaves {} with {errors} syntax error(s)", file.display())]
    SyntaxBroken { file: PathBuf, errors: usize },

    #[error("graph invariant violated: {detail}")]
    InvariantViolated { detail: String },

    #[error("{symbol} had {before} usage(s) before the edit and {after} after")]
    UsageCountChanged {
        symbol: SymbolId,
        before: usize,
        after: usize,
    },

    #[error("{symbol} did not end up as `{expected}` in {}", file.display())]
    IdentityLost {
        symbol: SymbolId,
        file: PathBuf,
        expected: String,
    },

    #[error("{} changed since validation", file.display())]
    Stale { file: PathBuf },

    #[error("workspace moved from generation {validated} to {current} since validation")]
    Outdated { validated: u64, current: u64 },

    #[error("unsupported: {detail}")]
    Unsupported { detail: String },

    #[error("could not process {}: {detail}", file.display())]
    Unreadable { file: PathBuf, detail: String },
}

/// An I/O error interrupted apply. Already-written files were reverted from
/// their backups where possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyFailure {
    pub error: String,
    pub written: Vec<PathBuf>,
    pub reverted: Vec<PathBuf>,
    /// Files whose on-disk content may not match either version.
    pub possibly_inconsistent: Vec<PathBuf>,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} written, {} reverted, {} possibly inconsistent)",
            self.error,
            self.written.len(),
            self.reverted.len(),
            self.possibly_inconsistent.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "error")]
pub enum TransactionError {
    #[error("transaction rejected: {reason}")]
    Rejected { reason: RejectReason },

    #[error("transaction failed while writing: {failure}")]
    ApplyFailed { failure: ApplyFailure },

    #[error("transaction is {actual}, expected {expected}")]
    InvalidState {
        expected: TransactionStatus,
        actual: TransactionStatus,
    },
}

impl From<RejectReason> for TransactionError {
    fn from(reason: RejectReason) -> Self {
        TransactionError::Rejected { reason }
    }
}

/// A file an applied transaction wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TouchedFile {
    pub path: PathBuf,
    pub created: bool,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReport {
    pub id: Uuid,
    pub status: TransactionStatus,
    pub operations: Vec<&'static str>,
    pub files: Vec<TouchedFile>,
    /// Validation found nothing to change.
    pub noop: bool,
    pub update: UpdateSummary,
}

pub type TransactionResult = Result<TransactionReport, TransactionError>;

#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    operations: Vec<Operation>,
    status: TransactionStatus,
    plan: Option<Plan>,
}

impl Transaction {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operations,
            status: TransactionStatus::Pending,
            plan: None,
        }
    }

    pub fn single(operation: Operation) -> Self {
        Self::new(vec![operation])
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Files the validated plan rewrites, sorted.
    pub fn touched(&self) -> Vec<PathBuf> {
        self.plan
            .as_ref()
            .map(|p| p.files.iter().map(|f| f.path.clone()).collect())
            .unwrap_or_default()
    }

    /// Final text of a touched file, once validated.
    pub fn planned_text(&self, path: &std::path::Path) -> Option<&str> {
        self.plan.as_ref()?.files.iter().find(|f| f.path == path).map(|f| f.text.as_str())
    }

    pub fn is_noop(&self) -> bool {
        self.plan.as_ref().is_some_and(|p| p.files.is_empty())
    }

    /// Drop a pending transaction. No side effects.
    pub fn cancel(&mut self) -> Result<(), TransactionError> {
        self.require(TransactionStatus::Pending)?;
        self.status = TransactionStatus::Cancelled;
        Ok(())
    }

    fn require(&self, expected: TransactionStatus) -> Result<(), TransactionError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TransactionError::InvalidState {
                expected,
                actual: self.status,
            })
        }
    }

    fn report(&self, update: UpdateSummary) -> TransactionReport {
        let files = self
            .plan
            .as_ref()
            .map(|plan| {
                plan.files
                    .iter()
                    .map(|f| TouchedFile {
                        path: f.path.clone(),
                        created: f.original.is_none(),
                        bytes: f.text.len(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        TransactionReport {
            id: self.id,
            status: self.status,
            operations: self.operations.iter().map(Operation::label).collect(),
            noop: self.is_noop(),
            files,
            update,
        }
    }
}
