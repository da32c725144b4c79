//! CLI module for Codeweave.
//!
//! Commands:
//! - Read: stats, usages, dead, cycles, complexity, unused, warnings, diagnostics
//! - Write: move, rename, delete
//! - Batch: plan
//! - System: build, watch

pub mod plan;
pub mod read;
pub mod write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codeweave")]
#[command(about = "Codeweave - reference-preserving refactors for Python and JavaScript", long_about = None)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // ─── Read ─────────────────────────────────────────────────────
    /// Show graph statistics
    Stats,

    /// List the uses of a symbol
    Usages {
        /// File declaring the symbol, relative to the root
        file: PathBuf,

        /// Qualified name inside the file (e.g. `Box.open`)
        symbol: String,

        /// Only call sites
        #[arg(long)]
        calls: bool,
    },

    /// Report symbols and files nothing refers to
    Dead,

    /// Report import cycles
    Cycles,

    /// Cyclomatic complexity, most complex first
    Complexity {
        /// Max functions listed
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List imports nothing uses
    Unused,

    /// List names that could not be resolved
    Warnings,

    /// List files that parsed with syntax errors
    Diagnostics,

    // ─── Write ────────────────────────────────────────────────────
    /// Move a top-level symbol to another file
    Move {
        file: PathBuf,
        symbol: String,
        /// Destination file, created if missing
        target: PathBuf,
        /// Validate and show the touched files without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Rename a symbol and every reference to it
    Rename {
        file: PathBuf,
        symbol: String,
        new_name: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete an unreferenced symbol
    Delete {
        file: PathBuf,
        symbol: String,
        #[arg(long)]
        dry_run: bool,
    },

    // ─── Batch ────────────────────────────────────────────────────
    /// Run the operations of a plan JSON file as one transaction
    Plan {
        /// Path to plan JSON file
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },

    // ─── System ───────────────────────────────────────────────────
    /// Re-parse everything and rewrite the cache
    Build,

    /// Watch the tree and report graph changes
    Watch,
}

/// Print `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
