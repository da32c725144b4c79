//! Codeweave CLI - inspect a codebase graph and run refactors.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use codeweave::cli::{plan, read, write, Cli, Commands};
use codeweave::{watch, Codebase};

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so JSON on stdout stays clean. `RUST_LOG` overrides.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let codebase = Codebase::load(&cli.root)?;
    let json = cli.json;

    match cli.command {
        Commands::Stats => read::stats(&codebase, json)?,
        Commands::Usages { file, symbol, calls } => read::usages(&codebase, &file, &symbol, calls, json)?,
        Commands::Dead => read::dead(&codebase, json)?,
        Commands::Cycles => read::cycles(&codebase, json)?,
        Commands::Complexity { limit } => read::complexity(&codebase, limit, json)?,
        Commands::Unused => read::unused(&codebase, json)?,
        Commands::Warnings => read::warnings(&codebase, json)?,
        Commands::Diagnostics => read::diagnostics(&codebase, json)?,

        Commands::Move {
            file,
            symbol,
            target,
            dry_run,
        } => write::move_symbol(&codebase, &file, &symbol, target, dry_run, json)?,
        Commands::Rename {
            file,
            symbol,
            new_name,
            dry_run,
        } => write::rename(&codebase, &file, &symbol, new_name, dry_run, json)?,
        Commands::Delete { file, symbol, dry_run } => write::delete(&codebase, &file, &symbol, dry_run, json)?,

        Commands::Plan { file, dry_run } => plan::execute(&codebase, &file, dry_run, json)?,

        Commands::Build => {
            let summary = codebase.invalidate_all()?;
            codebase.save_cache()?;
            println!("✓ Built graph: {} files re-resolved", summary.resolved);
        }

        Commands::Watch => {
            let codebase = Arc::new(codebase);
            let _handle = watch::watch(Arc::clone(&codebase))?;
            let mut last = codebase.stats().generation;
            println!("Watching {} (Ctrl-C to stop)", codebase.root().display());
            loop {
                std::thread::sleep(Duration::from_secs(1));
                let stats = codebase.stats();
                if stats.generation != last {
                    last = stats.generation;
                    println!(
                        "generation {}: {} files, {} symbols, {} warnings",
                        stats.generation, stats.graph.file_count, stats.graph.symbol_count, stats.graph.warnings
                    );
                }
            }
        }
    }

    Ok(())
}
