//! Read commands: graph statistics and the whole-codebase analyses.
//!
//! Text output is compact, one finding per line as `file:line ...`.

use anyhow::{anyhow, Result};
use std::path::Path;

use super::print_json;
use crate::codebase::{Codebase, SymbolHandle};

/// Look up `symbol` in `file` or explain what is missing.
pub fn find<'a>(codebase: &'a Codebase, file: &Path, symbol: &str) -> Result<SymbolHandle<'a>> {
    codebase
        .symbol(file, symbol)
        .ok_or_else(|| anyhow!("No symbol `{}` in {}", symbol, file.display()))
}

pub fn stats(codebase: &Codebase, json: bool) -> Result<()> {
    let stats = codebase.stats();
    if json {
        return print_json(&stats);
    }
    println!("Codeweave Graph");
    println!("─────────────────");
    println!("Files:      {} ({} partial)", stats.graph.file_count, stats.graph.partial_files);
    println!("Symbols:    {}", stats.graph.symbol_count);
    println!("Imports:    {} ({} unused)", stats.graph.import_count, stats.unused_imports);
    println!(
        "Edges:      {} ({} calls, {} references, {} inherits, {} ambiguous)",
        stats.graph.total_edges,
        stats.graph.call_edges,
        stats.graph.reference_edges,
        stats.graph.inherit_edges,
        stats.graph.ambiguous_edges
    );
    println!("Warnings:   {}", stats.graph.warnings);
    Ok(())
}

pub fn usages(codebase: &Codebase, file: &Path, symbol: &str, calls: bool, json: bool) -> Result<()> {
    let handle = find(codebase, file, symbol)?;
    let usages = if calls { handle.call_sites() } else { handle.usages() };
    if json {
        return print_json(&usages);
    }
    if usages.is_empty() {
        println!("No uses of '{}'", symbol);
    }
    for usage in &usages {
        let through = usage
            .resolved_through
            .as_ref()
            .map(|p| format!(" via {}", p.display()))
            .unwrap_or_default();
        println!(
            "{}:{} {:?}{}",
            usage.file.display(),
            usage.span.start_line,
            usage.kind,
            through
        );
    }
    Ok(())
}

pub fn dead(codebase: &Codebase, json: bool) -> Result<()> {
    let report = codebase.dead_code_report();
    if json {
        return print_json(&report);
    }
    for symbol in &report.dead_symbols {
        println!(
            "{}:{} {:?} {}",
            symbol.file.display(),
            symbol.line_start,
            symbol.kind,
            symbol.qualified_name
        );
    }
    for file in &report.dead_files {
        println!("@ {}", file.display());
    }
    println!(
        "{} dead symbols, {} dead files, {} live symbols",
        report.dead_symbols.len(),
        report.dead_files.len(),
        report.live_symbols
    );
    Ok(())
}

pub fn cycles(codebase: &Codebase, json: bool) -> Result<()> {
    let cycles = codebase.detect_import_cycles();
    if json {
        return print_json(&cycles);
    }
    if cycles.is_empty() {
        println!("No import cycles");
    }
    for cycle in &cycles {
        let names: Vec<String> = cycle.files.iter().map(|p| p.display().to_string()).collect();
        println!("{} -> {}", names.join(" -> "), names.first().cloned().unwrap_or_default());
    }
    Ok(())
}

pub fn complexity(codebase: &Codebase, limit: usize, json: bool) -> Result<()> {
    let report = codebase.complexity_report();
    if json {
        return print_json(&report);
    }
    for function in report.functions.iter().take(limit) {
        println!(
            "{:>4} {}:{} {}",
            function.complexity,
            function.file.display(),
            function.line,
            function.qualified_name
        );
    }
    Ok(())
}

pub fn unused(codebase: &Codebase, json: bool) -> Result<()> {
    let unused = codebase.unused_imports();
    if json {
        return print_json(&unused);
    }
    for import in &unused {
        println!(
            "{}:{} {} from '{}'",
            import.file.display(),
            import.span.start_line,
            import.local_name,
            import.module
        );
    }
    Ok(())
}

pub fn warnings(codebase: &Codebase, json: bool) -> Result<()> {
    let warnings = codebase.resolution_warnings();
    if json {
        return print_json(&warnings);
    }
    for warning in &warnings {
        println!("{}", warning);
    }
    Ok(())
}

pub fn diagnostics(codebase: &Codebase, json: bool) -> Result<()> {
    let files = codebase.parse_diagnostics();
    if json {
        return print_json(&files);
    }
    for file in &files {
        for diagnostic in &file.diagnostics {
            println!(
                "{}:{} {}",
                file.file.display(),
                diagnostic.span.start_line,
                diagnostic.message
            );
        }
    }
    Ok(())
}
