//
//  dead.rs
//  Codeweave
//

//! Conservative dead-code detection.
//!
//! A symbol is reported only when nothing could reach it: no use outside
//! its own body, no entry-point marker, no live subclass, no member access
//! that might name it, no wildcard import that might expose it, and no
//! mention in a file the resolver could not fully read.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

use super::types::DeadCodeReport;
use crate::config::AnalysisConfig;
use crate::graph::types::{ImportForm, ImportResolution, NodeData};
use crate::graph::{CodeGraph, EdgeKind, ExtractionSet, Symbol, SymbolId, SymbolInfo};
use crate::parser::adapter_for;

/// Live symbols and files, computed to a fixpoint.
pub struct Liveness<'a> {
    graph: &'a CodeGraph,
    files: &'a dyn ExtractionSet,
    config: &'a AnalysisConfig,
    /// class id -> member (name, id)
    members: HashMap<SymbolId, Vec<(&'a str, SymbolId)>>,
    live: HashSet<SymbolId>,
    live_files: HashSet<PathBuf>,
}

impl<'a> Liveness<'a> {
    pub fn compute(graph: &'a CodeGraph, files: &'a dyn ExtractionSet, config: &'a AnalysisConfig) -> Self {
        let mut members: HashMap<SymbolId, Vec<(&str, SymbolId)>> = HashMap::new();
        for symbol in candidates(graph) {
            if let Some(parent) = symbol.parent {
                members.entry(parent).or_default().push((symbol.name.as_str(), symbol.id));
            }
        }
        let mut liveness = Self {
            graph,
            files,
            config,
            members,
            live: HashSet::new(),
            live_files: HashSet::new(),
        };
        liveness.seed();
        liveness.propagate();
        liveness
    }

    pub fn is_live(&self, id: SymbolId) -> bool {
        self.live.contains(&id)
    }

    /// Only non-import symbols can be dead.
    pub fn is_dead(&self, id: SymbolId) -> bool {
        self.graph
            .symbol(id)
            .is_some_and(|s| s.kind.as_import().is_none() && !self.live.contains(&id))
    }

    fn seed(&mut self) {
        let member_names = self.member_names();
        let partial_names = self.partial_names();
        let roots: Vec<SymbolId> = candidates(self.graph)
            .filter(|s| {
                self.is_entry_point(s)
                    || self.has_direct_use(s)
                    || partial_names.contains(s.name.as_str())
                    || (self.is_member(s) && member_names.contains(s.name.as_str()))
            })
            .map(|s| s.id)
            .collect();
        self.live.extend(roots);
    }

    /// Member names used on receivers nobody could name.
    fn member_names(&self) -> HashSet<&'a str> {
        if !self.config.member_access_keeps_live {
            return HashSet::new();
        }
        let (graph, files) = (self.graph, self.files);
        let mut names: HashSet<&str> = graph.member_refs.values().flatten().map(String::as_str).collect();
        for path in files.paths() {
            if let Some(ext) = files.extraction(&path) {
                names.extend(ext.member_accesses.iter().map(|m| m.name.as_str()));
            }
        }
        names
    }

    /// Every name segment mentioned in a file with syntax errors.
    fn partial_names(&self) -> HashSet<&'a str> {
        let files = self.files;
        let mut names = HashSet::new();
        for path in files.paths() {
            let Some(ext) = files.extraction(&path) else {
                continue;
            };
            if ext.status.is_clean() {
                continue;
            }
            for site in &ext.sites {
                names.extend(site.segments.iter().map(String::as_str));
            }
        }
        names
    }

    fn is_member(&self, symbol: &Symbol) -> bool {
        symbol
            .parent
            .and_then(|p| self.graph.symbol(p))
            .is_some_and(|p| p.kind.as_class().is_some())
    }

    fn is_entry_point(&self, symbol: &Symbol) -> bool {
        let name = symbol.name.as_str();
        !symbol.attributes.decorators.is_empty()
            || symbol.attributes.exported
            || (name.len() > 4 && name.starts_with("__") && name.ends_with("__"))
            || self.overrides_base(symbol)
    }

    /// A method redefining a base-class member. Methods of classes with a
    /// base outside the project may override anything.
    fn overrides_base(&self, symbol: &Symbol) -> bool {
        let Some((class, info)) = symbol
            .parent
            .and_then(|p| self.graph.symbol(p))
            .and_then(|p| p.kind.as_class().map(|info| (p.id, info)))
        else {
            return false;
        };
        if info.bases.len() > info.base_edges.len() {
            return true;
        }
        let mut seen = HashSet::from([class]);
        let mut pending: Vec<SymbolId> = info.base_edges.clone();
        while let Some(base) = pending.pop() {
            if !seen.insert(base) {
                continue;
            }
            let defines = self
                .members
                .get(&base)
                .is_some_and(|m| m.iter().any(|(name, _)| *name == symbol.name));
            if defines {
                return true;
            }
            if let Some(info) = self.graph.symbol(base).and_then(|s| s.kind.as_class()) {
                pending.extend(info.base_edges.iter().copied());
            }
        }
        false
    }

    /// A reference or call from outside the symbol's own body.
    fn has_direct_use(&self, symbol: &Symbol) -> bool {
        self.graph.incoming(symbol.id).iter().any(|(source, edge)| {
            matches!(edge.kind, EdgeKind::References | EdgeKind::Calls)
                && !self
                    .graph
                    .symbol_of_node(*source)
                    .is_some_and(|from| self.graph.is_within(from.id, symbol.id))
        })
    }

    fn propagate(&mut self) {
        let importers = self.imported_files();
        let mut rounds = 0;
        loop {
            rounds += 1;
            self.refresh_live_files(&importers);
            let mut newly: Vec<SymbolId> = Vec::new();

            // Bases of live classes.
            for symbol in candidates(self.graph) {
                if self.live.contains(&symbol.id) {
                    continue;
                }
                let inherited = self.graph.incoming(symbol.id).iter().any(|(source, edge)| {
                    edge.kind == EdgeKind::Inherits
                        && self
                            .graph
                            .symbol_of_node(*source)
                            .is_some_and(|from| self.live.contains(&from.id))
                });
                if inherited {
                    newly.push(symbol.id);
                }
            }

            if self.config.wildcard_keeps_live {
                newly.extend(self.wildcard_exposed());
            }

            let before = self.live.len();
            self.live.extend(newly);
            if self.live.len() == before {
                break;
            }
        }
        self.refresh_live_files(&importers);
        debug!(rounds, live = self.live.len(), "Liveness fixpoint reached");
    }

    /// Files that another file's import statement resolved to.
    fn imported_files(&self) -> HashSet<PathBuf> {
        self.graph
            .statement_targets
            .iter()
            .flat_map(|(importer, targets)| {
                targets
                    .iter()
                    .flatten()
                    .filter(move |target| *target != importer)
                    .cloned()
            })
            .collect()
    }

    fn refresh_live_files(&mut self, importers: &HashSet<PathBuf>) {
        let (graph, files) = (self.graph, self.files);
        for path in files.paths() {
            let Some(ext) = files.extraction(&path) else {
                continue;
            };
            let live = ext.has_main_guard
                || ext.has_module_code
                || importers.contains(&path)
                || graph.symbols_in(&path).iter().any(|id| self.live.contains(id));
            if live {
                self.live_files.insert(path);
            }
        }
    }

    /// Public top-level symbols of files a live file wildcard-imports.
    fn wildcard_exposed(&self) -> Vec<SymbolId> {
        let mut exposed = Vec::new();
        for file in &self.live_files {
            for &id in self.graph.symbols_in(file) {
                let Some(binding) = self.graph.symbol(id).and_then(|s| s.kind.as_import()) else {
                    continue;
                };
                if binding.form != ImportForm::Wildcard {
                    continue;
                }
                let ImportResolution::Wildcard(module) = &binding.resolution else {
                    continue;
                };
                let Some(ext) = self.files.extraction(module) else {
                    continue;
                };
                let adapter = adapter_for(ext.language);
                for &target in self.graph.symbols_in(module) {
                    let Some(symbol) = self.graph.symbol(target) else {
                        continue;
                    };
                    if !symbol.is_top_level() || symbol.kind.as_import().is_some() || self.live.contains(&target) {
                        continue;
                    }
                    let public = match &ext.export_list {
                        Some(list) => list.iter().any(|(n, _)| *n == symbol.name),
                        None => adapter.is_public_name(&symbol.name),
                    };
                    if public {
                        exposed.push(target);
                    }
                }
            }
        }
        exposed
    }

    pub fn report(&self) -> DeadCodeReport {
        let mut dead_symbols: Vec<SymbolInfo> = candidates(self.graph)
            .filter(|s| !self.live.contains(&s.id))
            .map(SymbolInfo::from)
            .collect();
        dead_symbols.sort_by(|a, b| a.file.cmp(&b.file).then(a.line_start.cmp(&b.line_start)));

        let mut dead_files: Vec<PathBuf> = self
            .files
            .paths()
            .into_iter()
            .filter(|path| !self.live_files.contains(path))
            .filter(|path| {
                self.graph
                    .symbols_in(path)
                    .iter()
                    .filter_map(|&id| self.graph.symbol(id))
                    .any(|s| s.kind.as_import().is_none())
            })
            .collect();
        dead_files.sort();

        DeadCodeReport {
            dead_symbols,
            dead_files,
            live_symbols: self.live.len(),
        }
    }
}

/// Every non-import symbol in the graph.
fn candidates(graph: &CodeGraph) -> impl Iterator<Item = &Symbol> {
    graph
        .graph
        .node_weights()
        .filter_map(NodeData::as_symbol)
        .filter(|s| s.kind.as_import().is_none())
}

pub fn dead_code(graph: &CodeGraph, files: &dyn ExtractionSet, config: &AnalysisConfig) -> DeadCodeReport {
    Liveness::compute(graph, files, config).report()
}
