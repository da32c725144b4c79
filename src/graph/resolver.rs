//
//  resolver.rs
//  Codeweave
//

//! Binds import bindings and reference sites to declarations.
//!
//! Resolution runs in three passes over the target files: import bindings,
//! then inheritance clauses (so `self.x` can see base classes), then every
//! other site. Each pass computes per-file outcomes in parallel against an
//! immutable graph and merges them single-threaded.

use petgraph::stable_graph::NodeIndex;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::engine::CodeGraph;
use super::types::*;
use super::ExtractionSet;
use crate::parser::{adapter_for, LanguageAdapter, ModuleContext};

/// Longest re-export chain followed before giving up with `Cycle`.
const MAX_CHAIN_DEPTH: usize = 16;

type Visited = HashSet<(PathBuf, String)>;

/// A name looked up in a module's export surface.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Export {
    Symbol { target: SymbolId, via: Vec<SymbolId> },
    Module(PathBuf),
    Ambiguous(Vec<SymbolId>),
    Missing,
    Cycle,
}

/// A name looked up in a file's scope chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NameHit {
    Symbol(usize),
    Local,
    Tie(Vec<usize>),
    Missing,
}

/// What a prefix of a dotted site denotes.
#[derive(Debug, Clone)]
enum Resolved {
    Decl(SymbolId),
    Module(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Inherit,
    Rest,
}

#[derive(Debug, Default)]
struct FileOutcome {
    edges: Vec<(NodeIndex, NodeIndex, EdgeData)>,
    warnings: Vec<ResolutionWarning>,
    deps: HashSet<PathBuf>,
    member_refs: HashSet<String>,
    bindings: Vec<(SymbolId, ImportResolution)>,
    base_edges: Vec<(SymbolId, SymbolId)>,
    statement_targets: Option<Vec<Option<PathBuf>>>,
}

impl FileOutcome {
    fn apply(self, graph: &mut CodeGraph, file: &Path) {
        for (from, to, data) in self.edges {
            graph.add_edge(from, to, data);
        }
        for (id, resolution) in self.bindings {
            if let Some(binding) = graph.symbol_mut(id).and_then(|s| s.kind.as_import_mut()) {
                binding.resolution = resolution;
            }
        }
        for (class, base) in self.base_edges {
            if let Some(SymbolKind::Class(info)) = graph.symbol_mut(class).map(|s| &mut s.kind) {
                if !info.base_edges.contains(&base) {
                    info.base_edges.push(base);
                }
            }
        }
        if !self.warnings.is_empty() {
            graph
                .warnings
                .entry(file.to_path_buf())
                .or_default()
                .extend(self.warnings);
        }
        if !self.member_refs.is_empty() {
            graph
                .member_refs
                .entry(file.to_path_buf())
                .or_default()
                .extend(self.member_refs);
        }
        graph
            .lookup_deps
            .entry(file.to_path_buf())
            .or_default()
            .extend(self.deps);
        if let Some(targets) = self.statement_targets {
            graph.statement_targets.insert(file.to_path_buf(), targets);
        }
    }
}

impl CodeGraph {
    /// Forget everything a previous resolution of `file` derived.
    fn reset_resolution(&mut self, file: &Path) {
        self.clear_derived_edges(file);
        self.warnings.remove(file);
        self.member_refs.remove(file);
        self.lookup_deps.remove(file);
        self.statement_targets.remove(file);
        for id in self.symbols_in(file).to_vec() {
            if let Some(symbol) = self.symbol_mut(id) {
                match &mut symbol.kind {
                    SymbolKind::ImportBinding(b) => b.resolution = ImportResolution::Pending,
                    SymbolKind::Class(c) => c.base_edges.clear(),
                    _ => {}
                }
            }
        }
    }
}

/// Re-resolve `targets` against the current extractions.
///
/// Derived state of the targets is rebuilt from scratch; every other
/// file's edges are left alone.
pub fn resolve_files(graph: &mut CodeGraph, files: &dyn ExtractionSet, targets: &[PathBuf], ctx: &ModuleContext) {
    let mut targets: Vec<PathBuf> = targets
        .iter()
        .filter(|t| files.extraction(t).is_some() && graph.contains_file(t))
        .cloned()
        .collect();
    targets.sort();
    targets.dedup();
    for target in &targets {
        graph.reset_resolution(target);
    }
    let prefixes = local_prefixes(files, ctx);

    let imports: Vec<(PathBuf, FileOutcome)> = {
        let lookup = Lookup::new(graph, files, ctx, &prefixes);
        targets
            .par_iter()
            .map(|t| (t.clone(), lookup.resolve_imports(t)))
            .collect()
    };
    for (file, outcome) in imports {
        outcome.apply(graph, &file);
    }

    for pass in [Pass::Inherit, Pass::Rest] {
        let outcomes: Vec<(PathBuf, FileOutcome)> = {
            let lookup = Lookup::new(graph, files, ctx, &prefixes);
            targets
                .par_iter()
                .map(|t| (t.clone(), lookup.resolve_sites(t, pass)))
                .collect()
        };
        for (file, outcome) in outcomes {
            outcome.apply(graph, &file);
        }
    }

    debug!(files = targets.len(), "Resolved reference sites");
}

/// `root/first-component` for every file under every source root. Used to
/// tell project modules from external packages.
fn local_prefixes(files: &dyn ExtractionSet, ctx: &ModuleContext) -> HashSet<PathBuf> {
    let mut prefixes = HashSet::new();
    for path in files.paths() {
        for root in &ctx.source_roots {
            if let Some(first) = path.strip_prefix(root).ok().and_then(|rest| rest.components().next()) {
                prefixes.insert(root.join(first));
            }
        }
    }
    prefixes
}

fn edge_kind(kind: SiteKind) -> EdgeKind {
    match kind {
        SiteKind::Call => EdgeKind::Calls,
        SiteKind::Inherit => EdgeKind::Inherits,
        SiteKind::Reference | SiteKind::Decorator | SiteKind::Export | SiteKind::Computed => {
            EdgeKind::References
        }
    }
}

/// Pick among bindings of one name by lexical nearness.
///
/// `before` is the site offset for sites that run in order with the
/// bindings; `None` takes the last binding. A conditional pick that has
/// conditional neighbours ties with them.
fn nearest(bindings: &[(usize, bool)], before: Option<usize>) -> Result<usize, Vec<usize>> {
    let chosen = match before {
        None => bindings.len().saturating_sub(1),
        Some(offset) => bindings.iter().rposition(|(pos, _)| *pos < offset).unwrap_or(0),
    };
    if !bindings.get(chosen).is_some_and(|(_, conditional)| *conditional) {
        return Ok(chosen);
    }
    let mut start = chosen;
    while start > 0 && bindings[start - 1].1 {
        start -= 1;
    }
    if start == chosen {
        Ok(chosen)
    } else {
        Err((start..=chosen).collect())
    }
}

/// Look `name` up from `start` outwards. Class scopes are only visible to
/// sites directly in their body.
fn lookup_name(ext: &FileExtraction, start: ScopeId, name: &str, offset: usize) -> NameHit {
    let mut scope_id = start;
    let mut in_function = false;
    loop {
        let Some(scope) = ext.scopes.get(scope_id) else {
            return NameHit::Missing;
        };
        if scope_id != 0 && scope.globals.contains(name) {
            scope_id = 0;
            in_function = true;
            continue;
        }
        let visible = scope_id == start || scope.kind != ScopeKind::Class;
        if let Some(bindings) = scope.bindings.get(name).filter(|b| visible && !b.is_empty()) {
            let entries: Vec<(usize, bool)> = bindings
                .iter()
                .map(|b| {
                    let conditional = match b.target {
                        BindingTarget::Symbol(i) => ext.symbols[i].attributes.conditional,
                        BindingTarget::Local => false,
                    };
                    (b.position, conditional)
                })
                .collect();
            let before = (scope.kind != ScopeKind::Module || !in_function).then_some(offset);
            return match nearest(&entries, before) {
                Ok(i) => match bindings[i].target {
                    BindingTarget::Symbol(s) => NameHit::Symbol(s),
                    BindingTarget::Local => NameHit::Local,
                },
                Err(tied) => NameHit::Tie(
                    tied.into_iter()
                        .filter_map(|i| match bindings[i].target {
                            BindingTarget::Symbol(s) => Some(s),
                            BindingTarget::Local => None,
                        })
                        .collect(),
                ),
            };
        }
        if scope.kind == ScopeKind::Function {
            in_function = true;
        }
        match scope.parent {
            Some(parent) => scope_id = parent,
            None => return NameHit::Missing,
        }
    }
}

/// One site being resolved.
struct Walk<'w> {
    file: &'w Path,
    ext: &'w FileExtraction,
    index: usize,
    site: &'w ReferenceSite,
    from: NodeIndex,
}

impl Walk<'_> {
    fn last(&self) -> usize {
        self.site.segments.len().saturating_sub(1)
    }

    fn site_ref(&self, segment: usize) -> SiteRef {
        SiteRef {
            file: self.file.to_path_buf(),
            index: self.index,
            segment,
            span: self.site.segment_spans.get(segment).copied().unwrap_or(self.site.span),
        }
    }

    fn warning(&self, kind: WarningKind) -> ResolutionWarning {
        ResolutionWarning {
            file: self.file.to_path_buf(),
            span: self.site.span,
            name: self.site.segments.join("."),
            kind,
        }
    }
}

/// Read-only view the passes resolve against.
struct Lookup<'a> {
    graph: &'a CodeGraph,
    files: &'a dyn ExtractionSet,
    ctx: &'a ModuleContext,
    prefixes: &'a HashSet<PathBuf>,
}

impl<'a> Lookup<'a> {
    fn new(
        graph: &'a CodeGraph,
        files: &'a dyn ExtractionSet,
        ctx: &'a ModuleContext,
        prefixes: &'a HashSet<PathBuf>,
    ) -> Self {
        Self {
            graph,
            files,
            ctx,
            prefixes,
        }
    }

    fn adapter(&self, file: &Path) -> Option<&'static dyn LanguageAdapter> {
        self.files.extraction(file).map(|e| adapter_for(e.language))
    }

    // ─── Modules ────────────────────────────────────────────────

    /// The file a specifier names. Every candidate is a dependency, found or not.
    fn find_module(&self, importer: &Path, specifier: &str, deps: &mut HashSet<PathBuf>) -> Option<PathBuf> {
        let adapter = self.adapter(importer)?;
        let candidates = adapter.module_candidates(importer, specifier, self.ctx);
        deps.extend(candidates.iter().cloned());
        candidates.into_iter().find(|c| self.files.extraction(c).is_some())
    }

    /// A specifier that cannot name a project file (stdlib, node package).
    fn is_external(&self, importer: &Path, specifier: &str) -> bool {
        if specifier.starts_with('.') || specifier.starts_with('/') {
            return false;
        }
        let Some(adapter) = self.adapter(importer) else {
            return true;
        };
        let candidates = adapter.module_candidates(importer, specifier, self.ctx);
        !candidates.iter().any(|c| {
            self.ctx.source_roots.iter().any(|root| {
                c.strip_prefix(root)
                    .ok()
                    .and_then(|rest| rest.components().next())
                    .is_some_and(|first| self.prefixes.contains(&root.join(first)))
            })
        })
    }

    fn resolve_binding(
        &self,
        file: &Path,
        binding: &ImportBinding,
        deps: &mut HashSet<PathBuf>,
        visited: &mut Visited,
    ) -> ImportResolution {
        let Some(module) = self.find_module(file, &binding.module, deps) else {
            // `from pkg import mod` where `pkg` has no `__init__`.
            if let (ImportForm::Named, Some(name), Some(adapter)) =
                (binding.form, binding.imported.as_deref(), self.adapter(file))
            {
                for package in adapter.module_candidates(file, &binding.module, self.ctx) {
                    for sub in adapter.submodule_candidates(&package, name) {
                        deps.insert(sub.clone());
                        if self.files.extraction(&sub).is_some() {
                            return ImportResolution::Module(sub);
                        }
                    }
                }
            }
            return ImportResolution::Unresolved(UnresolvedReason::MissingModule(binding.module.clone()));
        };

        match (binding.form, binding.imported.as_deref()) {
            (ImportForm::Wildcard, _) => ImportResolution::Wildcard(module),
            (_, None) => ImportResolution::Module(module),
            (_, Some(name)) => match self.lookup_export(&module, name, deps, visited) {
                Export::Symbol { target, via } => ImportResolution::Symbol {
                    target,
                    via,
                    direct_file: module,
                },
                Export::Module(m) => ImportResolution::Module(m),
                Export::Ambiguous(candidates) => ImportResolution::Ambiguous(candidates),
                Export::Missing => ImportResolution::Unresolved(UnresolvedReason::MissingName {
                    module: binding.module.clone(),
                    name: name.to_string(),
                }),
                Export::Cycle => ImportResolution::Unresolved(UnresolvedReason::Cycle),
            },
        }
    }

    // ─── Export surfaces ────────────────────────────────────────

    fn lookup_export(&self, file: &Path, name: &str, deps: &mut HashSet<PathBuf>, visited: &mut Visited) -> Export {
        deps.insert(file.to_path_buf());
        let Some(ext) = self.files.extraction(file) else {
            return Export::Missing;
        };
        let key = (file.to_path_buf(), name.to_string());
        if visited.len() >= MAX_CHAIN_DEPTH || !visited.insert(key.clone()) {
            return Export::Cycle;
        }
        let result = if ext.exports_all_names {
            self.implicit_export(file, ext, name, deps, visited)
        } else {
            self.explicit_export(file, ext, name, deps, visited)
        };
        visited.remove(&key);
        result
    }

    /// Python: every module-level name, then wildcard imports, then submodules.
    fn implicit_export(
        &self,
        file: &Path,
        ext: &FileExtraction,
        name: &str,
        deps: &mut HashSet<PathBuf>,
        visited: &mut Visited,
    ) -> Export {
        let candidates: Vec<usize> = ext
            .module_symbols_named(name)
            .filter(|(_, s)| !s.kind.as_import().is_some_and(|b| b.form == ImportForm::Wildcard))
            .map(|(i, _)| i)
            .collect();
        if !candidates.is_empty() {
            return self.pick_and_chase(file, ext, &candidates, deps, visited);
        }
        match self.wildcard_export(file, ext, name, |_| true, deps, visited) {
            Export::Missing => {}
            found => return found,
        }
        if let Some(adapter) = self.adapter(file) {
            for sub in adapter.submodule_candidates(file, name) {
                deps.insert(sub.clone());
                if self.files.extraction(&sub).is_some() {
                    return Export::Module(sub);
                }
            }
        }
        Export::Missing
    }

    /// JavaScript: export clauses, then named re-exports, then `export *`.
    fn explicit_export(
        &self,
        file: &Path,
        ext: &FileExtraction,
        name: &str,
        deps: &mut HashSet<PathBuf>,
        visited: &mut Visited,
    ) -> Export {
        if let Some(entry) = ext.exports.iter().rev().find(|e| e.exported == name) {
            let candidates: Vec<usize> = ext
                .module_symbols_named(&entry.local)
                .filter(|(_, s)| !s.kind.as_import().is_some_and(|b| b.reexport))
                .map(|(i, _)| i)
                .collect();
            if !candidates.is_empty() {
                return self.pick_and_chase(file, ext, &candidates, deps, visited);
            }
        }
        let reexport = ext.symbols.iter().rposition(|s| {
            s.kind
                .as_import()
                .is_some_and(|b| b.reexport && b.form != ImportForm::Wildcard && b.local_name == name)
        });
        if let Some(idx) = reexport {
            return self.chase(file, ext, idx, deps, visited);
        }
        self.wildcard_export(file, ext, name, |b| b.reexport, deps, visited)
    }

    fn pick_and_chase(
        &self,
        file: &Path,
        ext: &FileExtraction,
        candidates: &[usize],
        deps: &mut HashSet<PathBuf>,
        visited: &mut Visited,
    ) -> Export {
        let entries: Vec<(usize, bool)> = candidates
            .iter()
            .map(|&i| (ext.symbols[i].span.start, ext.symbols[i].attributes.conditional))
            .collect();
        match nearest(&entries, None) {
            Ok(i) => self.chase(file, ext, candidates[i], deps, visited),
            Err(tied) => Export::Ambiguous(
                tied.into_iter()
                    .filter_map(|i| self.graph.symbol_at(file, candidates[i]))
                    .collect(),
            ),
        }
    }

    /// Follow a module-level symbol to its declaration.
    fn chase(
        &self,
        file: &Path,
        ext: &FileExtraction,
        idx: usize,
        deps: &mut HashSet<PathBuf>,
        visited: &mut Visited,
    ) -> Export {
        let Some(id) = self.graph.symbol_at(file, idx) else {
            return Export::Missing;
        };
        let Some(binding) = ext.symbols[idx].kind.as_import() else {
            return Export::Symbol {
                target: id,
                via: Vec::new(),
            };
        };
        match self.resolve_binding(file, binding, deps, visited) {
            ImportResolution::Symbol { target, mut via, .. } => {
                via.insert(0, id);
                Export::Symbol { target, via }
            }
            ImportResolution::Module(m) => Export::Module(m),
            ImportResolution::Ambiguous(candidates) => Export::Ambiguous(candidates),
            ImportResolution::Unresolved(UnresolvedReason::Cycle) => Export::Cycle,
            // Re-export of something outside the project: the binding is the target.
            ImportResolution::Unresolved(_) | ImportResolution::Wildcard(_) | ImportResolution::Pending => {
                Export::Symbol {
                    target: id,
                    via: Vec::new(),
                }
            }
        }
    }

    /// Whether `module` hands `name` out through a wildcard import.
    fn exposes(&self, module: &Path, name: &str) -> bool {
        let Some(ext) = self.files.extraction(module) else {
            return false;
        };
        match &ext.export_list {
            Some(list) => list.iter().any(|(n, _)| n == name),
            None => name != "default" && adapter_for(ext.language).is_public_name(name),
        }
    }

    /// Providers of `name` among the file's wildcard imports. One provider
    /// resolves; several tie.
    fn wildcard_export(
        &self,
        file: &Path,
        ext: &FileExtraction,
        name: &str,
        accept: impl Fn(&ImportBinding) -> bool,
        deps: &mut HashSet<PathBuf>,
        visited: &mut Visited,
    ) -> Export {
        let mut providers: Vec<Export> = Vec::new();
        for (idx, symbol) in ext.symbols.iter().enumerate() {
            let Some(binding) = symbol.kind.as_import() else {
                continue;
            };
            if binding.form != ImportForm::Wildcard || symbol.scope != 0 || !accept(binding) {
                continue;
            }
            let Some(module) = self.find_module(file, &binding.module, deps) else {
                continue;
            };
            if !self.exposes(&module, name) {
                continue;
            }
            match self.lookup_export(&module, name, deps, visited) {
                Export::Missing => {}
                Export::Symbol { target, mut via } => {
                    if let Some(id) = self.graph.symbol_at(file, idx) {
                        via.insert(0, id);
                    }
                    providers.push(Export::Symbol { target, via });
                }
                other => providers.push(other),
            }
        }
        match providers.len() {
            0 => Export::Missing,
            1 => providers.pop().unwrap_or(Export::Missing),
            _ => Export::Ambiguous(
                providers
                    .into_iter()
                    .flat_map(|p| match p {
                        Export::Symbol { target, .. } => vec![target],
                        Export::Ambiguous(c) => c,
                        _ => Vec::new(),
                    })
                    .collect(),
            ),
        }
    }

    // ─── Pass 1: import bindings ────────────────────────────────

    fn resolve_imports(&self, file: &Path) -> FileOutcome {
        let mut out = FileOutcome::default();
        let Some(ext) = self.files.extraction(file) else {
            return out;
        };
        let mut by_index: HashMap<usize, ImportResolution> = HashMap::new();
        for (idx, symbol) in ext.symbols.iter().enumerate() {
            let Some(binding) = symbol.kind.as_import() else {
                continue;
            };
            let Some(id) = self.graph.symbol_at(file, idx) else {
                continue;
            };
            let mut visited = Visited::new();
            let resolution = self.resolve_binding(file, binding, &mut out.deps, &mut visited);
            self.binding_effects(file, idx, id, binding, &resolution, &mut out);
            by_index.insert(idx, resolution.clone());
            out.bindings.push((id, resolution));
        }

        let mut targets = Vec::with_capacity(ext.import_statements.len());
        for statement in &ext.import_statements {
            let target = self.find_module(file, &statement.module, &mut out.deps).or_else(|| {
                statement
                    .bindings
                    .first()
                    .and_then(|b| by_index.get(b))
                    .and_then(|r| r.module_file().cloned())
            });
            targets.push(target);
        }
        out.statement_targets = Some(targets);
        out
    }

    fn binding_effects(
        &self,
        file: &Path,
        idx: usize,
        id: SymbolId,
        binding: &ImportBinding,
        resolution: &ImportResolution,
        out: &mut FileOutcome,
    ) {
        let Some(from) = self.graph.node_of(id) else {
            return;
        };
        let site = SiteRef {
            file: file.to_path_buf(),
            index: idx,
            segment: 0,
            span: binding.clause_span,
        };
        let warning = |kind| ResolutionWarning {
            file: file.to_path_buf(),
            span: binding.clause_span,
            name: binding
                .imported
                .clone()
                .unwrap_or_else(|| binding.module.clone()),
            kind,
        };
        match resolution {
            ImportResolution::Symbol { target, .. } => {
                if let Some(to) = self.graph.node_of(*target) {
                    out.edges.push((from, to, EdgeData::at_site(EdgeKind::Imports, site)));
                }
            }
            ImportResolution::Module(path) | ImportResolution::Wildcard(path) => {
                if let Some(to) = self.graph.file_node(path) {
                    out.edges.push((from, to, EdgeData::at_site(EdgeKind::Imports, site)));
                }
            }
            ImportResolution::Ambiguous(candidates) => {
                for candidate in candidates {
                    if let Some(to) = self.graph.node_of(*candidate) {
                        let mut data = EdgeData::at_site(EdgeKind::Imports, site.clone());
                        data.certainty = Certainty::Ambiguous;
                        out.edges.push((from, to, data));
                    }
                }
                out.warnings.push(warning(WarningKind::Ambiguous {
                    candidates: candidates.clone(),
                }));
            }
            ImportResolution::Unresolved(UnresolvedReason::MissingModule(module))
                if self.is_external(file, module) => {}
            ImportResolution::Unresolved(reason) => {
                out.warnings.push(warning(WarningKind::UnresolvedMissing {
                    reason: reason.clone(),
                }));
            }
            ImportResolution::Pending => {}
        }
    }

    // ─── Passes 2 and 3: reference sites ────────────────────────

    fn site_source(&self, file: &Path, enclosing: Option<usize>) -> Option<NodeIndex> {
        match enclosing {
            Some(idx) => self.graph.symbol_at(file, idx).and_then(|id| self.graph.node_of(id)),
            None => self.graph.file_node(file),
        }
    }

    fn resolve_sites(&self, file: &Path, pass: Pass) -> FileOutcome {
        let mut out = FileOutcome::default();
        let Some(ext) = self.files.extraction(file) else {
            return out;
        };
        // Sites of a file with syntax errors stay unresolved.
        if !ext.status.is_clean() {
            return out;
        }
        for (index, site) in ext.sites.iter().enumerate() {
            if (site.kind == SiteKind::Inherit) != (pass == Pass::Inherit) || site.segments.is_empty() {
                continue;
            }
            let Some(from) = self.site_source(file, site.enclosing) else {
                continue;
            };
            let walk = Walk {
                file,
                ext,
                index,
                site,
                from,
            };
            self.resolve_site(&walk, &mut out);
        }
        if pass == Pass::Rest {
            for dynamic in &ext.dynamic_sites {
                out.warnings.push(ResolutionWarning {
                    file: file.to_path_buf(),
                    span: dynamic.span,
                    name: dynamic.detail.clone(),
                    kind: WarningKind::UnresolvedDynamic {
                        detail: dynamic.detail.clone(),
                    },
                });
            }
        }
        out
    }

    fn resolve_site(&self, walk: &Walk<'_>, out: &mut FileOutcome) {
        let adapter = adapter_for(walk.ext.language);
        let segments = &walk.site.segments;
        let first = segments[0].as_str();

        if segments.len() > 1 && adapter.self_names().contains(&first) {
            match self.enclosing_class(walk.file, walk.ext, walk.site.enclosing) {
                Some(class) => self.follow(walk, Resolved::Decl(class), 0, None, false, out),
                None => {
                    out.member_refs.insert(segments[1].clone());
                }
            }
            return;
        }

        match lookup_name(walk.ext, walk.site.scope, first, walk.site.span.start) {
            NameHit::Local => {
                if let Some(next) = segments.get(1) {
                    out.member_refs.insert(next.clone());
                }
            }
            NameHit::Tie(indices) => {
                let ids: Vec<SymbolId> = indices
                    .into_iter()
                    .filter_map(|i| self.graph.symbol_at(walk.file, i))
                    .collect();
                self.ambiguous(walk, &ids, 0, None, out);
            }
            NameHit::Symbol(i) => {
                let Some(id) = self.graph.symbol_at(walk.file, i) else {
                    return;
                };
                match walk.ext.symbols[i].kind.as_import() {
                    None => self.follow(walk, Resolved::Decl(id), 0, None, true, out),
                    Some(binding) => self.through_binding(walk, id, binding, out),
                }
            }
            NameHit::Missing => self.unbound(walk, adapter, out),
        }
    }

    fn through_binding(&self, walk: &Walk<'_>, binding_id: SymbolId, binding: &ImportBinding, out: &mut FileOutcome) {
        let resolution = self
            .graph
            .symbol(binding_id)
            .and_then(|s| s.kind.as_import())
            .map(|b| b.resolution.clone())
            .unwrap_or_default();
        match resolution {
            ImportResolution::Symbol { target, .. } => {
                self.follow(walk, Resolved::Decl(target), 0, Some(binding_id), true, out)
            }
            ImportResolution::Module(path) => match self.module_prefix(walk, binding, path, &mut out.deps) {
                Some((module, at)) => self.follow(walk, Resolved::Module(module), at, Some(binding_id), true, out),
                None => self.binding_use(walk, binding_id, 0, out),
            },
            ImportResolution::Ambiguous(candidates) => self.ambiguous(walk, &candidates, 0, Some(binding_id), out),
            ImportResolution::Wildcard(_) | ImportResolution::Pending | ImportResolution::Unresolved(_) => {
                self.binding_use(walk, binding_id, 0, out)
            }
        }
    }

    /// `import a.b.c` binds `a`; a site `a.b.c.f` walks the leading
    /// segments before reaching the module.
    fn module_prefix(
        &self,
        walk: &Walk<'_>,
        binding: &ImportBinding,
        module_file: PathBuf,
        deps: &mut HashSet<PathBuf>,
    ) -> Option<(PathBuf, usize)> {
        if binding.form != ImportForm::Module
            || binding.alias.is_some()
            || binding.module.starts_with('.')
            || !binding.module.contains('.')
        {
            return Some((module_file, 0));
        }
        let parts: Vec<&str> = binding.module.split('.').collect();
        let segments = &walk.site.segments;
        let mut matched = 1;
        while matched < parts.len() && matched < segments.len() && segments[matched] == parts[matched] {
            matched += 1;
        }
        if matched == parts.len() {
            return Some((module_file, matched - 1));
        }
        self.find_module(walk.file, &parts[..matched].join("."), deps)
            .map(|m| (m, matched - 1))
    }

    /// A name with no binding: wildcard imports, then builtins.
    fn unbound(&self, walk: &Walk<'_>, adapter: &dyn LanguageAdapter, out: &mut FileOutcome) {
        let name = walk.site.segments[0].as_str();
        let mut visited = Visited::new();
        let found = self.wildcard_export(walk.file, walk.ext, name, |b| !b.reexport, &mut out.deps, &mut visited);
        match found {
            Export::Symbol { target, via } => {
                self.follow(walk, Resolved::Decl(target), 0, via.first().copied(), true, out)
            }
            Export::Module(m) => self.follow(walk, Resolved::Module(m), 0, None, true, out),
            Export::Ambiguous(candidates) => self.ambiguous(walk, &candidates, 0, None, out),
            Export::Missing | Export::Cycle => {
                if adapter.is_builtin(name) || self.has_opaque_wildcard(walk) {
                    return;
                }
                out.warnings.push(walk.warning(WarningKind::UndefinedName));
            }
        }
    }

    /// A wildcard import from outside the project could define anything.
    fn has_opaque_wildcard(&self, walk: &Walk<'_>) -> bool {
        walk.ext.symbols.iter().enumerate().any(|(idx, s)| {
            s.kind.as_import().is_some_and(|b| {
                b.form == ImportForm::Wildcard
                    && !b.reexport
                    && !self
                        .graph
                        .symbol_at(walk.file, idx)
                        .and_then(|id| self.graph.symbol(id))
                        .and_then(|s| s.kind.as_import())
                        .is_some_and(|b| matches!(b.resolution, ImportResolution::Wildcard(_)))
            })
        })
    }

    fn enclosing_class(&self, file: &Path, ext: &FileExtraction, enclosing: Option<usize>) -> Option<SymbolId> {
        let mut current = enclosing;
        while let Some(idx) = current {
            let symbol = ext.symbols.get(idx)?;
            match &symbol.kind {
                SymbolKind::Class(_) => return self.graph.symbol_at(file, idx),
                SymbolKind::Function(f) if f.is_method => {
                    return symbol.parent.and_then(|p| self.graph.symbol_at(file, p));
                }
                _ => current = symbol.parent,
            }
        }
        None
    }

    /// Member `name` of a class, searching resolved bases depth-first.
    fn class_member(&self, class: SymbolId, name: &str, seen: &mut HashSet<SymbolId>) -> Option<SymbolId> {
        if !seen.insert(class) {
            return None;
        }
        let symbol = self.graph.symbol(class)?;
        let own = self
            .graph
            .symbols_in(&symbol.file)
            .iter()
            .filter_map(|&id| self.graph.symbol(id))
            .filter(|s| s.parent == Some(class) && s.name == name && s.kind.as_import().is_none())
            .last()
            .map(|s| s.id);
        if own.is_some() {
            return own;
        }
        symbol
            .kind
            .as_class()?
            .base_edges
            .iter()
            .find_map(|&base| self.class_member(base, name, seen))
    }

    /// Walk the remaining segments from `start`, which denotes segment `at`.
    fn follow(
        &self,
        walk: &Walk<'_>,
        start: Resolved,
        at: usize,
        via: Option<SymbolId>,
        emit_first: bool,
        out: &mut FileOutcome,
    ) {
        let segments = &walk.site.segments;
        let last = walk.last();
        let mut current = start;
        let mut at = at;
        let mut emit = emit_first;
        loop {
            if at >= last {
                self.finish(walk, current, last, via, out);
                return;
            }
            if let (true, Resolved::Decl(id)) = (emit, &current) {
                self.edge(walk, *id, EdgeKind::References, at, via, Certainty::Exact, out);
            }
            emit = true;
            let next = &segments[at + 1];
            current = match current {
                Resolved::Decl(id) => {
                    let is_class = self.graph.symbol(id).is_some_and(|s| s.kind.as_class().is_some());
                    let member = if is_class {
                        self.class_member(id, next, &mut HashSet::new())
                    } else {
                        None
                    };
                    match member {
                        Some(m) => Resolved::Decl(m),
                        None => {
                            out.member_refs.insert(next.clone());
                            return;
                        }
                    }
                }
                Resolved::Module(path) => {
                    let mut visited = Visited::new();
                    match self.lookup_export(&path, next, &mut out.deps, &mut visited) {
                        Export::Symbol { target, .. } => Resolved::Decl(target),
                        Export::Module(m) => Resolved::Module(m),
                        Export::Ambiguous(candidates) => {
                            self.ambiguous(walk, &candidates, at + 1, via, out);
                            return;
                        }
                        Export::Missing => {
                            out.warnings.push(walk.warning(WarningKind::UnresolvedMissing {
                                reason: UnresolvedReason::MissingName {
                                    module: path.display().to_string(),
                                    name: next.clone(),
                                },
                            }));
                            if let Some(binding) = via {
                                self.binding_use(walk, binding, at, out);
                            }
                            return;
                        }
                        Export::Cycle => {
                            out.warnings.push(walk.warning(WarningKind::UnresolvedMissing {
                                reason: UnresolvedReason::Cycle,
                            }));
                            return;
                        }
                    }
                }
            };
            at += 1;
        }
    }

    fn finish(&self, walk: &Walk<'_>, current: Resolved, at: usize, via: Option<SymbolId>, out: &mut FileOutcome) {
        match current {
            Resolved::Decl(id) => {
                self.edge(walk, id, edge_kind(walk.site.kind), at, via, Certainty::Exact, out);
                if walk.site.kind == SiteKind::Inherit {
                    let class = walk
                        .site
                        .enclosing
                        .and_then(|idx| self.graph.symbol_at(walk.file, idx));
                    let is_class = self.graph.symbol(id).is_some_and(|s| s.kind.as_class().is_some());
                    if let (Some(class), true) = (class, is_class) {
                        out.base_edges.push((class, id));
                    }
                }
            }
            Resolved::Module(path) => {
                if walk.site.kind == SiteKind::Computed {
                    out.warnings.push(walk.warning(WarningKind::UnresolvedDynamic {
                        detail: format!("computed member of module {}", path.display()),
                    }));
                }
                if let Some(binding) = via {
                    self.binding_use(walk, binding, at, out);
                }
            }
        }
    }

    /// A use of an import binding that reached no declaration.
    fn binding_use(&self, walk: &Walk<'_>, binding: SymbolId, at: usize, out: &mut FileOutcome) {
        self.edge(walk, binding, EdgeKind::References, at, Some(binding), Certainty::Exact, out);
    }

    fn ambiguous(
        &self,
        walk: &Walk<'_>,
        candidates: &[SymbolId],
        at: usize,
        via: Option<SymbolId>,
        out: &mut FileOutcome,
    ) {
        let kind = if at >= walk.last() {
            edge_kind(walk.site.kind)
        } else {
            EdgeKind::References
        };
        for &candidate in candidates {
            self.edge(walk, candidate, kind, at, via, Certainty::Ambiguous, out);
        }
        out.warnings.push(walk.warning(WarningKind::Ambiguous {
            candidates: candidates.to_vec(),
        }));
    }

    #[allow(clippy::too_many_arguments)]
    fn edge(
        &self,
        walk: &Walk<'_>,
        target: SymbolId,
        kind: EdgeKind,
        segment: usize,
        via: Option<SymbolId>,
        certainty: Certainty,
        out: &mut FileOutcome,
    ) {
        let Some(to) = self.graph.node_of(target) else {
            return;
        };
        out.edges.push((
            walk.from,
            to,
            EdgeData {
                kind,
                site: Some(walk.site_ref(segment)),
                via,
                certainty,
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::parser::extract_file;
    use std::collections::BTreeMap;

    fn build(sources: &[(&str, &str)]) -> (CodeGraph, BTreeMap<PathBuf, FileExtraction>) {
        let files: BTreeMap<PathBuf, FileExtraction> = sources
            .iter()
            .map(|(path, text)| {
                let path = PathBuf::from(path);
                let extraction = extract_file(&path, text).unwrap().extraction;
                (path, extraction)
            })
            .collect();
        let graph = build_graph(&files, &ModuleContext::default());
        (graph, files)
    }

    fn id(graph: &CodeGraph, file: &str, qname: &str) -> SymbolId {
        graph
            .find_qualified(Path::new(file), qname)
            .unwrap_or_else(|| panic!("{qname} not found in {file}"))
    }

    fn count(graph: &CodeGraph, target: SymbolId, kind: EdgeKind) -> usize {
        graph.incoming(target).iter().filter(|(_, e)| e.kind == kind).count()
    }

    fn resolution(graph: &CodeGraph, file: &str, local: &str) -> ImportResolution {
        graph
            .symbols_in(Path::new(file))
            .iter()
            .filter_map(|&i| graph.symbol(i))
            .find_map(|s| s.kind.as_import().filter(|b| b.local_name == local))
            .map(|b| b.resolution.clone())
            .unwrap()
    }

    #[test]
    fn test_from_import_call() {
        let (graph, _) = build(&[
            ("util.py", "def helper():\n    return 1\n"),
            ("main.py", "from util import helper\n\ndef run():\n    return helper()\n"),
        ]);
        let helper = id(&graph, "util.py", "helper");
        assert_eq!(count(&graph, helper, EdgeKind::Calls), 1);
        assert_eq!(count(&graph, helper, EdgeKind::Imports), 1);
        let call = graph
            .incoming(helper)
            .into_iter()
            .find(|(_, e)| e.kind == EdgeKind::Calls)
            .unwrap();
        let binding = graph.find_qualified(Path::new("main.py"), "helper").unwrap();
        assert_eq!(call.1.via, Some(binding));
        assert_eq!(graph.symbol_of_node(call.0).unwrap().name, "run");
        assert!(graph.all_warnings().is_empty());
    }

    #[test]
    fn test_module_import_and_dotted_import() {
        let (graph, _) = build(&[
            ("lib/__init__.py", ""),
            ("lib/util2.py", "def helper():\n    return 1\n"),
            ("util.py", "def other():\n    pass\n"),
            (
                "main.py",
                "import util\nimport lib.util2\n\nutil.other()\nlib.util2.helper()\n",
            ),
        ]);
        assert_eq!(count(&graph, id(&graph, "util.py", "other"), EdgeKind::Calls), 1);
        assert_eq!(count(&graph, id(&graph, "lib/util2.py", "helper"), EdgeKind::Calls), 1);
        assert_eq!(
            resolution(&graph, "main.py", "lib"),
            ImportResolution::Module(PathBuf::from("lib/util2.py"))
        );
    }

    #[test]
    fn test_js_reexport_chain() {
        let (graph, _) = build(&[
            ("a.js", "export function x() { return 1; }\n"),
            ("b.js", "export { x } from './a';\n"),
            ("c.js", "import { x } from './b';\nx();\n"),
        ]);
        let x = id(&graph, "a.js", "x");
        assert_eq!(count(&graph, x, EdgeKind::Calls), 1);
        match resolution(&graph, "c.js", "x") {
            ImportResolution::Symbol { target, via, direct_file } => {
                assert_eq!(target, x);
                assert_eq!(via.len(), 1);
                assert_eq!(direct_file, PathBuf::from("b.js"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_single_and_tied_providers() {
        let (graph, _) = build(&[
            ("a.py", "def f():\n    pass\n\ndef g():\n    pass\n"),
            ("b.py", "def g():\n    pass\n"),
            ("main.py", "from a import *\nfrom b import *\n\nf()\ng()\n"),
        ]);
        assert_eq!(count(&graph, id(&graph, "a.py", "f"), EdgeKind::Calls), 1);
        let tied: Vec<_> = graph
            .all_warnings()
            .into_iter()
            .filter(|w| matches!(w.kind, WarningKind::Ambiguous { .. }))
            .collect();
        assert_eq!(tied.len(), 1);
        assert_eq!(tied[0].name, "g");
        let edge = graph
            .incoming(id(&graph, "b.py", "g"))
            .into_iter()
            .find(|(_, e)| e.kind == EdgeKind::Calls)
            .unwrap();
        assert_eq!(edge.1.certainty, Certainty::Ambiguous);
    }

    #[test]
    fn test_wildcard_respects_all() {
        let (graph, _) = build(&[
            ("a.py", "__all__ = ['f']\n\ndef f():\n    pass\n\ndef g():\n    pass\n"),
            ("main.py", "from a import *\n\ng()\n"),
        ]);
        assert_eq!(count(&graph, id(&graph, "a.py", "g"), EdgeKind::Calls), 0);
        assert!(graph
            .all_warnings()
            .iter()
            .any(|w| w.name == "g" && w.kind == WarningKind::UndefinedName));
    }

    #[test]
    fn test_missing_name_and_external_module() {
        let (graph, _) = build(&[
            ("util.py", "def helper():\n    pass\n"),
            ("main.py", "import os\nfrom util import nothing\n\nos.getcwd()\n"),
        ]);
        let warnings = graph.all_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            &warnings[0].kind,
            WarningKind::UnresolvedMissing {
                reason: UnresolvedReason::MissingName { .. }
            }
        ));
        // `os` is external but still used.
        let os = graph.find_qualified(Path::new("main.py"), "os").unwrap();
        assert_eq!(count(&graph, os, EdgeKind::References), 1);
    }

    #[test]
    fn test_self_member_through_base() {
        let (graph, _) = build(&[
            (
                "base.py",
                "class Base:\n    def shared(self):\n        pass\n",
            ),
            (
                "child.py",
                "from base import Base\n\nclass Child(Base):\n    def run(self):\n        self.shared()\n        self.missing()\n",
            ),
        ]);
        let base = id(&graph, "base.py", "Base");
        assert_eq!(count(&graph, base, EdgeKind::Inherits), 1);
        assert_eq!(count(&graph, id(&graph, "base.py", "Base.shared"), EdgeKind::Calls), 1);
        let child = graph.symbol(id(&graph, "child.py", "Child")).unwrap();
        assert_eq!(child.kind.as_class().unwrap().base_edges, vec![base]);
        assert!(graph.member_refs[Path::new("child.py")].contains("missing"));
    }

    #[test]
    fn test_conditional_definitions_tie() {
        let (graph, _) = build(&[(
            "a.py",
            "import sys\n\nif sys.argv:\n    def f():\n        return 1\nelse:\n    def f():\n        return 2\n\nf()\n",
        )]);
        let warnings = graph.all_warnings();
        assert!(warnings
            .iter()
            .any(|w| w.name == "f" && matches!(w.kind, WarningKind::Ambiguous { .. })));
        assert_eq!(graph.stats().ambiguous_edges, 2);
    }

    #[test]
    fn test_module_level_nearness() {
        let (graph, files) = build(&[(
            "a.py",
            "def f():\n    return 1\n\nf()\n\ndef f():\n    return 2\n\ndef g():\n    return f()\n",
        )]);
        let ext = &files[Path::new("a.py")];
        let first = graph.symbol_at(Path::new("a.py"), 0).unwrap();
        let second = graph
            .symbols_in(Path::new("a.py"))
            .iter()
            .copied()
            .find(|&s| s != first && graph.symbol(s).unwrap().name == "f")
            .unwrap();
        assert_eq!(ext.symbols[0].name, "f");
        // The module-level call sees the first `f`; the call in `g` sees the last.
        assert_eq!(count(&graph, first, EdgeKind::Calls), 1);
        assert_eq!(count(&graph, second, EdgeKind::Calls), 1);
    }

    #[test]
    fn test_import_cycle_is_unresolved() {
        let (graph, _) = build(&[
            ("a.py", "from b import x\n"),
            ("b.py", "from a import x\n"),
        ]);
        assert_eq!(
            resolution(&graph, "a.py", "x"),
            ImportResolution::Unresolved(UnresolvedReason::Cycle)
        );
    }

    #[test]
    fn test_partial_file_sites_unresolved() {
        let (graph, _) = build(&[
            ("util.py", "def helper():\n    pass\n"),
            ("broken.py", "from util import helper\n\nhelper()\n\ndef bad(:\n    pass\n"),
        ]);
        let helper = id(&graph, "util.py", "helper");
        assert_eq!(count(&graph, helper, EdgeKind::Calls), 0);
        // The import itself still resolves.
        assert_eq!(count(&graph, helper, EdgeKind::Imports), 1);
    }

    #[test]
    fn test_undefined_builtin_and_dynamic() {
        let (graph, _) = build(&[(
            "a.py",
            "def f(name):\n    print(len(name))\n    return undefined_thing\n\nmod = __import__('x')\n",
        )]);
        let warnings = graph.all_warnings();
        assert!(warnings
            .iter()
            .any(|w| w.name == "undefined_thing" && w.kind == WarningKind::UndefinedName));
        assert!(warnings
            .iter()
            .any(|w| matches!(w.kind, WarningKind::UnresolvedDynamic { .. })));
        assert!(!warnings.iter().any(|w| w.name == "print" || w.name == "len"));
    }

    #[test]
    fn test_class_scope_hidden_from_methods() {
        let (graph, _) = build(&[(
            "a.py",
            "class A:\n    limit = 3\n\n    def f(self):\n        return limit\n",
        )]);
        assert!(graph
            .all_warnings()
            .iter()
            .any(|w| w.name == "limit" && w.kind == WarningKind::UndefinedName));
    }

    #[test]
    fn test_commonjs_require_member() {
        let (graph, _) = build(&[
            ("lib.js", "function helper() {}\nmodule.exports = { helper };\n"),
            ("main.js", "const lib = require('./lib');\nlib.helper();\n"),
        ]);
        assert_eq!(count(&graph, id(&graph, "lib.js", "helper"), EdgeKind::Calls), 1);
    }

    #[test]
    fn test_incremental_matches_full_rebuild() {
        let sources = [
            ("util.py", "def helper():\n    pass\n"),
            ("main.py", "from util import helper\n\nhelper()\n"),
        ];
        let (mut graph, mut files) = build(&sources);
        let changed = PathBuf::from("util.py");
        let edited = extract_file(&changed, "def helper():\n    return 2\n\ndef extra():\n    pass\n")
            .unwrap()
            .extraction;
        files.insert(changed.clone(), edited);
        graph.update_files(&[&files[&changed]], &[], &[]);
        let mut targets: Vec<PathBuf> = graph
            .dependents_of(&[changed.clone()].into_iter().collect())
            .into_iter()
            .collect();
        targets.push(changed);
        resolve_files(&mut graph, &files, &targets, &ModuleContext::default());

        let full = build_graph(&files, &ModuleContext::default());
        let a = graph.stats();
        let b = full.stats();
        assert_eq!(a.total_edges, b.total_edges);
        assert_eq!(a.call_edges, b.call_edges);
        assert_eq!(a.import_edges, b.import_edges);
        assert_eq!(count(&graph, id(&graph, "util.py", "helper"), EdgeKind::Calls), 1);
    }
}
