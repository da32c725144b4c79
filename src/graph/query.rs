//
//  query.rs
//  Codeweave
//

use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::collections::HashSet;
use std::path::PathBuf;

use super::engine::CodeGraph;
use super::types::*;

impl CodeGraph {
    /// References, calls and inheritance edges into a symbol, ordered by
    /// file and position.
    pub fn usages(&self, id: SymbolId) -> Vec<Usage> {
        let mut usages: Vec<Usage> = self
            .incoming(id)
            .into_iter()
            .filter(|(_, edge)| edge.kind.is_usage())
            .filter_map(|(source, edge)| self.usage_of(source, edge))
            .collect();
        usages.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.start.cmp(&b.span.start)));
        usages
    }

    fn usage_of(&self, source: NodeIndex, edge: &EdgeData) -> Option<Usage> {
        let site = edge.site.as_ref()?;
        Some(Usage {
            kind: edge.kind,
            file: site.file.clone(),
            span: site.span,
            from: self.symbol_of_node(source).map(|s| s.id),
            via: edge.via,
            resolved_through: edge.via.and_then(|b| self.lookup_file_of(b)),
            certainty: edge.certainty,
        })
    }

    /// Uses of any symbol that went through `binding`.
    pub fn binding_uses(&self, binding: SymbolId) -> Vec<Usage> {
        let mut usages: Vec<Usage> = self
            .graph
            .edge_references()
            .filter(|e| e.weight().kind.is_usage() && e.weight().via == Some(binding))
            .filter_map(|e| self.usage_of(e.source(), e.weight()))
            .collect();
        usages.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.start.cmp(&b.span.start)));
        usages
    }

    /// Import bindings whose name resolved to `id`, directly or through
    /// re-exports, ordered by file and position.
    pub fn importers_of(&self, id: SymbolId) -> Vec<&Symbol> {
        let mut importers: Vec<&Symbol> = self
            .graph
            .node_weights()
            .filter_map(NodeData::as_symbol)
            .filter(|s| {
                matches!(
                    s.kind.as_import().map(|b| &b.resolution),
                    Some(ImportResolution::Symbol { target, .. }) if *target == id
                )
            })
            .collect();
        importers.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.start.cmp(&b.span.start)));
        importers
    }

    /// Usage edges leaving `id` or anything nested in it, as `(target, edge)`.
    pub(crate) fn uses_from(&self, id: SymbolId) -> Vec<(SymbolId, &EdgeData)> {
        let Some(file) = self.symbol(id).map(|s| s.file.clone()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for &member in self.symbols_in(&file) {
            if !self.is_within(member, id) {
                continue;
            }
            let Some(idx) = self.node_of(member) else {
                continue;
            };
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                if !edge.weight().kind.is_usage() {
                    continue;
                }
                if let Some(target) = self.symbol_of_node(edge.target()) {
                    out.push((target.id, edge.weight()));
                }
            }
        }
        out
    }

    /// Only the call edges into a symbol.
    pub fn call_sites(&self, id: SymbolId) -> Vec<Usage> {
        self.usages(id)
            .into_iter()
            .filter(|u| u.kind == EdgeKind::Calls)
            .collect()
    }

    /// Usages whose site lies outside the symbol's own body.
    pub fn external_usages(&self, id: SymbolId) -> Vec<Usage> {
        self.usages(id)
            .into_iter()
            .filter(|u| !u.from.is_some_and(|from| self.is_within(from, id)))
            .collect()
    }

    /// File an import binding looked its name up in.
    pub fn lookup_file_of(&self, binding: SymbolId) -> Option<PathBuf> {
        match &self.symbol(binding)?.kind.as_import()?.resolution {
            ImportResolution::Symbol { direct_file, .. } => Some(direct_file.clone()),
            ImportResolution::Module(path) | ImportResolution::Wildcard(path) => Some(path.clone()),
            _ => None,
        }
    }

    /// Bindings some resolved site went through.
    pub(crate) fn bindings_in_use(&self) -> HashSet<SymbolId> {
        let mut used: HashSet<SymbolId> = self.graph.edge_weights().filter_map(|e| e.via).collect();
        for edge in self.graph.edge_references() {
            if !edge.weight().kind.is_usage() {
                continue;
            }
            if let Some(symbol) = self.symbol_of_node(edge.target()) {
                if symbol.kind.as_import().is_some() {
                    used.insert(symbol.id);
                }
            }
        }
        used
    }

    /// Import bindings nothing resolved through. Re-exports and names listed
    /// as exports are not reported.
    pub fn unused_imports(&self) -> Vec<UnusedImport> {
        let used = self.bindings_in_use();
        let mut unused: Vec<UnusedImport> = self
            .graph
            .node_weights()
            .filter_map(NodeData::as_symbol)
            .filter(|s| !used.contains(&s.id) && !s.attributes.exported)
            .filter_map(|s| {
                let binding = s.kind.as_import()?;
                if binding.reexport {
                    return None;
                }
                Some(UnusedImport {
                    id: s.id,
                    file: s.file.clone(),
                    local_name: binding.local_name.clone(),
                    module: binding.module.clone(),
                    span: binding.clause_span,
                })
            })
            .collect();
        unused.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.start.cmp(&b.span.start)));
        unused
    }
}
