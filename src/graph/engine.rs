//
//  engine.rs
//  Codeweave
//

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::types::*;
use crate::parser::SupportedLanguage;

/// The code graph: file and symbol nodes, declaration edges, and the
/// resolution edges derived from reference sites.
#[derive(Debug, Clone, Default)]
pub struct CodeGraph {
    pub(crate) graph: StableDiGraph<NodeData, EdgeData>,
    /// Index: file path -> file node.
    pub(crate) file_index: HashMap<PathBuf, NodeIndex>,
    /// Index: symbol id -> symbol node.
    pub(crate) symbol_index: HashMap<SymbolId, NodeIndex>,
    /// Index: symbol name -> ids, across all files.
    pub(crate) name_index: HashMap<String, Vec<SymbolId>>,
    /// Per file, ids parallel to the file's extracted symbols.
    pub(crate) file_symbols: HashMap<PathBuf, Vec<SymbolId>>,
    /// Resolution warnings, keyed by the file whose sites produced them.
    pub(crate) warnings: HashMap<PathBuf, Vec<ResolutionWarning>>,
    /// Member names used on receivers the resolver could not name.
    pub(crate) member_refs: HashMap<PathBuf, HashSet<String>>,
    /// Files (existing or not) each file's resolution looked at.
    pub(crate) lookup_deps: HashMap<PathBuf, HashSet<PathBuf>>,
    /// Per file, the module file each import statement resolved to.
    pub(crate) statement_targets: HashMap<PathBuf, Vec<Option<PathBuf>>>,
    pub(crate) next_id: u64,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Node Operations ────────────────────────────────────────

    /// Add (or refresh) a file node. Returns the node index.
    pub fn add_file(&mut self, path: &Path, language: SupportedLanguage, partial: bool) -> NodeIndex {
        if let Some(&idx) = self.file_index.get(path) {
            if let Some(NodeData::File(node)) = self.graph.node_weight_mut(idx) {
                node.language = language;
                node.partial = partial;
            }
            return idx;
        }
        let idx = self.graph.add_node(NodeData::File(FileNode {
            path: path.to_path_buf(),
            language,
            partial,
        }));
        self.file_index.insert(path.to_path_buf(), idx);
        idx
    }

    pub(crate) fn allocate_id(&mut self) -> SymbolId {
        self.next_id += 1;
        SymbolId(self.next_id)
    }

    /// Insert a symbol node, or overwrite the node that already carries
    /// `symbol.id` (which may live in another file).
    pub(crate) fn upsert_symbol(&mut self, symbol: Symbol) -> NodeIndex {
        let id = symbol.id;
        let name = symbol.name.clone();
        match self.symbol_index.get(&id).copied() {
            Some(idx) => {
                if let Some(NodeData::Symbol(old)) = self.graph.node_weight_mut(idx) {
                    if old.name != name {
                        let old_name = std::mem::replace(&mut old.name, name.clone());
                        self.unindex_name(&old_name, id);
                        self.name_index.entry(name).or_default().push(id);
                    }
                }
                if let Some(weight) = self.graph.node_weight_mut(idx) {
                    *weight = NodeData::Symbol(symbol);
                }
                idx
            }
            None => {
                let idx = self.graph.add_node(NodeData::Symbol(symbol));
                self.symbol_index.insert(id, idx);
                self.name_index.entry(name).or_default().push(id);
                if id.0 > self.next_id {
                    self.next_id = id.0;
                }
                idx
            }
        }
    }

    pub(crate) fn remove_symbol(&mut self, id: SymbolId) {
        if let Some(idx) = self.symbol_index.remove(&id) {
            if let Some(NodeData::Symbol(symbol)) = self.graph.remove_node(idx) {
                self.unindex_name(&symbol.name, id);
            }
        }
    }

    fn unindex_name(&mut self, name: &str, id: SymbolId) {
        if let Some(ids) = self.name_index.get_mut(name) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.name_index.remove(name);
            }
        }
    }

    // ─── Edge Operations ────────────────────────────────────────

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, data: EdgeData) {
        self.graph.add_edge(from, to, data);
    }

    /// Drop every derived edge leaving the file node or one of its symbols.
    pub(crate) fn clear_derived_edges(&mut self, file: &Path) {
        let mut sources: Vec<NodeIndex> = self.file_index.get(file).copied().into_iter().collect();
        sources.extend(self.symbols_in(file).iter().filter_map(|id| self.symbol_index.get(id)));
        for source in sources {
            let derived: Vec<_> = self
                .graph
                .edges_directed(source, Direction::Outgoing)
                .filter(|e| e.weight().kind.is_derived())
                .map(|e| e.id())
                .collect();
            for edge in derived {
                self.graph.remove_edge(edge);
            }
        }
    }

    // ─── Lookups ────────────────────────────────────────────────

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbol_index
            .get(&id)
            .and_then(|&idx| self.graph.node_weight(idx))
            .and_then(NodeData::as_symbol)
    }

    pub(crate) fn symbol_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        let idx = *self.symbol_index.get(&id)?;
        self.graph.node_weight_mut(idx).and_then(NodeData::as_symbol_mut)
    }

    pub(crate) fn node_of(&self, id: SymbolId) -> Option<NodeIndex> {
        self.symbol_index.get(&id).copied()
    }

    pub(crate) fn file_node(&self, path: &Path) -> Option<NodeIndex> {
        self.file_index.get(path).copied()
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.file_index.contains_key(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.file_index.keys()
    }

    pub fn file_language(&self, path: &Path) -> Option<SupportedLanguage> {
        match self.graph.node_weight(self.file_node(path)?)? {
            NodeData::File(f) => Some(f.language),
            NodeData::Symbol(_) => None,
        }
    }

    /// Symbol ids of a file, parallel to its extraction.
    pub fn symbols_in(&self, file: &Path) -> &[SymbolId] {
        self.file_symbols.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Id of the `index`-th extracted symbol of `file`.
    pub fn symbol_at(&self, file: &Path, index: usize) -> Option<SymbolId> {
        self.symbols_in(file).get(index).copied()
    }

    /// Look up a symbol by file and qualified name. Import bindings are
    /// only returned when nothing else matches.
    pub fn find_qualified(&self, file: &Path, qualified_name: &str) -> Option<SymbolId> {
        let matches: Vec<&Symbol> = self
            .symbols_in(file)
            .iter()
            .filter_map(|&id| self.symbol(id))
            .filter(|s| s.qualified_name == qualified_name)
            .collect();
        matches
            .iter()
            .rev()
            .find(|s| s.kind.as_import().is_none())
            .or_else(|| matches.last())
            .map(|s| s.id)
    }

    /// All symbols with the given short name, in id order.
    pub fn find_by_name(&self, name: &str) -> Vec<SymbolId> {
        let mut ids = self.name_index.get(name).cloned().unwrap_or_default();
        ids.sort();
        ids
    }

    /// Incoming edges of a symbol as `(source node, edge)`.
    pub(crate) fn incoming(&self, id: SymbolId) -> Vec<(NodeIndex, &EdgeData)> {
        let Some(idx) = self.node_of(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// Symbol a node represents, `None` for file nodes.
    pub(crate) fn symbol_of_node(&self, idx: NodeIndex) -> Option<&Symbol> {
        self.graph.node_weight(idx).and_then(NodeData::as_symbol)
    }

    /// True if `id` is `ancestor` or nested inside it.
    pub fn is_within(&self, id: SymbolId, ancestor: SymbolId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.symbol(c).and_then(|s| s.parent);
        }
        false
    }

    pub fn warnings_for(&self, file: &Path) -> &[ResolutionWarning] {
        self.warnings.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every warning, ordered by file and position.
    pub fn all_warnings(&self) -> Vec<ResolutionWarning> {
        let mut all: Vec<ResolutionWarning> = self.warnings.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.start.cmp(&b.span.start)));
        all
    }

    /// Files whose last resolution consulted any of `changed`.
    pub fn dependents_of(&self, changed: &HashSet<PathBuf>) -> HashSet<PathBuf> {
        self.lookup_deps
            .iter()
            .filter(|(_, deps)| !deps.is_disjoint(changed))
            .map(|(file, _)| file.clone())
            .collect()
    }

    // ─── Statistics and Invariants ──────────────────────────────

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats::default();
        for node in self.graph.node_weights() {
            match node {
                NodeData::File(f) => {
                    stats.file_count += 1;
                    if f.partial {
                        stats.partial_files += 1;
                    }
                }
                NodeData::Symbol(s) if s.kind.as_import().is_some() => stats.import_count += 1,
                NodeData::Symbol(_) => stats.symbol_count += 1,
            }
        }
        for edge in self.graph.edge_weights() {
            stats.total_edges += 1;
            match edge.kind {
                EdgeKind::References => stats.reference_edges += 1,
                EdgeKind::Calls => stats.call_edges += 1,
                EdgeKind::Inherits => stats.inherit_edges += 1,
                EdgeKind::Imports => stats.import_edges += 1,
                EdgeKind::Declares => {}
            }
            if edge.certainty == Certainty::Ambiguous {
                stats.ambiguous_edges += 1;
            }
        }
        stats.warnings = self.warnings.values().map(Vec::len).sum();
        stats
    }

    /// Structural invariants. `text_len` gives each file's current length.
    pub fn check_invariants(&self, text_len: impl Fn(&Path) -> Option<usize>) -> Result<(), String> {
        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                return Err(format!("edge {edge:?} has no endpoints"));
            };
            if self.graph.node_weight(from).is_none() || self.graph.node_weight(to).is_none() {
                return Err(format!("edge {edge:?} points at a missing node"));
            }
            let Some(data) = self.graph.edge_weight(edge) else {
                continue;
            };
            if let Some(site) = &data.site {
                let len = text_len(&site.file)
                    .ok_or_else(|| format!("edge site in unknown file {}", site.file.display()))?;
                if site.span.end > len {
                    return Err(format!(
                        "edge site {}..{} exceeds {} ({} bytes)",
                        site.span.start,
                        site.span.end,
                        site.file.display(),
                        len
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        for (file, ids) in &self.file_symbols {
            for id in ids {
                if !seen.insert(*id) {
                    return Err(format!("{id} listed twice (last in {})", file.display()));
                }
                match self.symbol(*id) {
                    Some(s) if &s.file == file => {}
                    Some(s) => {
                        return Err(format!(
                            "{id} listed under {} but lives in {}",
                            file.display(),
                            s.file.display()
                        ))
                    }
                    None => return Err(format!("{id} has no node")),
                }
            }
        }
        if seen.len() != self.symbol_index.len() {
            return Err(format!(
                "{} symbol nodes but {} listed in files",
                self.symbol_index.len(),
                seen.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(id: u64, name: &str, file: &str) -> Symbol {
        Symbol {
            id: SymbolId(id),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function(FunctionInfo::default()),
            file: PathBuf::from(file),
            span: Span::new(0, 10, 1, 2),
            name_span: Span::new(4, 5, 1, 1),
            parent: None,
            attributes: Attributes::default(),
            index: 0,
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = CodeGraph::new();
        let stats = graph.stats();
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.total_edges, 0);
        assert!(graph.check_invariants(|_| None).is_ok());
    }

    #[test]
    fn test_add_file_and_symbol() {
        let mut graph = CodeGraph::new();
        let file = graph.add_file(Path::new("a.py"), SupportedLanguage::Python, false);
        let node = graph.upsert_symbol(symbol(1, "f", "a.py"));
        graph.file_symbols.insert(PathBuf::from("a.py"), vec![SymbolId(1)]);
        graph.add_edge(file, node, EdgeData::new(EdgeKind::Declares));

        let stats = graph.stats();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.symbol_count, 1);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(graph.find_by_name("f"), vec![SymbolId(1)]);
        assert_eq!(graph.find_qualified(Path::new("a.py"), "f"), Some(SymbolId(1)));
        assert!(graph.check_invariants(|_| Some(10)).is_ok());
    }

    #[test]
    fn test_upsert_renames_index() {
        let mut graph = CodeGraph::new();
        graph.upsert_symbol(symbol(7, "old", "a.py"));
        graph.upsert_symbol(symbol(7, "new", "b.py"));
        assert!(graph.find_by_name("old").is_empty());
        assert_eq!(graph.find_by_name("new"), vec![SymbolId(7)]);
        assert_eq!(graph.symbol(SymbolId(7)).unwrap().file, PathBuf::from("b.py"));
        assert_eq!(graph.allocate_id(), SymbolId(8));
    }

    #[test]
    fn test_clear_derived_edges_keeps_declares() {
        let mut graph = CodeGraph::new();
        let file = graph.add_file(Path::new("a.py"), SupportedLanguage::Python, false);
        let f = graph.upsert_symbol(symbol(1, "f", "a.py"));
        let g = graph.upsert_symbol(symbol(2, "g", "a.py"));
        graph.file_symbols.insert(PathBuf::from("a.py"), vec![SymbolId(1), SymbolId(2)]);
        graph.add_edge(file, f, EdgeData::new(EdgeKind::Declares));
        graph.add_edge(file, g, EdgeData::new(EdgeKind::Declares));
        graph.add_edge(f, g, EdgeData::new(EdgeKind::Calls));

        graph.clear_derived_edges(Path::new("a.py"));
        let stats = graph.stats();
        assert_eq!(stats.total_edges, 2);
        assert_eq!(stats.call_edges, 0);
    }

    #[test]
    fn test_invariant_rejects_site_past_end() {
        let mut graph = CodeGraph::new();
        let file = graph.add_file(Path::new("a.py"), SupportedLanguage::Python, false);
        let f = graph.upsert_symbol(symbol(1, "f", "a.py"));
        graph.file_symbols.insert(PathBuf::from("a.py"), vec![SymbolId(1)]);
        let site = SiteRef {
            file: PathBuf::from("a.py"),
            index: 0,
            segment: 0,
            span: Span::new(20, 25, 3, 3),
        };
        graph.add_edge(file, f, EdgeData::at_site(EdgeKind::References, site));
        assert!(graph.check_invariants(|_| Some(10)).is_err());
    }
}
