//
//  mutation.rs
//  Codeweave
//

use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::engine::CodeGraph;
use super::types::*;

/// Identity of a symbol within its file: qualified name, kind, and the
/// occurrence index among symbols sharing both.
type IdentityKey = (String, SymbolKindTag, usize);

fn identity_keys<'s>(symbols: impl Iterator<Item = (&'s str, SymbolKindTag)>) -> Vec<IdentityKey> {
    let mut seen: HashMap<(&str, SymbolKindTag), usize> = HashMap::new();
    symbols
        .map(|(name, tag)| {
            let occurrence = seen.entry((name, tag)).or_default();
            let key = (name.to_string(), tag, *occurrence);
            *occurrence += 1;
            key
        })
        .collect()
}

impl CodeGraph {
    /// Remove a file node with all of its symbols and derived state.
    pub fn remove_file(&mut self, path: &Path) {
        for id in self.file_symbols.remove(path).unwrap_or_default() {
            self.remove_symbol(id);
        }
        if let Some(idx) = self.file_index.remove(path) {
            self.graph.remove_node(idx);
        }
        self.warnings.remove(path);
        self.member_refs.remove(path);
        self.lookup_deps.remove(path);
        self.statement_targets.remove(path);
    }

    fn old_identity_keys(&self, path: &Path) -> HashMap<IdentityKey, SymbolId> {
        let symbols: Vec<&Symbol> = self
            .symbols_in(path)
            .iter()
            .filter_map(|&id| self.symbol(id))
            .collect();
        let keys = identity_keys(symbols.iter().map(|s| (s.qualified_name.as_str(), s.kind.tag())));
        keys.into_iter().zip(symbols.iter().map(|s| s.id)).collect()
    }

    /// Drop incoming `Declares` edges and outgoing derived edges of a node.
    fn detach_symbol_node(&mut self, node: NodeIndex) {
        let stale: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .filter(|e| e.weight().kind == EdgeKind::Declares)
            .map(|e| e.id())
            .chain(
                self.graph
                    .edges_directed(node, Direction::Outgoing)
                    .filter(|e| e.weight().kind.is_derived())
                    .map(|e| e.id()),
            )
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }
    }

    /// Merge fresh extractions into the graph.
    ///
    /// Symbols keep their id when their identity key survives; `hints`
    /// carry ids across files and names. Derived edges of the updated
    /// files are dropped: callers re-run resolution afterwards.
    pub fn update_files(&mut self, extractions: &[&FileExtraction], removed: &[PathBuf], hints: &[IdentityHint]) {
        for path in removed {
            self.remove_file(path);
        }
        let batch: HashSet<&Path> = extractions.iter().map(|e| e.path.as_path()).collect();
        let keys: Vec<Vec<IdentityKey>> = extractions
            .iter()
            .map(|e| identity_keys(e.symbols.iter().map(|s| (s.qualified_name.as_str(), s.kind.tag()))))
            .collect();

        // Phase 1: assign ids. Hints win, then surviving keys, then fresh ids.
        let mut claimed: HashSet<SymbolId> = HashSet::new();
        let mut assigned: Vec<Vec<Option<SymbolId>>> =
            extractions.iter().map(|e| vec![None; e.symbols.len()]).collect();

        for (fi, ext) in extractions.iter().enumerate() {
            for (si, key) in keys[fi].iter().enumerate() {
                let hint = hints.iter().find(|h| {
                    h.file == ext.path && h.qualified_name == key.0 && h.kind == key.1 && key.2 == 0
                });
                let Some(hint) = hint else {
                    continue;
                };
                let owner_in_batch = self
                    .symbol(hint.id)
                    .map_or(true, |s| batch.contains(s.file.as_path()));
                if owner_in_batch && claimed.insert(hint.id) {
                    assigned[fi][si] = Some(hint.id);
                }
            }
        }
        for (fi, ext) in extractions.iter().enumerate() {
            let old = self.old_identity_keys(&ext.path);
            for (si, key) in keys[fi].iter().enumerate() {
                if assigned[fi][si].is_some() {
                    continue;
                }
                if let Some(&id) = old.get(key) {
                    if claimed.insert(id) {
                        assigned[fi][si] = Some(id);
                    }
                }
            }
        }
        let ids: Vec<Vec<SymbolId>> = assigned
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|slot| match slot {
                        Some(id) => id,
                        None => {
                            let id = self.allocate_id();
                            claimed.insert(id);
                            id
                        }
                    })
                    .collect()
            })
            .collect();

        // Phase 2: drop nodes whose identity did not survive.
        let stale: Vec<SymbolId> = extractions
            .iter()
            .flat_map(|e| self.symbols_in(&e.path).to_vec())
            .filter(|id| !claimed.contains(id))
            .collect();
        let dropped = stale.len();
        for id in stale {
            self.remove_symbol(id);
        }

        // Phase 3: upsert symbol nodes and declaration edges.
        for (fi, ext) in extractions.iter().enumerate() {
            let file_node = self.add_file(&ext.path, ext.language, !ext.status.is_clean());
            let outgoing: Vec<_> = self
                .graph
                .edges_directed(file_node, Direction::Outgoing)
                .map(|e| e.id())
                .collect();
            for edge in outgoing {
                self.graph.remove_edge(edge);
            }

            let file_ids = &ids[fi];
            for (si, extracted) in ext.symbols.iter().enumerate() {
                let symbol = Symbol {
                    id: file_ids[si],
                    name: extracted.name.clone(),
                    qualified_name: extracted.qualified_name.clone(),
                    kind: extracted.kind.clone(),
                    file: ext.path.clone(),
                    span: extracted.span,
                    name_span: extracted.name_span,
                    parent: extracted.parent.map(|p| file_ids[p]),
                    attributes: extracted.attributes.clone(),
                    index: si,
                };
                let node = self.upsert_symbol(symbol);
                self.detach_symbol_node(node);
                self.add_edge(file_node, node, EdgeData::new(EdgeKind::Declares));
            }
            self.file_symbols.insert(ext.path.clone(), file_ids.clone());
        }

        debug!(
            files = extractions.len(),
            removed = removed.len(),
            dropped_symbols = dropped,
            "Graph updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract_file;

    fn extract(path: &str, src: &str) -> FileExtraction {
        extract_file(Path::new(path), src).unwrap().extraction
    }

    fn id_of(graph: &CodeGraph, file: &str, qname: &str) -> SymbolId {
        graph.find_qualified(Path::new(file), qname).unwrap()
    }

    #[test]
    fn test_ids_survive_edits() {
        let mut graph = CodeGraph::new();
        let v1 = extract("a.py", "def f():\n    pass\n\ndef g():\n    pass\n");
        graph.update_files(&[&v1], &[], &[]);
        let f = id_of(&graph, "a.py", "f");
        let g = id_of(&graph, "a.py", "g");

        let v2 = extract("a.py", "# header\n\ndef g():\n    return 1\n\ndef f():\n    pass\n\ndef h():\n    pass\n");
        graph.update_files(&[&v2], &[], &[]);
        assert_eq!(id_of(&graph, "a.py", "f"), f);
        assert_eq!(id_of(&graph, "a.py", "g"), g);
        let h = id_of(&graph, "a.py", "h");
        assert!(h != f && h != g);
        assert_eq!(graph.stats().symbol_count, 3);
        assert!(graph.check_invariants(|_| Some(usize::MAX)).is_ok());
    }

    #[test]
    fn test_hint_relocates_symbol() {
        let mut graph = CodeGraph::new();
        let a = extract("a.py", "def helper():\n    pass\n\ndef keep():\n    pass\n");
        let b = extract("b.py", "X = 1\n");
        graph.update_files(&[&a, &b], &[], &[]);
        let helper = id_of(&graph, "a.py", "helper");

        let a2 = extract("a.py", "def keep():\n    pass\n");
        let b2 = extract("b.py", "X = 1\n\n\ndef helper():\n    pass\n");
        let hint = IdentityHint {
            id: helper,
            file: PathBuf::from("b.py"),
            qualified_name: "helper".to_string(),
            kind: SymbolKindTag::Function,
        };
        graph.update_files(&[&a2, &b2], &[], &[hint]);

        assert_eq!(id_of(&graph, "b.py", "helper"), helper);
        assert_eq!(graph.symbol(helper).unwrap().file, PathBuf::from("b.py"));
        assert!(graph.find_qualified(Path::new("a.py"), "helper").is_none());
        assert!(graph.check_invariants(|_| Some(usize::MAX)).is_ok());
    }

    #[test]
    fn test_hint_keeps_id_across_rename() {
        let mut graph = CodeGraph::new();
        let v1 = extract("a.py", "class Old:\n    def run(self):\n        pass\n");
        graph.update_files(&[&v1], &[], &[]);
        let class = id_of(&graph, "a.py", "Old");
        let method = id_of(&graph, "a.py", "Old.run");

        let v2 = extract("a.py", "class New:\n    def run(self):\n        pass\n");
        let hints = vec![
            IdentityHint {
                id: class,
                file: PathBuf::from("a.py"),
                qualified_name: "New".to_string(),
                kind: SymbolKindTag::Class,
            },
            IdentityHint {
                id: method,
                file: PathBuf::from("a.py"),
                qualified_name: "New.run".to_string(),
                kind: SymbolKindTag::Function,
            },
        ];
        graph.update_files(&[&v2], &[], &hints);
        assert_eq!(id_of(&graph, "a.py", "New"), class);
        assert_eq!(id_of(&graph, "a.py", "New.run"), method);
        assert_eq!(graph.symbol(method).unwrap().parent, Some(class));
        assert!(graph.find_by_name("Old").is_empty());
    }

    #[test]
    fn test_remove_file() {
        let mut graph = CodeGraph::new();
        let a = extract("a.py", "def f():\n    pass\n");
        graph.update_files(&[&a], &[], &[]);
        graph.update_files(&[], &[PathBuf::from("a.py")], &[]);
        let stats = graph.stats();
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.symbol_count, 0);
        assert!(graph.find_by_name("f").is_empty());
    }
}
