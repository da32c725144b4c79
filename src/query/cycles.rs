//
//  cycles.rs
//  Codeweave
//

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

use super::types::ImportCycle;
use crate::graph::{CodeGraph, ExtractionSet};

/// File -> imported files, in import statement order. Only statements that
/// run at import time and resolved to another project file count.
fn import_edges(graph: &CodeGraph, files: &dyn ExtractionSet) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut edges: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for (file, targets) in &graph.statement_targets {
        let Some(ext) = files.extraction(file) else {
            continue;
        };
        let out = edges.entry(file.clone()).or_default();
        for (statement, target) in ext.import_statements.iter().zip(targets) {
            let Some(target) = target else {
                continue;
            };
            if statement.top_level && target != file && !out.contains(target) {
                out.push(target.clone());
            }
        }
    }
    edges
}

/// Every strongly connected group of more than one file.
pub fn import_cycles(graph: &CodeGraph, files: &dyn ExtractionSet) -> Vec<ImportCycle> {
    let edges = import_edges(graph, files);

    let mut file_graph: DiGraph<PathBuf, ()> = DiGraph::new();
    let mut nodes: HashMap<PathBuf, NodeIndex> = HashMap::new();
    let mut node = |g: &mut DiGraph<PathBuf, ()>, path: &PathBuf| {
        *nodes.entry(path.clone()).or_insert_with(|| g.add_node(path.clone()))
    };
    for (from, targets) in &edges {
        let a = node(&mut file_graph, from);
        for to in targets {
            let b = node(&mut file_graph, to);
            file_graph.add_edge(a, b, ());
        }
    }

    let mut cycles: Vec<ImportCycle> = tarjan_scc(&file_graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let members: HashSet<PathBuf> = scc.iter().map(|&i| file_graph[i].clone()).collect();
            ImportCycle {
                files: order_members(&members, &edges),
            }
        })
        .collect();
    cycles.sort_by(|a, b| a.files.first().cmp(&b.files.first()));

    debug!(cycles = cycles.len(), "Import cycles detected");
    cycles
}

/// Depth-first from the smallest path, visiting imports in statement order.
fn order_members(members: &HashSet<PathBuf>, edges: &BTreeMap<PathBuf, Vec<PathBuf>>) -> Vec<PathBuf> {
    let Some(start) = members.iter().min().cloned() else {
        return Vec::new();
    };
    let mut order = Vec::with_capacity(members.len());
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(file) = stack.pop() {
        if !seen.insert(file.clone()) {
            continue;
        }
        if let Some(targets) = edges.get(&file) {
            for target in targets.iter().rev() {
                if members.contains(target) && !seen.contains(target) {
                    stack.push(target.clone());
                }
            }
        }
        order.push(file);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, FileExtraction};
    use crate::parser::{extract_file, ModuleContext};

    fn cycles(sources: &[(&str, &str)]) -> Vec<Vec<String>> {
        let files: BTreeMap<PathBuf, FileExtraction> = sources
            .iter()
            .map(|(path, text)| {
                let path = PathBuf::from(path);
                let extraction = extract_file(&path, text).unwrap().extraction;
                (path, extraction)
            })
            .collect();
        let graph = build_graph(&files, &ModuleContext::default());
        import_cycles(&graph, &files)
            .into_iter()
            .map(|c| c.files.iter().map(|f| f.display().to_string()).collect())
            .collect()
    }

    #[test]
    fn test_single_cycle_excludes_tail() {
        let found = cycles(&[
            ("a.py", "import b\n"),
            ("b.py", "import c\n"),
            ("c.py", "import a\n"),
            ("d.py", "import a\n"),
        ]);
        assert_eq!(found, vec![vec!["a.py", "b.py", "c.py"]]);
    }

    #[test]
    fn test_members_follow_statement_order() {
        let found = cycles(&[
            ("a.py", "import c\nimport b\n"),
            ("b.py", "import a\n"),
            ("c.py", "import a\n"),
        ]);
        assert_eq!(found, vec![vec!["a.py", "c.py", "b.py"]]);
    }

    #[test]
    fn test_function_level_imports_break_cycles() {
        let found = cycles(&[
            ("a.py", "import b\n"),
            ("b.py", "def late():\n    import a\n    return a\n"),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_js_cycle() {
        let found = cycles(&[
            ("x.js", "import { y } from './y';\nexport const x = 1;\n"),
            ("y.js", "import { x } from './x';\nexport const y = 2;\n"),
        ]);
        assert_eq!(found, vec![vec!["x.js", "y.js"]]);
    }
}
