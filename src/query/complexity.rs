//
//  complexity.rs
//  Codeweave
//

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::types::{ClassComplexity, ComplexityReport, FileComplexity, FunctionComplexity};
use crate::graph::types::NodeData;
use crate::graph::{CodeGraph, SymbolId, SymbolKind};

pub fn complexity_report(graph: &CodeGraph) -> ComplexityReport {
    let mut functions = Vec::new();
    let mut by_class: BTreeMap<SymbolId, Vec<u32>> = BTreeMap::new();
    let mut by_file: BTreeMap<PathBuf, Vec<u32>> = BTreeMap::new();

    for symbol in graph.graph.node_weights().filter_map(NodeData::as_symbol) {
        let SymbolKind::Function(info) = &symbol.kind else {
            continue;
        };
        functions.push(FunctionComplexity {
            id: symbol.id,
            qualified_name: symbol.qualified_name.clone(),
            file: symbol.file.clone(),
            line: symbol.span.start_line,
            complexity: info.complexity,
        });
        by_file.entry(symbol.file.clone()).or_default().push(info.complexity);
        if let Some(parent) = symbol.parent {
            by_class.entry(parent).or_default().push(info.complexity);
        }
    }
    functions.sort_by(|a, b| {
        b.complexity
            .cmp(&a.complexity)
            .then_with(|| a.file.cmp(&b.file))
            .then(a.line.cmp(&b.line))
    });

    let mut classes: Vec<ClassComplexity> = by_class
        .into_iter()
        .filter_map(|(id, scores)| {
            let class = graph.symbol(id).filter(|s| s.kind.as_class().is_some())?;
            Some(ClassComplexity {
                id,
                qualified_name: class.qualified_name.clone(),
                file: class.file.clone(),
                methods: scores.len(),
                total: scores.iter().sum(),
                max: scores.iter().copied().max().unwrap_or(0),
            })
        })
        .collect();
    classes.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.qualified_name.cmp(&b.qualified_name)));

    let files = by_file
        .into_iter()
        .map(|(file, scores)| {
            let total: u32 = scores.iter().sum();
            FileComplexity {
                file,
                functions: scores.len(),
                total,
                max: scores.iter().copied().max().unwrap_or(0),
                average: f64::from(total) / scores.len() as f64,
            }
        })
        .collect();

    ComplexityReport {
        functions,
        classes,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, FileExtraction};
    use crate::parser::{extract_file, ModuleContext};
    use std::path::Path;

    #[test]
    fn test_report_aggregates() {
        let sources = [
            (
                "a.py",
                "def simple():\n    return 1\n\ndef branchy(x):\n    if x:\n        return 1\n    while x:\n        x -= 1\n    return 0\n\nclass Box:\n    def get(self, k):\n        if k:\n            return k\n        return None\n\n    def put(self):\n        pass\n",
            ),
            ("b.js", "function f(a) { if (a && a.b) { return 1; } return 0; }\n"),
        ];
        let files: BTreeMap<PathBuf, FileExtraction> = sources
            .iter()
            .map(|(path, text)| {
                let path = PathBuf::from(path);
                let extraction = extract_file(&path, text).unwrap().extraction;
                (path, extraction)
            })
            .collect();
        let graph = build_graph(&files, &ModuleContext::default());
        let report = complexity_report(&graph);

        assert_eq!(report.functions.len(), 5);
        assert_eq!(report.functions[0].complexity, 3);
        let branchy = report.functions.iter().find(|f| f.qualified_name == "branchy").unwrap();
        assert_eq!(branchy.complexity, 3);

        assert_eq!(report.classes.len(), 1);
        let class = &report.classes[0];
        assert_eq!(class.qualified_name, "Box");
        assert_eq!(class.methods, 2);
        assert_eq!(class.total, 3);
        assert_eq!(class.max, 2);

        let a = report.files.iter().find(|f| f.file == Path::new("a.py")).unwrap();
        assert_eq!(a.functions, 4);
        assert_eq!(a.total, 7);
        assert!((a.average - 1.75).abs() < f64::EPSILON);
    }
}
