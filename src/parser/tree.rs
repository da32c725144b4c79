//
//  tree.rs
//  Codeweave
//

//! Arena syntax tree shared by every language adapter.
//!
//! tree-sitter trees borrow their source and expose language-specific node
//! APIs; the extractor and the transaction engine work on this owned arena
//! instead, so nothing downstream of the adapter depends on a grammar crate.

use tree_sitter::{Parser, Tree};

use crate::error::{Error, Result};
use crate::graph::types::{ParseDiagnostic, Span};
use crate::parser::SupportedLanguage;

/// Index of a node in a [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: &'static str,
    /// Field name this node occupies in its parent, if any.
    pub field: Option<&'static str>,
    pub named: bool,
    /// ERROR or MISSING node.
    pub error: bool,
    pub missing: bool,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// One step of a preorder [`SyntaxTree::visit`].
#[derive(Debug, Clone, Copy)]
pub struct VisitEntry<'t> {
    pub id: NodeId,
    pub kind: &'static str,
    pub span: Span,
    pub children: &'t [NodeId],
}

/// Owned syntax tree: nodes addressed by index, root at `NodeId(0)`.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
}

/// Result of parsing one file.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Clean(SyntaxTree),
    /// The tree is usable outside the reported regions.
    Partial {
        tree: SyntaxTree,
        diagnostics: Vec<ParseDiagnostic>,
    },
}

impl ParseOutcome {
    pub fn tree(&self) -> &SyntaxTree {
        match self {
            ParseOutcome::Clean(tree) | ParseOutcome::Partial { tree, .. } => tree,
        }
    }

    pub fn into_parts(self) -> (SyntaxTree, Vec<ParseDiagnostic>) {
        match self {
            ParseOutcome::Clean(tree) => (tree, Vec::new()),
            ParseOutcome::Partial { tree, diagnostics } => (tree, diagnostics),
        }
    }
}

/// Parse `text` with a tree-sitter grammar. Fails only when the parser
/// cannot be configured or produces no tree at all.
pub(crate) fn parse_with(lang: SupportedLanguage, text: &str) -> Result<ParseOutcome> {
    let mut parser = Parser::new();
    parser
        .set_language(&lang.tree_sitter_language())
        .map_err(|e| Error::ParserInit {
            language: lang.name().to_string(),
            reason: e.to_string(),
        })?;
    let tree = parser
        .parse(text, None)
        .ok_or_else(|| Error::TreeSitterParseFailed(lang.name().to_string()))?;
    let syntax = SyntaxTree::from_tree_sitter(&tree);
    let diagnostics = syntax.diagnostics();
    if diagnostics.is_empty() {
        Ok(ParseOutcome::Clean(syntax))
    } else {
        Ok(ParseOutcome::Partial {
            tree: syntax,
            diagnostics,
        })
    }
}

impl SyntaxTree {
    /// Copy a tree-sitter tree into the arena with a cursor walk.
    pub fn from_tree_sitter(tree: &Tree) -> Self {
        let mut nodes: Vec<SyntaxNode> = Vec::new();
        let mut cursor = tree.walk();
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            let node = cursor.node();
            let id = NodeId(nodes.len() as u32);
            let start = node.start_position();
            let end = node.end_position();
            nodes.push(SyntaxNode {
                kind: node.kind(),
                field: cursor.field_name(),
                named: node.is_named(),
                error: node.is_error() || node.is_missing(),
                missing: node.is_missing(),
                span: Span::new(node.start_byte(), node.end_byte(), start.row + 1, end.row + 1),
                parent: stack.last().copied(),
                children: Vec::new(),
            });
            if let Some(&parent) = stack.last() {
                nodes[parent.index()].children.push(id);
            }

            if cursor.goto_first_child() {
                stack.push(id);
                continue;
            }
            // Climb until a sibling exists.
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Self { nodes };
                }
                stack.pop();
            }
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &'static str {
        self.node(id).kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn named_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.node(c).named)
    }

    pub fn child_by_field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.node(c).field == Some(field))
    }

    pub fn children_by_field<'a>(
        &'a self,
        id: NodeId,
        field: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.node(c).field == Some(field))
    }

    /// First child of the given kind.
    pub fn child_of_kind(&self, id: NodeId, kind: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.node(c).kind == kind)
    }

    pub fn text<'a>(&self, id: NodeId, source: &'a str) -> &'a str {
        self.span(id).slice(source)
    }

    /// True if any node in the subtree is an ERROR or MISSING node.
    pub fn subtree_has_error(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if self.node(n).error {
                return true;
            }
            stack.extend(self.children(n).iter().copied());
        }
        false
    }

    /// Preorder walk yielding `(kind, span, children)` for every node.
    pub fn visit(&self) -> impl Iterator<Item = VisitEntry<'_>> + '_ {
        let mut stack = if self.nodes.is_empty() {
            Vec::new()
        } else {
            vec![self.root()]
        };
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = self.node(id);
            stack.extend(node.children.iter().rev().copied());
            Some(VisitEntry {
                id,
                kind: node.kind,
                span: node.span,
                children: &node.children,
            })
        })
    }

    /// Preorder walk of one subtree that skips descendants of nodes for
    /// which `prune` returns true (the pruned node itself is not yielded).
    pub fn descendants_pruned<'a, F>(&'a self, id: NodeId, prune: F) -> impl Iterator<Item = NodeId> + 'a
    where
        F: Fn(NodeId) -> bool + 'a,
    {
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        std::iter::from_fn(move || loop {
            let n = stack.pop()?;
            if prune(n) {
                continue;
            }
            stack.extend(self.children(n).iter().rev().copied());
            return Some(n);
        })
    }

    /// ERROR and MISSING nodes as diagnostics. Nested errors are reported once.
    pub fn diagnostics(&self) -> Vec<ParseDiagnostic> {
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.missing {
                out.push(ParseDiagnostic {
                    span: node.span,
                    message: format!("missing `{}`", node.kind),
                });
                continue;
            }
            if node.error {
                out.push(ParseDiagnostic {
                    span: node.span,
                    message: "unexpected syntax".to_string(),
                });
                continue;
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_py(src: &str) -> ParseOutcome {
        parse_with(SupportedLanguage::Python, src).unwrap()
    }

    #[test]
    fn test_clean_parse_builds_arena() {
        let src = "def f(a):\n    return a\n";
        let outcome = parse_py(src);
        assert!(matches!(outcome, ParseOutcome::Clean(_)));
        let tree = outcome.tree();
        assert_eq!(tree.kind(tree.root()), "module");

        let func = tree.named_children(tree.root()).next().unwrap();
        assert_eq!(tree.kind(func), "function_definition");
        let name = tree.child_by_field(func, "name").unwrap();
        assert_eq!(tree.text(name, src), "f");
        assert_eq!(tree.parent(name), Some(func));
        assert_eq!(tree.span(func).start_line, 1);
        assert_eq!(tree.span(func).end_line, 2);
    }

    #[test]
    fn test_visit_is_preorder() {
        let src = "x = 1\n";
        let outcome = parse_py(src);
        let kinds: Vec<&str> = outcome.tree().visit().map(|e| e.kind).collect();
        assert_eq!(kinds[0], "module");
        let assign = kinds.iter().position(|k| *k == "assignment").unwrap();
        let ident = kinds.iter().position(|k| *k == "identifier").unwrap();
        assert!(assign < ident);
    }

    #[test]
    fn test_partial_parse_reports_diagnostics() {
        let src = "def ok():\n    pass\n\ndef broken(:\n    pass\n";
        match parse_py(src) {
            ParseOutcome::Partial { diagnostics, .. } => assert!(!diagnostics.is_empty()),
            ParseOutcome::Clean(_) => panic!("expected a partial parse"),
        }
    }
}
