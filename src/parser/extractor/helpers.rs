//
//  helpers.rs
//  Codeweave
//

use std::path::Path;

use crate::graph::types::*;
use crate::parser::tree::{NodeId, SyntaxTree};
use crate::parser::SupportedLanguage;

/// Per-walk context threaded through an extractor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ctx {
    pub scope: ScopeId,
    /// Innermost declared symbol containing the current node.
    pub enclosing: Option<usize>,
    /// Inside a module-level `if`/`try`.
    pub conditional: bool,
}

impl Ctx {
    pub fn module() -> Self {
        Self {
            scope: 0,
            enclosing: None,
            conditional: false,
        }
    }

    pub fn at_module_level(&self) -> bool {
        self.scope == 0
    }

    /// Context for the body of a branch or `try`.
    pub fn in_branch(self) -> Self {
        Self {
            conditional: self.conditional || self.at_module_level(),
            ..self
        }
    }
}

/// Accumulates one file's extraction while an adapter walks the tree.
pub(crate) struct ExtractionBuilder<'a> {
    pub tree: &'a SyntaxTree,
    pub src: &'a str,
    pub out: FileExtraction,
}

impl<'a> ExtractionBuilder<'a> {
    pub fn new(
        path: &Path,
        language: SupportedLanguage,
        tree: &'a SyntaxTree,
        src: &'a str,
        status: ParseStatus,
    ) -> Self {
        let mut out = FileExtraction::empty(path.to_path_buf(), language);
        out.status = status;
        out.text_len = src.len();
        out.scopes.push(Scope {
            kind: ScopeKind::Module,
            parent: None,
            owner: None,
            bindings: Default::default(),
            globals: Default::default(),
        });
        Self { tree, src, out }
    }

    pub fn text(&self, id: NodeId) -> &'a str {
        self.tree.text(id, self.src)
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.tree.span(id)
    }

    pub fn field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.tree.child_by_field(id, field)
    }

    pub fn scope_kind(&self, scope: ScopeId) -> ScopeKind {
        self.out.scopes[scope].kind
    }

    pub fn push_scope(&mut self, kind: ScopeKind, parent: ScopeId, owner: Option<usize>) -> ScopeId {
        self.out.scopes.push(Scope {
            kind,
            parent: Some(parent),
            owner,
            bindings: Default::default(),
            globals: Default::default(),
        });
        self.out.scopes.len() - 1
    }

    pub fn bind(&mut self, scope: ScopeId, name: &str, target: BindingTarget, position: usize) {
        self.out.scopes[scope]
            .bindings
            .entry(name.to_string())
            .or_default()
            .push(LocalBinding { target, position });
    }

    pub fn bind_local(&mut self, scope: ScopeId, id: NodeId) {
        let name = self.text(id).to_string();
        let position = self.span(id).start;
        self.bind(scope, &name, BindingTarget::Local, position);
    }

    pub fn qualified(&self, parent: Option<usize>, name: &str) -> String {
        match parent {
            Some(p) => format!("{}.{}", self.out.symbols[p].qualified_name, name),
            None => name.to_string(),
        }
    }

    /// Add a symbol and bind its name in its scope. Re-exports bind nothing.
    pub fn declare(&mut self, symbol: ExtractedSymbol) -> usize {
        let idx = self.out.symbols.len();
        let bound_name = match &symbol.kind {
            SymbolKind::ImportBinding(b) if b.reexport || b.form == ImportForm::Wildcard => None,
            _ => Some(symbol.name.clone()),
        };
        let scope = symbol.scope;
        let position = symbol.span.start;
        self.out.symbols.push(symbol);
        if let Some(name) = bound_name {
            self.bind(scope, &name, BindingTarget::Symbol(idx), position);
        }
        idx
    }

    pub fn site(&mut self, chain: Vec<(String, Span)>, span: Span, kind: SiteKind, ctx: Ctx) {
        if chain.is_empty() {
            return;
        }
        let (segments, segment_spans) = chain.into_iter().unzip();
        self.out.sites.push(ReferenceSite {
            segments,
            segment_spans,
            span,
            kind,
            scope: ctx.scope,
            enclosing: ctx.enclosing,
        });
    }

    pub fn dynamic(&mut self, span: Span, ctx: Ctx, detail: impl Into<String>) {
        self.out.dynamic_sites.push(DynamicSite {
            span,
            enclosing: ctx.enclosing,
            detail: detail.into(),
        });
    }

    pub fn member(&mut self, name: &str, span: Span) {
        self.out.member_accesses.push(MemberAccess {
            name: name.to_string(),
            span,
        });
    }

    /// Register an import statement and return its index.
    pub fn import_statement(&mut self, span: Span, module: &str, module_span: Option<Span>, ctx: Ctx) -> usize {
        self.out.import_statements.push(ImportStatement {
            span,
            module: module.to_string(),
            module_span,
            bindings: Vec::new(),
            top_level: ctx.scope == 0,
        });
        self.out.import_statements.len() - 1
    }

    pub fn import_binding(&mut self, statement: usize, symbol: ExtractedSymbol) -> usize {
        let idx = self.declare(symbol);
        self.out.import_statements[statement].bindings.push(idx);
        idx
    }

    pub fn finish(self) -> FileExtraction {
        self.out
    }
}

/// Build an import binding symbol.
pub(crate) fn binding_symbol(
    local: &str,
    local_span: Span,
    statement_span: Span,
    binding: ImportBinding,
    ctx: Ctx,
) -> ExtractedSymbol {
    ExtractedSymbol {
        name: local.to_string(),
        qualified_name: local.to_string(),
        kind: SymbolKind::ImportBinding(binding),
        span: statement_span,
        name_span: local_span,
        parent: ctx.enclosing,
        scope: ctx.scope,
        body_scope: None,
        attributes: Attributes {
            conditional: ctx.conditional,
            ..Attributes::default()
        },
    }
}

/// Collect an identifier chain `a.b.c` into `(segment, span)` pairs.
///
/// `member_kind` is the grammar's attribute node, with `object`/`property`
/// field names. Returns `None` when the chain does not bottom out in a plain
/// identifier (or one of `base_kinds`).
pub(crate) fn identifier_chain(
    tree: &SyntaxTree,
    src: &str,
    node: NodeId,
    member_kind: &str,
    object_field: &str,
    property_field: &str,
    base_kinds: &[&str],
) -> Option<Vec<(String, Span)>> {
    let mut rev: Vec<(String, Span)> = Vec::new();
    let mut current = node;
    loop {
        let kind = tree.kind(current);
        if kind == member_kind {
            let prop = tree.child_by_field(current, property_field)?;
            rev.push((tree.text(prop, src).to_string(), tree.span(prop)));
            current = tree.child_by_field(current, object_field)?;
        } else if base_kinds.contains(&kind) {
            rev.push((tree.text(current, src).to_string(), tree.span(current)));
            rev.reverse();
            return Some(rev);
        } else {
            return None;
        }
    }
}

/// Cyclomatic complexity: one plus every branch point in the body,
/// without descending into nested definitions.
pub(crate) fn cyclomatic<'t, B, N>(tree: &'t SyntaxTree, body: NodeId, is_branch: B, is_nested: N) -> u32
where
    B: Fn(NodeId) -> bool,
    N: Fn(NodeId) -> bool + 't,
{
    let mut count = 1;
    for id in tree.descendants_pruned(body, is_nested) {
        if is_branch(id) {
            count += 1;
        }
    }
    count
}

/// Content of a string literal node with its quotes removed.
pub(crate) fn string_content(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let quotes = ["\"\"\"", "'''", "\"", "'", "`"];
    quotes.iter().find_map(|q| {
        trimmed
            .strip_prefix(q)
            .and_then(|s| s.strip_suffix(q))
            .map(str::to_string)
    })
}

/// Offset just past the end of the line containing `offset`.
pub(crate) fn line_end_after(src: &str, offset: usize) -> usize {
    match src.get(offset..).and_then(|rest| rest.find('\n')) {
        Some(pos) => offset + pos + 1,
        None => src.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_content() {
        assert_eq!(string_content("'a'").as_deref(), Some("a"));
        assert_eq!(string_content("\"\"\"doc\"\"\"").as_deref(), Some("doc"));
        assert_eq!(string_content("f\"x\"").as_deref(), Some("x"));
        assert_eq!(string_content("x"), None);
    }

    #[test]
    fn test_line_end_after() {
        let src = "import a\nimport b\n";
        assert_eq!(line_end_after(src, 0), 9);
        assert_eq!(line_end_after(src, 12), src.len());
        assert_eq!(line_end_after("x", 0), 1);
    }
}
