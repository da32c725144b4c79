//! Python-specific symbol extraction.

use std::path::Path;

use super::helpers::{
    binding_symbol, cyclomatic, identifier_chain, line_end_after, string_content, Ctx,
    ExtractionBuilder,
};
use crate::graph::types::*;
use crate::parser::tree::{NodeId, SyntaxTree};
use crate::parser::SupportedLanguage;

const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "conditional_expression",
    "boolean_operator",
    "for_in_clause",
    "if_clause",
    "case_clause",
];

const NESTED_KINDS: &[&str] = &[
    "function_definition",
    "class_definition",
    "decorated_definition",
    "lambda",
];

const DYNAMIC_CALLS: &[&str] = &[
    "__import__",
    "eval",
    "exec",
    "import_module",
    "importlib.import_module",
];

const COMPUTED_ACCESS: &[&str] = &["getattr", "setattr", "hasattr", "delattr"];

pub(crate) fn extract(
    path: &Path,
    tree: &SyntaxTree,
    src: &str,
    status: ParseStatus,
) -> FileExtraction {
    let mut walker = Walker {
        b: ExtractionBuilder::new(path, SupportedLanguage::Python, tree, src, status),
    };
    walker.b.out.exports_all_names = true;
    walker.block(tree.root(), Ctx::module());
    walker.b.out.import_insertion = import_insertion(tree, src);
    walker.apply_export_list();
    walker.b.finish()
}

fn is_private(name: &str) -> bool {
    name.starts_with('_') && !(name.starts_with("__") && name.ends_with("__"))
}

fn visibility(name: &str) -> Visibility {
    if is_private(name) {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

struct Walker<'a> {
    b: ExtractionBuilder<'a>,
}

impl<'a> Walker<'a> {
    fn block(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        for child in tree.named_children(id) {
            self.visit(child, ctx);
        }
    }

    fn visit(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let node = tree.node(id);
        if node.error {
            return;
        }
        match node.kind {
            "comment" | "future_import_statement" | "pass_statement" | "break_statement"
            | "continue_statement" | "ellipsis" | "integer" | "float" | "true" | "false"
            | "none" | "dotted_name" => {}
            "string" => {
                for part in tree.named_children(id) {
                    if tree.kind(part) == "interpolation" {
                        self.block(part, ctx);
                    }
                }
            }
            "decorated_definition" => self.decorated(id, ctx),
            "function_definition" => {
                self.function(id, id, Vec::new(), ctx);
            }
            "class_definition" => {
                self.class(id, id, Vec::new(), ctx);
            }
            "import_statement" => self.import(id, ctx),
            "import_from_statement" => self.import_from(id, ctx),
            "expression_statement" => self.expression_statement(id, ctx),
            "assignment" | "augmented_assignment" => self.assignment(id, id, ctx),
            "global_statement" | "nonlocal_statement" => {
                let names: Vec<String> = tree
                    .named_children(id)
                    .filter(|&c| tree.kind(c) == "identifier")
                    .map(|c| self.b.text(c).to_string())
                    .collect();
                self.b.out.scopes[ctx.scope].globals.extend(names);
            }
            "if_statement" => {
                if ctx.at_module_level() {
                    let guard = self
                        .b
                        .field(id, "condition")
                        .map(|c| self.b.text(c))
                        .is_some_and(|t| t.contains("__name__") && t.contains("__main__"));
                    if guard {
                        self.b.out.has_main_guard = true;
                    }
                }
                self.block(id, ctx.in_branch());
            }
            "try_statement" => self.block(id, ctx.in_branch()),
            "for_statement" => {
                if ctx.at_module_level() {
                    self.b.out.has_module_code = true;
                }
                let inner = ctx.in_branch();
                for child in tree.named_children(id) {
                    if tree.node(child).field == Some("left") {
                        self.bind_targets(child, inner);
                    } else {
                        self.visit(child, inner);
                    }
                }
            }
            "while_statement" | "with_statement" => {
                if ctx.at_module_level() {
                    self.b.out.has_module_code = true;
                }
                self.block(id, ctx.in_branch());
            }
            "as_pattern" => {
                for child in tree.named_children(id) {
                    if tree.node(child).field == Some("alias") {
                        self.bind_targets(child, ctx);
                    } else {
                        self.visit(child, ctx);
                    }
                }
            }
            "as_pattern_target" => self.bind_targets(id, ctx),
            "except_clause" => {
                let mut after_as = false;
                for &child in tree.children(id) {
                    let kind = tree.kind(child);
                    if kind == "as" {
                        after_as = true;
                        continue;
                    }
                    if !tree.node(child).named {
                        continue;
                    }
                    if after_as && kind == "identifier" {
                        self.b.bind_local(ctx.scope, child);
                        after_as = false;
                    } else {
                        self.visit(child, ctx);
                    }
                }
            }
            "list_comprehension" | "set_comprehension" | "dictionary_comprehension"
            | "generator_expression" => self.comprehension(id, ctx),
            "lambda" => self.lambda(id, ctx),
            "named_expression" => {
                if let Some(value) = self.b.field(id, "value") {
                    self.visit(value, ctx);
                }
                if let Some(name) = self.b.field(id, "name") {
                    self.b.bind_local(ctx.scope, name);
                }
            }
            "keyword_argument" => {
                if let Some(value) = self.b.field(id, "value") {
                    self.visit(value, ctx);
                }
            }
            "call" => self.call(id, ctx),
            "attribute" => self.reference(id, ctx, SiteKind::Reference),
            "identifier" => self.reference(id, ctx, SiteKind::Reference),
            _ => self.block(id, ctx),
        }
    }

    // ─── Declarations ───────────────────────────────────────────

    fn decorated(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let mut decorators = Vec::new();
        for child in tree.named_children(id) {
            if tree.kind(child) != "decorator" {
                continue;
            }
            decorators.push(self.b.text(child).trim_start_matches('@').trim().to_string());
            for expr in tree.named_children(child) {
                match tree.kind(expr) {
                    "identifier" | "attribute" => self.reference(expr, ctx, SiteKind::Decorator),
                    _ => self.visit(expr, ctx),
                }
            }
        }
        let Some(def) = self.b.field(id, "definition") else {
            return;
        };
        match tree.kind(def) {
            "function_definition" => {
                self.function(def, id, decorators, ctx);
            }
            "class_definition" => {
                self.class(def, id, decorators, ctx);
            }
            _ => {}
        }
    }

    fn function(&mut self, def: NodeId, outer: NodeId, decorators: Vec<String>, ctx: Ctx) -> Option<usize> {
        let tree = self.b.tree;
        let name_node = self.b.field(def, "name")?;
        let name = self.b.text(name_node).to_string();
        let params_node = self.b.field(def, "parameters");
        let body = self.b.field(def, "body");

        let params = params_node
            .map(|p| {
                tree.named_children(p)
                    .filter_map(|c| self.param_name(c))
                    .map(|n| self.b.text(n).to_string())
                    .collect()
            })
            .unwrap_or_default();
        let complexity = body
            .map(|b| {
                cyclomatic(
                    tree,
                    b,
                    |n| BRANCH_KINDS.contains(&tree.kind(n)),
                    move |n| NESTED_KINDS.contains(&tree.kind(n)),
                )
            })
            .unwrap_or(1);

        let idx = self.b.declare(ExtractedSymbol {
            qualified_name: self.b.qualified(ctx.enclosing, &name),
            kind: SymbolKind::Function(FunctionInfo {
                params,
                is_async: tree.children(def).iter().any(|&c| tree.kind(c) == "async"),
                is_method: self.b.scope_kind(ctx.scope) == ScopeKind::Class,
                complexity,
            }),
            span: self.b.span(outer),
            name_span: self.b.span(name_node),
            parent: ctx.enclosing,
            scope: ctx.scope,
            body_scope: None,
            attributes: Attributes {
                decorators,
                visibility: visibility(&name),
                exported: false,
                conditional: ctx.conditional,
            },
            name,
        });

        let body_scope = self.b.push_scope(ScopeKind::Function, ctx.scope, Some(idx));
        self.b.out.symbols[idx].body_scope = Some(body_scope);

        if let Some(p) = params_node {
            self.parameters(p, body_scope, ctx);
        }
        if let Some(ret) = self.b.field(def, "return_type") {
            self.visit(ret, ctx);
        }
        if let Some(body) = body {
            self.block(
                body,
                Ctx {
                    scope: body_scope,
                    enclosing: Some(idx),
                    conditional: false,
                },
            );
        }
        Some(idx)
    }

    fn param_name(&self, param: NodeId) -> Option<NodeId> {
        let tree = self.b.tree;
        match tree.kind(param) {
            "identifier" => Some(param),
            "default_parameter" | "typed_default_parameter" => self.b.field(param, "name"),
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => tree
                .named_children(param)
                .find_map(|c| match tree.kind(c) {
                    "identifier" => Some(c),
                    "list_splat_pattern" | "dictionary_splat_pattern" => self.param_name(c),
                    _ => None,
                }),
            _ => None,
        }
    }

    /// Bind parameters in the body scope; defaults and annotations are
    /// evaluated in the enclosing scope.
    fn parameters(&mut self, params: NodeId, body_scope: ScopeId, outer: Ctx) {
        let tree = self.b.tree;
        for param in tree.named_children(params) {
            if let Some(name) = self.param_name(param) {
                self.b.bind_local(body_scope, name);
            } else if tree.kind(param) == "tuple_pattern" {
                self.bind_targets(
                    param,
                    Ctx {
                        scope: body_scope,
                        ..outer
                    },
                );
            }
            for field in ["type", "value"] {
                if let Some(expr) = self.b.field(param, field) {
                    self.visit(expr, outer);
                }
            }
        }
    }

    fn class(&mut self, def: NodeId, outer: NodeId, decorators: Vec<String>, ctx: Ctx) -> Option<usize> {
        let tree = self.b.tree;
        let name_node = self.b.field(def, "name")?;
        let name = self.b.text(name_node).to_string();

        let superclasses = self.b.field(def, "superclasses");
        let bases: Vec<String> = superclasses
            .map(|args| {
                tree.named_children(args)
                    .filter(|&a| tree.kind(a) != "keyword_argument")
                    .map(|a| self.b.text(a).to_string())
                    .collect()
            })
            .unwrap_or_default();

        let idx = self.b.declare(ExtractedSymbol {
            qualified_name: self.b.qualified(ctx.enclosing, &name),
            kind: SymbolKind::Class(ClassInfo {
                bases,
                base_edges: Vec::new(),
            }),
            span: self.b.span(outer),
            name_span: self.b.span(name_node),
            parent: ctx.enclosing,
            scope: ctx.scope,
            body_scope: None,
            attributes: Attributes {
                decorators,
                visibility: visibility(&name),
                exported: false,
                conditional: ctx.conditional,
            },
            name,
        });
        // Base expressions evaluate in the enclosing scope but belong to the class.
        if let Some(args) = superclasses {
            let heritage = Ctx {
                enclosing: Some(idx),
                ..ctx
            };
            for arg in tree.named_children(args) {
                match tree.kind(arg) {
                    "keyword_argument" => {
                        if let Some(value) = self.b.field(arg, "value") {
                            self.visit(value, heritage);
                        }
                    }
                    "identifier" | "attribute" => self.reference(arg, heritage, SiteKind::Inherit),
                    _ => self.visit(arg, heritage),
                }
            }
        }

        let body_scope = self.b.push_scope(ScopeKind::Class, ctx.scope, Some(idx));
        self.b.out.symbols[idx].body_scope = Some(body_scope);

        if let Some(body) = self.b.field(def, "body") {
            self.block(
                body,
                Ctx {
                    scope: body_scope,
                    enclosing: Some(idx),
                    conditional: false,
                },
            );
        }
        Some(idx)
    }

    fn expression_statement(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        for child in tree.named_children(id) {
            match tree.kind(child) {
                "assignment" | "augmented_assignment" => self.assignment(id, child, ctx),
                // Docstrings and bare literals.
                "string" | "concatenated_string" => {}
                _ => {
                    if ctx.at_module_level() {
                        self.b.out.has_module_code = true;
                    }
                    self.visit(child, ctx);
                }
            }
        }
    }

    fn assignment(&mut self, stmt: NodeId, node: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let left = self.b.field(node, "left");
        let right = self.b.field(node, "right");

        if let Some(ty) = self.b.field(node, "type") {
            self.visit(ty, ctx);
        }
        if let Some(r) = right {
            if tree.kind(r) == "assignment" {
                self.assignment(stmt, r, ctx);
            } else {
                self.visit(r, ctx);
            }
        }
        let Some(l) = left else {
            return;
        };

        if tree.kind(node) == "augmented_assignment" {
            // `x += 1` reads x before writing it.
            self.visit(l, ctx);
            return;
        }

        if ctx.at_module_level() && self.b.text(l) == "__all__" {
            if let Some(r) = right {
                self.collect_export_list(r);
            }
        }

        match self.b.scope_kind(ctx.scope) {
            ScopeKind::Module | ScopeKind::Class => self.declare_targets(stmt, l, ctx),
            ScopeKind::Function => self.bind_targets(l, ctx),
        }
    }

    /// Module- and class-level assignment targets become Variable symbols.
    fn declare_targets(&mut self, stmt: NodeId, target: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        match tree.kind(target) {
            "identifier" => {
                let name = self.b.text(target).to_string();
                self.b.declare(ExtractedSymbol {
                    qualified_name: self.b.qualified(ctx.enclosing, &name),
                    kind: SymbolKind::Variable(VariableInfo {
                        is_constant: is_constant_name(&name),
                    }),
                    span: self.b.span(stmt),
                    name_span: self.b.span(target),
                    parent: ctx.enclosing,
                    scope: ctx.scope,
                    body_scope: None,
                    attributes: Attributes {
                        visibility: visibility(&name),
                        conditional: ctx.conditional,
                        ..Attributes::default()
                    },
                    name,
                });
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "expression_list" | "list_splat_pattern" | "parenthesized_expression" => {
                for child in tree.named_children(target) {
                    self.declare_targets(stmt, child, ctx);
                }
            }
            _ => self.visit_target_object(target, ctx),
        }
    }

    /// Function-level assignment targets become plain locals.
    fn bind_targets(&mut self, target: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        match tree.kind(target) {
            "identifier" => {
                let name = self.b.text(target);
                if !self.b.out.scopes[ctx.scope].globals.contains(name) {
                    self.b.bind_local(ctx.scope, target);
                }
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "expression_list" | "list_splat_pattern" | "parenthesized_expression"
            | "as_pattern_target" => {
                for child in tree.named_children(target) {
                    self.bind_targets(child, ctx);
                }
            }
            _ => self.visit_target_object(target, ctx),
        }
    }

    /// `obj.attr = ...` / `obj[k] = ...` read `obj` (and `k`).
    fn visit_target_object(&mut self, target: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        match tree.kind(target) {
            "attribute" => {
                if let Some(obj) = self.b.field(target, "object") {
                    self.visit(obj, ctx);
                }
            }
            "subscript" => self.block(target, ctx),
            _ => {}
        }
    }

    fn collect_export_list(&mut self, value: NodeId) {
        let tree = self.b.tree;
        if !matches!(tree.kind(value), "list" | "tuple") {
            return;
        }
        let mut entries = Vec::new();
        for item in tree.named_children(value) {
            if tree.kind(item) != "string" {
                continue;
            }
            let span = tree
                .child_of_kind(item, "string_content")
                .map(|c| tree.span(c))
                .unwrap_or_else(|| tree.span(item));
            if let Some(name) = string_content(self.b.text(item)) {
                entries.push((name, span));
            }
        }
        self.b.out.export_list = Some(entries);
    }

    fn apply_export_list(&mut self) {
        let Some(list) = self.b.out.export_list.clone() else {
            return;
        };
        for symbol in self.b.out.symbols.iter_mut() {
            if symbol.scope == 0 && list.iter().any(|(n, _)| *n == symbol.name) {
                symbol.attributes.exported = true;
            }
        }
    }

    // ─── Scoped expressions ─────────────────────────────────────

    fn comprehension(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let scope = self.b.push_scope(ScopeKind::Function, ctx.scope, None);
        let inner = Ctx { scope, ..ctx };
        for clause in tree.named_children(id) {
            if tree.kind(clause) == "for_in_clause" {
                if let Some(left) = self.b.field(clause, "left") {
                    self.bind_targets(left, inner);
                }
            }
        }
        for child in tree.named_children(id) {
            if tree.kind(child) == "for_in_clause" {
                for part in tree.named_children(child) {
                    if tree.node(part).field != Some("left") {
                        self.visit(part, inner);
                    }
                }
            } else {
                self.visit(child, inner);
            }
        }
    }

    fn lambda(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let scope = self.b.push_scope(ScopeKind::Function, ctx.scope, None);
        if let Some(params) = self.b.field(id, "parameters") {
            for param in tree.named_children(params) {
                if let Some(name) = self.param_name(param) {
                    self.b.bind_local(scope, name);
                }
                if let Some(value) = self.b.field(param, "value") {
                    self.visit(value, ctx);
                }
            }
        }
        if let Some(body) = self.b.field(id, "body") {
            self.visit(body, Ctx { scope, ..ctx });
        }
    }

    // ─── References ─────────────────────────────────────────────

    fn reference(&mut self, id: NodeId, ctx: Ctx, kind: SiteKind) {
        let tree = self.b.tree;
        let chain = identifier_chain(
            tree,
            self.b.src,
            id,
            "attribute",
            "object",
            "attribute",
            &["identifier"],
        );
        match chain {
            Some(chain) => self.b.site(chain, tree.span(id), kind, ctx),
            None => {
                // `f().x`, `a[0].x`: visit the receiver, remember the member name.
                if let Some(obj) = self.b.field(id, "object") {
                    self.visit(obj, ctx);
                }
                if let Some(attr) = self.b.field(id, "attribute") {
                    let name = self.b.text(attr).to_string();
                    self.b.member(&name, tree.span(attr));
                }
            }
        }
    }

    fn call(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        if ctx.at_module_level() {
            self.b.out.has_module_code = true;
        }
        let func = self.b.field(id, "function");
        let args = self.b.field(id, "arguments");

        if let Some(f) = func {
            let callee = self.b.text(f);
            if DYNAMIC_CALLS.contains(&callee) {
                self.b.dynamic(tree.span(id), ctx, format!("{callee}(...)"));
            }
            match tree.kind(f) {
                "identifier" | "attribute" => self.reference(f, ctx, SiteKind::Call),
                _ => self.visit(f, ctx),
            }
            if COMPUTED_ACCESS.contains(&callee) {
                if let Some(a) = args {
                    self.computed_access(a, ctx);
                    return;
                }
            }
        }
        if let Some(a) = args {
            self.visit(a, ctx);
        }
    }

    /// `getattr(base, name, ...)`: a literal name is an ordinary member
    /// reference; anything else is a computed access on `base`.
    fn computed_access(&mut self, args: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let positional: Vec<NodeId> = tree.named_children(args).collect();
        let [base, name, rest @ ..] = positional.as_slice() else {
            self.visit(args, ctx);
            return;
        };
        let chain = identifier_chain(
            tree,
            self.b.src,
            *base,
            "attribute",
            "object",
            "attribute",
            &["identifier"],
        );
        let literal = (tree.kind(*name) == "string")
            .then(|| string_content(self.b.text(*name)))
            .flatten();

        match (chain, literal) {
            (Some(mut chain), Some(member)) => {
                let span = tree
                    .child_of_kind(*name, "string_content")
                    .map(|c| tree.span(c))
                    .unwrap_or_else(|| tree.span(*name));
                self.b.member(&member, span);
                chain.push((member, span));
                self.b.site(chain, tree.span(args), SiteKind::Reference, ctx);
            }
            (Some(chain), None) => {
                self.b.site(chain, tree.span(*base), SiteKind::Computed, ctx);
                self.visit(*name, ctx);
            }
            (None, _) => {
                self.visit(*base, ctx);
                self.visit(*name, ctx);
            }
        }
        for extra in rest {
            self.visit(*extra, ctx);
        }
    }

    // ─── Imports ────────────────────────────────────────────────

    fn import(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let statement_span = tree.span(id);
        let names: Vec<NodeId> = tree.children_by_field(id, "name").collect();

        let module_of = |n: NodeId| -> Option<NodeId> {
            if tree.kind(n) == "aliased_import" {
                tree.child_by_field(n, "name")
            } else {
                Some(n)
            }
        };
        let (module, module_span) = match names.as_slice() {
            [only] => module_of(*only)
                .map(|m| (self.b.text(m).to_string(), Some(tree.span(m))))
                .unwrap_or_default(),
            [first, ..] => (
                module_of(*first)
                    .map(|m| self.b.text(m).to_string())
                    .unwrap_or_default(),
                None,
            ),
            [] => return,
        };
        let stmt = self.b.import_statement(statement_span, &module, module_span, ctx);

        for clause in names {
            let Some(module_node) = module_of(clause) else {
                continue;
            };
            let alias = (tree.kind(clause) == "aliased_import")
                .then(|| tree.child_by_field(clause, "alias"))
                .flatten();
            let local_node = match alias {
                Some(a) => a,
                None => tree.named_children(module_node).next().unwrap_or(module_node),
            };
            let local = self.b.text(local_node).to_string();
            let binding = ImportBinding {
                module: self.b.text(module_node).to_string(),
                imported: None,
                local_name: local.clone(),
                alias: alias.map(|a| self.b.text(a).to_string()),
                form: ImportForm::Module,
                reexport: false,
                statement: stmt,
                clause_span: tree.span(clause),
                imported_span: None,
                resolution: ImportResolution::Pending,
            };
            let symbol = binding_symbol(&local, tree.span(local_node), statement_span, binding, ctx);
            self.b.import_binding(stmt, symbol);
        }
    }

    fn import_from(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let statement_span = tree.span(id);
        let module_node = self.b.field(id, "module_name");
        let module: String = module_node
            .map(|m| self.b.text(m).split_whitespace().collect())
            .unwrap_or_default();
        let module_span = module_node.map(|m| tree.span(m));
        let stmt = self.b.import_statement(statement_span, &module, module_span, ctx);

        if let Some(wildcard) = tree.child_of_kind(id, "wildcard_import") {
            let binding = ImportBinding {
                module: module.clone(),
                imported: None,
                local_name: "*".to_string(),
                alias: None,
                form: ImportForm::Wildcard,
                reexport: false,
                statement: stmt,
                clause_span: tree.span(wildcard),
                imported_span: None,
                resolution: ImportResolution::Pending,
            };
            let symbol = binding_symbol("*", tree.span(wildcard), statement_span, binding, ctx);
            self.b.import_binding(stmt, symbol);
            return;
        }

        let clauses: Vec<NodeId> = tree.children_by_field(id, "name").collect();
        for clause in clauses {
            let (name_node, alias) = if tree.kind(clause) == "aliased_import" {
                match tree.child_by_field(clause, "name") {
                    Some(n) => (n, tree.child_by_field(clause, "alias")),
                    None => continue,
                }
            } else {
                (clause, None)
            };
            let imported = self.b.text(name_node).to_string();
            let local_node = alias.unwrap_or(name_node);
            let local = self.b.text(local_node).to_string();
            let binding = ImportBinding {
                module: module.clone(),
                imported: Some(imported),
                local_name: local.clone(),
                alias: alias.map(|a| self.b.text(a).to_string()),
                form: ImportForm::Named,
                reexport: false,
                statement: stmt,
                clause_span: tree.span(clause),
                imported_span: Some(tree.span(name_node)),
                resolution: ImportResolution::Pending,
            };
            let symbol = binding_symbol(&local, tree.span(local_node), statement_span, binding, ctx);
            self.b.import_binding(stmt, symbol);
        }
    }
}

/// Where new imports go: after the leading import block, else after the
/// header comments and module docstring.
fn import_insertion(tree: &SyntaxTree, src: &str) -> usize {
    let mut header_end = 0;
    let mut import_end = None;
    let mut seen_statement = false;
    for child in tree.named_children(tree.root()) {
        let span = tree.span(child);
        match tree.kind(child) {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                import_end = Some(line_end_after(src, span.end));
            }
            "comment" if !seen_statement && import_end.is_none() => {
                header_end = line_end_after(src, span.end);
            }
            "expression_statement" if !seen_statement => {
                let docstring = tree
                    .named_children(child)
                    .next()
                    .is_some_and(|c| tree.kind(c) == "string");
                if docstring {
                    header_end = line_end_after(src, span.end);
                }
            }
            "function_definition" | "class_definition" | "decorated_definition" => break,
            _ => {}
        }
        if tree.kind(child) != "comment" {
            seen_statement = true;
        }
    }
    import_end.unwrap_or(header_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract_file;

    fn extract_py(src: &str) -> FileExtraction {
        extract_file(Path::new("m.py"), src).unwrap().extraction
    }

    fn names(ext: &FileExtraction) -> Vec<&str> {
        ext.symbols.iter().map(|s| s.qualified_name.as_str()).collect()
    }

    #[test]
    fn test_functions_classes_variables() {
        let ext = extract_py(
            "MAX = 3\n\nclass Greeter(Base):\n    greeting = 'hi'\n\n    def greet(self, name):\n        return name\n\ndef helper(a, b=MAX, *args, **kw):\n    pass\n",
        );
        assert_eq!(
            names(&ext),
            vec!["MAX", "Greeter", "Greeter.greeting", "Greeter.greet", "helper"]
        );

        let helper = &ext.symbols[4];
        let info = helper.kind.as_function().unwrap();
        assert_eq!(info.params, vec!["a", "b", "args", "kw"]);
        assert!(!info.is_method);

        let greet = &ext.symbols[3];
        assert!(greet.kind.as_function().unwrap().is_method);
        assert_eq!(greet.parent, Some(1));

        let class = ext.symbols[1].kind.as_class().unwrap();
        assert_eq!(class.bases, vec!["Base"]);
        assert!(ext
            .sites
            .iter()
            .any(|s| s.kind == SiteKind::Inherit && s.segments == vec!["Base"]));
        assert!(matches!(ext.symbols[0].kind, SymbolKind::Variable(VariableInfo { is_constant: true })));
    }

    #[test]
    fn test_decorators_recorded() {
        let ext = extract_py("@app.route('/x')\ndef index():\n    pass\n\n@property\ndef p(self):\n    pass\n");
        assert_eq!(ext.symbols[0].attributes.decorators, vec!["app.route('/x')"]);
        assert_eq!(ext.symbols[0].span.start, 0);
        assert_eq!(ext.symbols[1].attributes.decorators, vec!["property"]);
        assert!(ext
            .sites
            .iter()
            .any(|s| s.kind == SiteKind::Call && s.segments == vec!["app", "route"]));
    }

    #[test]
    fn test_import_bindings() {
        let ext = extract_py("import os.path\nimport numpy as np\nfrom util import helper, other as o\nfrom . import sibling\nfrom pkg import *\n");
        let bindings: Vec<(&str, &ImportBinding)> = ext
            .symbols
            .iter()
            .filter_map(|s| s.kind.as_import().map(|b| (s.name.as_str(), b)))
            .collect();
        assert_eq!(bindings.len(), 6);
        assert_eq!(bindings[0].0, "os");
        assert_eq!(bindings[0].1.module, "os.path");
        assert_eq!(bindings[1].0, "np");
        assert_eq!(bindings[2].1.imported.as_deref(), Some("helper"));
        assert_eq!(bindings[3].0, "o");
        assert_eq!(bindings[3].1.alias.as_deref(), Some("o"));
        assert_eq!(bindings[4].1.module, ".");
        assert_eq!(bindings[5].1.form, ImportForm::Wildcard);
        assert_eq!(ext.import_statements.len(), 5);
        assert_eq!(ext.import_statements[2].bindings.len(), 2);
        assert_eq!(ext.import_insertion, ext.text_len);
    }

    #[test]
    fn test_reference_sites_and_locals() {
        let src = "from util import helper\n\ndef run(x):\n    y = helper(x)\n    return util_mod.value + y\n";
        let ext = extract_py(src);
        let call = ext.sites.iter().find(|s| s.kind == SiteKind::Call).unwrap();
        assert_eq!(call.segments, vec!["helper"]);
        assert_eq!(call.enclosing, Some(1));

        let chain = ext
            .sites
            .iter()
            .find(|s| s.segments.len() == 2)
            .unwrap();
        assert_eq!(chain.segments, vec!["util_mod", "value"]);
        assert_eq!(chain.segment_spans[1].slice(src), "value");

        let body_scope = ext.symbols[1].body_scope.unwrap();
        let scope = &ext.scopes[body_scope];
        assert!(scope.bindings.contains_key("x"));
        assert!(scope.bindings.contains_key("y"));
    }

    #[test]
    fn test_dynamic_and_computed_sites() {
        let ext = extract_py("import importlib\nimport util\nm = importlib.import_module(name)\nf = getattr(util, attr)\ng = getattr(util, 'helper')\n");
        assert_eq!(ext.dynamic_sites.len(), 1);
        assert!(ext
            .sites
            .iter()
            .any(|s| s.kind == SiteKind::Computed && s.segments == vec!["util"]));
        assert!(ext
            .sites
            .iter()
            .any(|s| s.segments == vec!["util", "helper"]));
    }

    #[test]
    fn test_main_guard_and_all() {
        let ext = extract_py("__all__ = ['api']\n\ndef api():\n    pass\n\ndef main():\n    pass\n\nif __name__ == '__main__':\n    main()\n");
        assert!(ext.has_main_guard);
        let api = ext.symbols.iter().find(|s| s.name == "api").unwrap();
        assert!(api.attributes.exported);
        let main = ext.symbols.iter().find(|s| s.name == "main").unwrap();
        assert!(!main.attributes.exported);
    }

    #[test]
    fn test_syntax_error_keeps_other_symbols() {
        let ext = extract_py("def good():\n    return 1\n\ndef bad(:\n    pass\n\nclass Fine:\n    pass\n");
        assert!(!ext.status.is_clean());
        let names = names(&ext);
        assert!(names.contains(&"good"));
        assert!(names.contains(&"Fine"));
    }

    #[test]
    fn test_complexity() {
        let ext = extract_py(
            "def f(x):\n    if x and x > 1:\n        return 1\n    elif x:\n        return 2\n    for i in range(3):\n        pass\n    def inner():\n        if x:\n            pass\n    return 0\n",
        );
        let f = ext.symbols.iter().find(|s| s.name == "f").unwrap();
        // if, boolean_operator, elif, for
        assert_eq!(f.kind.as_function().unwrap().complexity, 5);
    }

    #[test]
    fn test_import_insertion_after_docstring() {
        let src = "\"\"\"Module doc.\"\"\"\n\nX = 1\n";
        let ext = extract_py(src);
        assert_eq!(ext.import_insertion, "\"\"\"Module doc.\"\"\"\n".len());
    }
}
