//! JavaScript-specific symbol extraction: ES modules, CommonJS and JSX.

use std::path::Path;

use super::helpers::{
    binding_symbol, cyclomatic, identifier_chain, line_end_after, string_content, Ctx,
    ExtractionBuilder,
};
use crate::graph::types::*;
use crate::parser::tree::{NodeId, SyntaxTree};
use crate::parser::SupportedLanguage;

const NESTED_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "class_declaration",
    "class",
    "method_definition",
];

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

fn is_branch(tree: &SyntaxTree, id: NodeId) -> bool {
    match tree.kind(id) {
        "if_statement" | "for_statement" | "for_in_statement" | "while_statement"
        | "do_statement" | "switch_case" | "catch_clause" | "ternary_expression" => true,
        "binary_expression" => tree
            .child_by_field(id, "operator")
            .is_some_and(|op| matches!(tree.kind(op), "&&" | "||" | "??")),
        _ => false,
    }
}

pub(crate) fn extract(
    path: &Path,
    tree: &SyntaxTree,
    src: &str,
    status: ParseStatus,
) -> FileExtraction {
    let mut walker = Walker {
        b: ExtractionBuilder::new(path, SupportedLanguage::JavaScript, tree, src, status),
    };
    walker.block(tree.root(), Ctx::module());
    walker.b.out.import_insertion = import_insertion(tree, src);
    walker.mark_exported();
    walker.b.finish()
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
            "comment" | "string" | "number" | "regex" | "true" | "false" | "null"
            | "undefined" | "this" | "super" | "property_identifier"
            | "private_property_identifier" | "statement_identifier" | "hash_bang_line"
            | "empty_statement" | "jsx_closing_element" | "jsx_text" => {}
            "import_statement" => self.import(id, ctx),
            "export_statement" => self.export(id, ctx),
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = self.b.field(id, "name") {
                    let text = self.b.text(name).to_string();
                    self.function(id, id, text, tree.span(name), ctx);
                }
            }
            "class_declaration" | "class" => {
                self.class(id, id, None, ctx);
            }
            "lexical_declaration" | "variable_declaration" => self.declaration(id, id, ctx),
            "expression_statement" => self.expression_statement(id, ctx),
            "if_statement" | "try_statement" | "switch_statement" => self.block(id, ctx.in_branch()),
            "while_statement" | "do_statement" => {
                if ctx.at_module_level() {
                    self.b.out.has_module_code = true;
                }
                self.block(id, ctx.in_branch());
            }
            "for_statement" => {
                if ctx.at_module_level() {
                    self.b.out.has_module_code = true;
                }
                let inner = ctx.in_branch();
                for child in tree.named_children(id) {
                    if matches!(tree.kind(child), "lexical_declaration" | "variable_declaration") {
                        self.local_declaration(child, inner);
                    } else {
                        self.visit(child, inner);
                    }
                }
            }
            "for_in_statement" => {
                if ctx.at_module_level() {
                    self.b.out.has_module_code = true;
                }
                let inner = ctx.in_branch();
                for child in tree.named_children(id) {
                    if tree.node(child).field == Some("left") {
                        self.bind_pattern(child, inner.scope, inner);
                    } else {
                        self.visit(child, inner);
                    }
                }
            }
            "catch_clause" => {
                if let Some(param) = self.b.field(id, "parameter") {
                    self.bind_pattern(param, ctx.scope, ctx);
                }
                if let Some(body) = self.b.field(id, "body") {
                    self.block(body, ctx);
                }
            }
            "arrow_function" | "function_expression" | "function" | "generator_function" => {
                self.anonymous_function(id, ctx)
            }
            "call_expression" => self.call(id, ctx),
            "new_expression" => {
                if let Some(ctor) = self.b.field(id, "constructor") {
                    match tree.kind(ctor) {
                        "identifier" | "member_expression" => self.reference(ctor, ctx, SiteKind::Call),
                        _ => self.visit(ctor, ctx),
                    }
                }
                if let Some(args) = self.b.field(id, "arguments") {
                    self.visit(args, ctx);
                }
            }
            "member_expression" => self.reference(id, ctx, SiteKind::Reference),
            "subscript_expression" => self.subscript(id, ctx),
            "identifier" | "shorthand_property_identifier" => {
                self.reference(id, ctx, SiteKind::Reference)
            }
            "pair" => {
                if let Some(key) = self.b.field(id, "key") {
                    if tree.kind(key) == "computed_property_name" {
                        self.block(key, ctx);
                    }
                }
                if let Some(value) = self.b.field(id, "value") {
                    self.visit(value, ctx);
                }
            }
            "template_string" => {
                for part in tree.named_children(id) {
                    if tree.kind(part) == "template_substitution" {
                        self.block(part, ctx);
                    }
                }
            }
            "jsx_opening_element" | "jsx_self_closing_element" => self.jsx(id, ctx),
            _ => self.block(id, ctx),
        }
    }

    // ─── Declarations ───────────────────────────────────────────

    /// Declare a named function-like node and walk its body.
    fn function(&mut self, func: NodeId, outer: NodeId, name: String, name_span: Span, ctx: Ctx) -> usize {
        let tree = self.b.tree;
        let params = self.param_names(func);
        let complexity = self
            .b
            .field(func, "body")
            .map(|b| {
                cyclomatic(
                    tree,
                    b,
                    |n| is_branch(tree, n),
                    move |n| NESTED_KINDS.contains(&tree.kind(n)),
                )
            })
            .unwrap_or(1);
        let is_async = tree.children(func).iter().any(|&c| tree.kind(c) == "async");

        let idx = self.b.declare(ExtractedSymbol {
            qualified_name: self.b.qualified(ctx.enclosing, &name),
            kind: SymbolKind::Function(FunctionInfo {
                params,
                is_async,
                is_method: self.b.scope_kind(ctx.scope) == ScopeKind::Class,
                complexity,
            }),
            span: tree.span(outer),
            name_span,
            parent: ctx.enclosing,
            scope: ctx.scope,
            body_scope: None,
            attributes: Attributes {
                conditional: ctx.conditional,
                ..Attributes::default()
            },
            name,
        });
        let scope = self.b.push_scope(ScopeKind::Function, ctx.scope, Some(idx));
        self.b.out.symbols[idx].body_scope = Some(scope);
        self.parameters(func, scope, ctx);
        if let Some(body) = self.b.field(func, "body") {
            self.visit(
                body,
                Ctx {
                    scope,
                    enclosing: Some(idx),
                    conditional: false,
                },
            );
        }
        idx
    }

    fn anonymous_function(&mut self, func: NodeId, ctx: Ctx) {
        let scope = self.b.push_scope(ScopeKind::Function, ctx.scope, None);
        if let Some(name) = self.b.field(func, "name") {
            self.b.bind_local(scope, name);
        }
        self.parameters(func, scope, ctx);
        if let Some(body) = self.b.field(func, "body") {
            self.visit(body, Ctx { scope, ..ctx });
        }
    }

    fn param_names(&self, func: NodeId) -> Vec<String> {
        let tree = self.b.tree;
        if let Some(single) = self.b.field(func, "parameter") {
            return vec![self.b.text(single).to_string()];
        }
        let Some(params) = self.b.field(func, "parameters") else {
            return Vec::new();
        };
        tree.named_children(params)
            .filter(|&p| tree.kind(p) != "comment")
            .map(|p| {
                let name = match tree.kind(p) {
                    "assignment_pattern" => tree.child_by_field(p, "left").unwrap_or(p),
                    _ => p,
                };
                self.b.text(name).trim_start_matches("...").to_string()
            })
            .collect()
    }

    /// Bind parameters in `scope`; default values evaluate outside it.
    fn parameters(&mut self, func: NodeId, scope: ScopeId, outer: Ctx) {
        let tree = self.b.tree;
        if let Some(single) = self.b.field(func, "parameter") {
            self.b.bind_local(scope, single);
        }
        if let Some(params) = self.b.field(func, "parameters") {
            for param in tree.named_children(params) {
                self.bind_pattern(param, scope, outer);
            }
        }
    }

    /// Bind every identifier a parameter or destructuring pattern introduces.
    fn bind_pattern(&mut self, pattern: NodeId, scope: ScopeId, ctx: Ctx) {
        let tree = self.b.tree;
        match tree.kind(pattern) {
            "identifier" | "shorthand_property_identifier_pattern" => self.b.bind_local(scope, pattern),
            "object_pattern" | "array_pattern" | "rest_pattern" => {
                for child in tree.named_children(pattern) {
                    self.bind_pattern(child, scope, ctx);
                }
            }
            "pair_pattern" => {
                if let Some(value) = self.b.field(pattern, "value") {
                    self.bind_pattern(value, scope, ctx);
                }
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                if let Some(left) = self.b.field(pattern, "left") {
                    self.bind_pattern(left, scope, ctx);
                }
                if let Some(right) = self.b.field(pattern, "right") {
                    self.visit(right, ctx);
                }
            }
            "member_expression" | "subscript_expression" => self.visit(pattern, ctx),
            _ => {}
        }
    }

    fn pattern_identifiers(&self, pattern: NodeId, out: &mut Vec<NodeId>) {
        let tree = self.b.tree;
        match tree.kind(pattern) {
            "identifier" | "shorthand_property_identifier_pattern" => out.push(pattern),
            "object_pattern" | "array_pattern" | "rest_pattern" => {
                for child in tree.named_children(pattern) {
                    self.pattern_identifiers(child, out);
                }
            }
            "pair_pattern" => {
                if let Some(value) = tree.child_by_field(pattern, "value") {
                    self.pattern_identifiers(value, out);
                }
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                if let Some(left) = tree.child_by_field(pattern, "left") {
                    self.pattern_identifiers(left, out);
                }
            }
            _ => {}
        }
    }

    fn class(&mut self, node: NodeId, outer: NodeId, name: Option<(String, Span)>, ctx: Ctx) -> Option<usize> {
        let tree = self.b.tree;
        let name = name.or_else(|| {
            self.b
                .field(node, "name")
                .map(|n| (self.b.text(n).to_string(), tree.span(n)))
        });

        let heritage = tree.child_of_kind(node, "class_heritage");
        let bases: Vec<String> = heritage
            .map(|h| {
                tree.named_children(h)
                    .map(|b| self.b.text(b).to_string())
                    .collect()
            })
            .unwrap_or_default();

        let body = self.b.field(node, "body");
        let Some((name, name_span)) = name else {
            if let Some(h) = heritage {
                self.heritage(h, ctx);
            }
            if let Some(body) = body {
                self.class_body(body, ctx);
            }
            return None;
        };

        let idx = self.b.declare(ExtractedSymbol {
            qualified_name: self.b.qualified(ctx.enclosing, &name),
            kind: SymbolKind::Class(ClassInfo {
                bases,
                base_edges: Vec::new(),
            }),
            span: tree.span(outer),
            name_span,
            parent: ctx.enclosing,
            scope: ctx.scope,
            body_scope: None,
            attributes: Attributes {
                conditional: ctx.conditional,
                ..Attributes::default()
            },
            name,
        });
        if let Some(h) = heritage {
            self.heritage(
                h,
                Ctx {
                    enclosing: Some(idx),
                    ..ctx
                },
            );
        }
        let scope = self.b.push_scope(ScopeKind::Class, ctx.scope, Some(idx));
        self.b.out.symbols[idx].body_scope = Some(scope);
        if let Some(body) = body {
            self.class_body(
                body,
                Ctx {
                    scope,
                    enclosing: Some(idx),
                    conditional: false,
                },
            );
        }
        Some(idx)
    }

    fn heritage(&mut self, heritage: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        for base in tree.named_children(heritage) {
            match tree.kind(base) {
                "identifier" | "member_expression" => self.reference(base, ctx, SiteKind::Inherit),
                _ => self.visit(base, ctx),
            }
        }
    }

    fn class_body(&mut self, body: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        for member in tree.named_children(body) {
            match tree.kind(member) {
                "method_definition" => {
                    let Some(name) = self.b.field(member, "name") else {
                        continue;
                    };
                    if tree.kind(name) == "computed_property_name" {
                        self.block(name, ctx);
                        self.anonymous_function(member, ctx);
                        continue;
                    }
                    let text = self.b.text(name).to_string();
                    self.function(member, member, text, tree.span(name), ctx);
                }
                "field_definition" => {
                    if let Some(prop) = self.b.field(member, "property") {
                        if matches!(tree.kind(prop), "property_identifier" | "private_property_identifier") {
                            let name = self.b.text(prop).to_string();
                            self.b.declare(ExtractedSymbol {
                                qualified_name: self.b.qualified(ctx.enclosing, &name),
                                kind: SymbolKind::Variable(VariableInfo::default()),
                                span: tree.span(member),
                                name_span: tree.span(prop),
                                parent: ctx.enclosing,
                                scope: ctx.scope,
                                body_scope: None,
                                attributes: Attributes::default(),
                                name,
                            });
                        }
                    }
                    if let Some(value) = self.b.field(member, "value") {
                        self.visit(value, ctx);
                    }
                }
                _ => self.visit(member, ctx),
            }
        }
    }

    /// `const`/`let`/`var` statements. Module-level declarators become
    /// symbols; everything else binds locals.
    fn declaration(&mut self, decl: NodeId, outer: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let block_scoped_elsewhere = tree.kind(decl) == "lexical_declaration"
            && !tree
                .parent(decl)
                .is_some_and(|p| matches!(tree.kind(p), "program" | "export_statement"));
        if !ctx.at_module_level() || block_scoped_elsewhere {
            self.local_declaration(decl, ctx);
            return;
        }
        let is_const = self
            .b
            .field(decl, "kind")
            .is_some_and(|k| self.b.text(k) == "const");

        let declarators: Vec<NodeId> = tree
            .named_children(decl)
            .filter(|&c| tree.kind(c) == "variable_declarator")
            .collect();
        for declarator in declarators {
            let Some(name) = self.b.field(declarator, "name") else {
                continue;
            };
            let value = self.b.field(declarator, "value");
            if let Some(v) = value.filter(|&v| self.is_require(v)) {
                self.require_binding(outer, name, v, ctx);
                continue;
            }
            if tree.kind(name) != "identifier" {
                if let Some(v) = value {
                    self.visit(v, ctx);
                }
                let mut names = Vec::new();
                self.pattern_identifiers(name, &mut names);
                for n in names {
                    self.variable(outer, n, is_const, ctx);
                }
                continue;
            }
            let text = self.b.text(name).to_string();
            match value.map(|v| (v, tree.kind(v))) {
                Some((v, kind)) if FUNCTION_VALUES.contains(&kind) => {
                    self.function(v, outer, text, tree.span(name), ctx);
                }
                Some((v, "class")) => {
                    self.class(v, outer, Some((text, tree.span(name))), ctx);
                }
                _ => {
                    if let Some(v) = value {
                        self.visit(v, ctx);
                    }
                    self.variable(outer, name, is_const, ctx);
                }
            }
        }
    }

    fn variable(&mut self, outer: NodeId, name_node: NodeId, is_const: bool, ctx: Ctx) -> usize {
        let name = self.b.text(name_node).to_string();
        self.b.declare(ExtractedSymbol {
            qualified_name: self.b.qualified(ctx.enclosing, &name),
            kind: SymbolKind::Variable(VariableInfo {
                is_constant: is_const,
            }),
            span: self.b.span(outer),
            name_span: self.b.span(name_node),
            parent: ctx.enclosing,
            scope: ctx.scope,
            body_scope: None,
            attributes: Attributes {
                conditional: ctx.conditional,
                ..Attributes::default()
            },
            name,
        })
    }

    fn local_declaration(&mut self, decl: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        for declarator in tree.named_children(decl) {
            if tree.kind(declarator) != "variable_declarator" {
                continue;
            }
            let name = self.b.field(declarator, "name");
            let value = self.b.field(declarator, "value");
            if let (Some(n), Some(v)) = (name, value) {
                if self.is_require(v) {
                    self.require_binding(decl, n, v, ctx);
                    continue;
                }
            }
            if let Some(v) = value {
                self.visit(v, ctx);
            }
            if let Some(n) = name {
                self.bind_pattern(n, ctx.scope, ctx);
            }
        }
    }

    // ─── Imports and exports ────────────────────────────────────

    /// Span of a string literal's content, quotes excluded.
    fn string_span(&self, string: NodeId) -> Span {
        let tree = self.b.tree;
        tree.child_of_kind(string, "string_fragment")
            .map(|f| tree.span(f))
            .unwrap_or_else(|| {
                let s = tree.span(string);
                let inner = (s.start + 1).min(s.end);
                Span::new(inner, inner, s.start_line, s.start_line)
            })
    }

    fn string_value(&self, string: NodeId) -> String {
        string_content(self.b.text(string)).unwrap_or_default()
    }

    fn is_require(&self, value: NodeId) -> bool {
        let tree = self.b.tree;
        if tree.kind(value) != "call_expression" {
            return false;
        }
        let callee_is_require = self
            .b
            .field(value, "function")
            .is_some_and(|f| tree.kind(f) == "identifier" && self.b.text(f) == "require");
        callee_is_require && self.require_source(value).is_some()
    }

    /// The string argument of `require('x')`.
    fn require_source(&self, call: NodeId) -> Option<NodeId> {
        let tree = self.b.tree;
        let args = self.b.field(call, "arguments")?;
        let mut named = tree.named_children(args);
        let first = named.next()?;
        (named.next().is_none() && tree.kind(first) == "string").then_some(first)
    }

    fn require_binding(&mut self, outer: NodeId, target: NodeId, call: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let Some(source) = self.require_source(call) else {
            return;
        };
        let module = self.string_value(source);
        let statement_span = tree.span(outer);
        let stmt = self
            .b
            .import_statement(statement_span, &module, Some(self.string_span(source)), ctx);

        let base = |local: &str, form, imported: Option<String>, clause: Span, imported_span| ImportBinding {
            module: module.clone(),
            imported,
            local_name: local.to_string(),
            alias: None,
            form,
            reexport: false,
            statement: stmt,
            clause_span: clause,
            imported_span,
            resolution: ImportResolution::Pending,
        };

        match tree.kind(target) {
            "identifier" => {
                let local = self.b.text(target).to_string();
                let binding = base(&local, ImportForm::Require, None, tree.span(target), None);
                let symbol = binding_symbol(&local, tree.span(target), statement_span, binding, ctx);
                self.b.import_binding(stmt, symbol);
            }
            "object_pattern" => {
                for prop in tree.named_children(target) {
                    let (imported_node, local_node) = match tree.kind(prop) {
                        "shorthand_property_identifier_pattern" => (prop, prop),
                        "pair_pattern" => match (tree.child_by_field(prop, "key"), tree.child_by_field(prop, "value")) {
                            (Some(k), Some(v)) if tree.kind(v) == "identifier" => (k, v),
                            _ => continue,
                        },
                        _ => continue,
                    };
                    let imported = self.b.text(imported_node).to_string();
                    let local = self.b.text(local_node).to_string();
                    let mut binding = base(
                        &local,
                        ImportForm::Named,
                        Some(imported.clone()),
                        tree.span(prop),
                        Some(tree.span(imported_node)),
                    );
                    if local != imported {
                        binding.alias = Some(local.clone());
                    }
                    let symbol = binding_symbol(&local, tree.span(local_node), statement_span, binding, ctx);
                    self.b.import_binding(stmt, symbol);
                }
            }
            _ => {}
        }
    }

    fn import(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let Some(source) = self.b.field(id, "source") else {
            return;
        };
        let module = self.string_value(source);
        let statement_span = tree.span(id);
        let stmt = self
            .b
            .import_statement(statement_span, &module, Some(self.string_span(source)), ctx);
        let Some(clause) = tree.child_of_kind(id, "import_clause") else {
            // `import './side-effect';`
            return;
        };

        let push = |walker: &mut Self, local_node: NodeId, clause_span: Span, form, imported: Option<(String, Span)>, alias: Option<String>| {
            let local = walker.b.text(local_node).to_string();
            let binding = ImportBinding {
                module: module.clone(),
                imported_span: imported.as_ref().map(|(_, s)| *s),
                imported: imported.map(|(n, _)| n),
                local_name: local.clone(),
                alias,
                form,
                reexport: false,
                statement: stmt,
                clause_span,
                resolution: ImportResolution::Pending,
            };
            let symbol = binding_symbol(&local, tree.span(local_node), statement_span, binding, ctx);
            walker.b.import_binding(stmt, symbol);
        };

        for part in tree.named_children(clause) {
            match tree.kind(part) {
                "identifier" => push(
                    self,
                    part,
                    tree.span(part),
                    ImportForm::Default,
                    Some(("default".to_string(), tree.span(part))),
                    None,
                ),
                "namespace_import" => {
                    if let Some(local) = tree.child_of_kind(part, "identifier") {
                        push(self, local, tree.span(part), ImportForm::Namespace, None, None);
                    }
                }
                "named_imports" => {
                    for spec in tree.named_children(part) {
                        if tree.kind(spec) != "import_specifier" {
                            continue;
                        }
                        let Some(name) = tree.child_by_field(spec, "name") else {
                            continue;
                        };
                        let alias = tree.child_by_field(spec, "alias");
                        let imported = match tree.kind(name) {
                            "string" => self.string_value(name),
                            _ => self.b.text(name).to_string(),
                        };
                        let alias_text = alias.map(|a| self.b.text(a).to_string());
                        push(
                            self,
                            alias.unwrap_or(name),
                            tree.span(spec),
                            ImportForm::Named,
                            Some((imported, tree.span(name))),
                            alias_text,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn export(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let is_default = tree.children(id).iter().any(|&c| tree.kind(c) == "default");

        if let Some(decl) = self.b.field(id, "declaration") {
            let before = self.b.out.symbols.len();
            match tree.kind(decl) {
                "lexical_declaration" | "variable_declaration" => self.declaration(decl, id, ctx),
                "function_declaration" | "generator_function_declaration" => {
                    if let Some(name) = self.b.field(decl, "name") {
                        let text = self.b.text(name).to_string();
                        self.function(decl, id, text, tree.span(name), ctx);
                    }
                }
                "class_declaration" => {
                    self.class(decl, id, None, ctx);
                }
                _ => self.visit(decl, ctx),
            }
            let declared: Vec<usize> = (before..self.b.out.symbols.len())
                .filter(|&i| {
                    let s = &self.b.out.symbols[i];
                    s.scope == ctx.scope && s.parent == ctx.enclosing && s.kind.as_import().is_none()
                })
                .collect();
            for i in declared {
                let symbol = &mut self.b.out.symbols[i];
                symbol.attributes.exported = true;
                let exported = if is_default { "default".to_string() } else { symbol.name.clone() };
                let entry = ExportEntry {
                    exported,
                    local: symbol.name.clone(),
                    local_span: Some(symbol.name_span),
                };
                self.b.out.exports.push(entry);
            }
            return;
        }

        if is_default {
            let Some(value) = self.b.field(id, "value") else {
                return;
            };
            match tree.kind(value) {
                "identifier" => {
                    let name = self.b.text(value).to_string();
                    let span = tree.span(value);
                    self.b.out.exports.push(ExportEntry {
                        exported: "default".to_string(),
                        local: name.clone(),
                        local_span: Some(span),
                    });
                    self.b.site(vec![(name, span)], span, SiteKind::Export, ctx);
                }
                kind if FUNCTION_VALUES.contains(&kind) || kind == "class" => {
                    let span = tree.span(value);
                    let idx = if kind == "class" {
                        self.class(value, id, Some(("default".to_string(), span)), ctx)
                    } else {
                        Some(self.function(value, id, "default".to_string(), span, ctx))
                    };
                    if let Some(idx) = idx {
                        self.b.out.symbols[idx].attributes.exported = true;
                        self.b.out.exports.push(ExportEntry {
                            exported: "default".to_string(),
                            local: "default".to_string(),
                            local_span: None,
                        });
                    }
                }
                _ => self.visit(value, ctx),
            }
            return;
        }

        if let Some(source) = self.b.field(id, "source") {
            self.reexport(id, source, ctx);
            return;
        }

        // export { a, b as c };
        if let Some(clause) = tree.child_of_kind(id, "export_clause") {
            for spec in tree.named_children(clause) {
                let Some(name) = tree.child_by_field(spec, "name") else {
                    continue;
                };
                let local = self.b.text(name).to_string();
                let exported = tree
                    .child_by_field(spec, "alias")
                    .map(|a| self.b.text(a).to_string())
                    .unwrap_or_else(|| local.clone());
                let span = tree.span(name);
                self.b.out.exports.push(ExportEntry {
                    exported,
                    local: local.clone(),
                    local_span: Some(span),
                });
                self.b.site(vec![(local, span)], span, SiteKind::Export, ctx);
            }
        }
    }

    /// `export { a as b } from 'm'`, `export * from 'm'`, `export * as ns from 'm'`.
    fn reexport(&mut self, id: NodeId, source: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let module = self.string_value(source);
        let statement_span = tree.span(id);
        let stmt = self
            .b
            .import_statement(statement_span, &module, Some(self.string_span(source)), ctx);

        let binding = |local: &str, form, imported: Option<String>, clause_span, imported_span| ImportBinding {
            module: module.clone(),
            imported,
            local_name: local.to_string(),
            alias: None,
            form,
            reexport: true,
            statement: stmt,
            clause_span,
            imported_span,
            resolution: ImportResolution::Pending,
        };

        if let Some(clause) = tree.child_of_kind(id, "export_clause") {
            for spec in tree.named_children(clause) {
                let Some(name) = tree.child_by_field(spec, "name") else {
                    continue;
                };
                let imported = self.b.text(name).to_string();
                let alias = tree.child_by_field(spec, "alias");
                let local_node = alias.unwrap_or(name);
                let local = self.b.text(local_node).to_string();
                let mut b = binding(
                    &local,
                    ImportForm::Named,
                    Some(imported),
                    tree.span(spec),
                    Some(tree.span(name)),
                );
                b.alias = alias.map(|a| self.b.text(a).to_string());
                let symbol = binding_symbol(&local, tree.span(local_node), statement_span, b, ctx);
                self.b.import_binding(stmt, symbol);
            }
        } else if let Some(ns) = tree.child_of_kind(id, "namespace_export") {
            if let Some(local_node) = tree.named_children(ns).last() {
                let local = self.b.text(local_node).to_string();
                let b = binding(&local, ImportForm::Namespace, None, tree.span(ns), None);
                let symbol = binding_symbol(&local, tree.span(local_node), statement_span, b, ctx);
                self.b.import_binding(stmt, symbol);
            }
        } else {
            let star = tree
                .child_of_kind(id, "*")
                .map(|s| tree.span(s))
                .unwrap_or(statement_span);
            let b = binding("*", ImportForm::Wildcard, None, star, None);
            let symbol = binding_symbol("*", star, statement_span, b, ctx);
            self.b.import_binding(stmt, symbol);
        }
    }

    fn expression_statement(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        for child in tree.named_children(id) {
            match tree.kind(child) {
                // Directives such as "use strict".
                "string" => {}
                "assignment_expression" if ctx.at_module_level() => {
                    if !self.commonjs_export(id, child, ctx) {
                        self.visit(child, ctx);
                    }
                }
                kind => {
                    if ctx.at_module_level() && kind != "assignment_expression" {
                        self.b.out.has_module_code = true;
                    }
                    self.visit(child, ctx);
                }
            }
        }
    }

    /// `module.exports = ...`, `exports.x = ...`. Returns false when the
    /// assignment is not an export.
    fn commonjs_export(&mut self, stmt: NodeId, assign: NodeId, ctx: Ctx) -> bool {
        let tree = self.b.tree;
        let (Some(left), Some(right)) = (self.b.field(assign, "left"), self.b.field(assign, "right")) else {
            return false;
        };
        let target = self.b.text(left);
        let member = if target == "module.exports" {
            None
        } else if let Some(rest) = target
            .strip_prefix("module.exports.")
            .or_else(|| target.strip_prefix("exports."))
        {
            Some((rest.to_string(), tree.child_by_field(left, "property").map(|p| tree.span(p))))
        } else {
            return false;
        };

        match member {
            None => match tree.kind(right) {
                "object" => {
                    for prop in tree.named_children(right) {
                        match tree.kind(prop) {
                            "shorthand_property_identifier" => {
                                let name = self.b.text(prop).to_string();
                                self.export_local(name.clone(), name, tree.span(prop), ctx);
                            }
                            "pair" => {
                                let key = tree.child_by_field(prop, "key");
                                let value = tree.child_by_field(prop, "value");
                                match (key, value) {
                                    (Some(k), Some(v)) if tree.kind(v) == "identifier" => {
                                        let exported = self.b.text(k).to_string();
                                        let local = self.b.text(v).to_string();
                                        self.export_local(exported, local, tree.span(v), ctx);
                                    }
                                    (_, Some(v)) => self.visit(v, ctx),
                                    _ => {}
                                }
                            }
                            _ => self.visit(prop, ctx),
                        }
                    }
                }
                "identifier" => {
                    let local = self.b.text(right).to_string();
                    self.export_local("default".to_string(), local, tree.span(right), ctx);
                }
                _ => self.visit(right, ctx),
            },
            Some((name, name_span)) => {
                let name_span = name_span.unwrap_or_else(|| tree.span(left));
                let kind = tree.kind(right);
                let idx = if FUNCTION_VALUES.contains(&kind) {
                    Some(self.function(right, stmt, name.clone(), name_span, ctx))
                } else if kind == "class" {
                    self.class(right, stmt, Some((name.clone(), name_span)), ctx)
                } else if kind == "identifier" {
                    let local = self.b.text(right).to_string();
                    self.export_local(name, local, tree.span(right), ctx);
                    return true;
                } else {
                    self.visit(right, ctx);
                    Some(self.b.declare(ExtractedSymbol {
                        qualified_name: name.clone(),
                        kind: SymbolKind::Variable(VariableInfo::default()),
                        span: tree.span(stmt),
                        name_span,
                        parent: None,
                        scope: ctx.scope,
                        body_scope: None,
                        attributes: Attributes::default(),
                        name: name.clone(),
                    }))
                };
                if let Some(idx) = idx {
                    self.b.out.symbols[idx].attributes.exported = true;
                    self.b.out.exports.push(ExportEntry {
                        exported: name.clone(),
                        local: name,
                        local_span: None,
                    });
                }
            }
        }
        true
    }

    fn export_local(&mut self, exported: String, local: String, span: Span, ctx: Ctx) {
        self.b.out.exports.push(ExportEntry {
            exported,
            local: local.clone(),
            local_span: Some(span),
        });
        self.b.site(vec![(local, span)], span, SiteKind::Export, ctx);
    }

    fn mark_exported(&mut self) {
        let locals: Vec<String> = self.b.out.exports.iter().map(|e| e.local.clone()).collect();
        for symbol in self.b.out.symbols.iter_mut() {
            if symbol.scope == 0 && locals.contains(&symbol.name) {
                symbol.attributes.exported = true;
            }
        }
    }

    // ─── References ─────────────────────────────────────────────

    fn chain(&self, id: NodeId) -> Option<Vec<(String, Span)>> {
        identifier_chain(
            self.b.tree,
            self.b.src,
            id,
            "member_expression",
            "object",
            "property",
            &["identifier", "this", "shorthand_property_identifier"],
        )
    }

    fn reference(&mut self, id: NodeId, ctx: Ctx, kind: SiteKind) {
        let tree = self.b.tree;
        match self.chain(id) {
            Some(chain) => self.b.site(chain, tree.span(id), kind, ctx),
            None => {
                if let Some(obj) = self.b.field(id, "object") {
                    self.visit(obj, ctx);
                }
                if let Some(prop) = self.b.field(id, "property") {
                    let name = self.b.text(prop).to_string();
                    self.b.member(&name, tree.span(prop));
                }
            }
        }
    }

    fn subscript(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        let object = self.b.field(id, "object");
        let index = self.b.field(id, "index");
        let chain = object.and_then(|o| self.chain(o));

        match (chain, index) {
            (Some(mut chain), Some(ix)) if tree.kind(ix) == "string" => {
                let name = self.string_value(ix);
                let span = self.string_span(ix);
                self.b.member(&name, span);
                chain.push((name, span));
                self.b.site(chain, tree.span(id), SiteKind::Reference, ctx);
            }
            (Some(chain), Some(ix)) => {
                if !matches!(tree.kind(ix), "number") {
                    self.b.site(chain, tree.span(id), SiteKind::Computed, ctx);
                } else {
                    self.b.site(chain, tree.span(id), SiteKind::Reference, ctx);
                }
                self.visit(ix, ctx);
            }
            (_, ix) => {
                if let Some(o) = object {
                    self.visit(o, ctx);
                }
                if let Some(ix) = ix {
                    self.visit(ix, ctx);
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
            match (tree.kind(f), callee) {
                ("import", _) => {
                    if self.require_source(id).is_none() {
                        self.b.dynamic(tree.span(id), ctx, "import(...)");
                    }
                }
                ("identifier", "require") => match self.require_source(id) {
                    Some(source) => {
                        // Bare `require('./x')` outside a declaration.
                        let module = self.string_value(source);
                        let span = self.string_span(source);
                        self.b.import_statement(tree.span(id), &module, Some(span), ctx);
                    }
                    None => self.b.dynamic(tree.span(id), ctx, "require(...)"),
                },
                ("identifier", "eval") => self.b.dynamic(tree.span(id), ctx, "eval(...)"),
                ("identifier" | "member_expression", _) => self.reference(f, ctx, SiteKind::Call),
                _ => self.visit(f, ctx),
            }
        }
        if let Some(a) = args {
            self.visit(a, ctx);
        }
    }

    fn jsx(&mut self, id: NodeId, ctx: Ctx) {
        let tree = self.b.tree;
        for child in tree.named_children(id) {
            if tree.node(child).field != Some("name") {
                self.visit(child, ctx);
                continue;
            }
            match tree.kind(child) {
                // Lower-case tags are intrinsic elements.
                "identifier" if self.b.text(child).starts_with(|c: char| c.is_ascii_uppercase()) => {
                    self.reference(child, ctx, SiteKind::Reference)
                }
                "member_expression" => self.reference(child, ctx, SiteKind::Reference),
                _ => {}
            }
        }
    }
}

/// After the last top-level import, else after leading comments and directives.
fn import_insertion(tree: &SyntaxTree, src: &str) -> usize {
    let mut header_end = 0;
    let mut import_end = None;
    let mut seen_statement = false;
    for child in tree.named_children(tree.root()) {
        let span = tree.span(child);
        match tree.kind(child) {
            "import_statement" => import_end = Some(line_end_after(src, span.end)),
            "comment" | "hash_bang_line" if !seen_statement && import_end.is_none() => {
                header_end = line_end_after(src, span.end);
            }
            "expression_statement" if !seen_statement => {
                let directive = tree
                    .named_children(child)
                    .next()
                    .is_some_and(|c| tree.kind(c) == "string");
                if directive {
                    header_end = line_end_after(src, span.end);
                }
            }
            "function_declaration" | "class_declaration" | "export_statement" => break,
            _ => {}
        }
        if !matches!(tree.kind(child), "comment" | "hash_bang_line") {
            seen_statement = true;
        }
    }
    import_end.unwrap_or(header_end)
}
