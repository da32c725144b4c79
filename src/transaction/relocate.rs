//! Moving a top-level declaration into another file.
//!
//! The declaration's lines are cut from the source and appended to the
//! target. Every file that reached the symbol through the source is
//! rewritten to reach it through the target, the target gains the imports
//! the body depends on, and the source imports the symbol back if it still
//! uses it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::edit::{append_point, declaration_lines, EditSet, TextEdit};
use super::imports::{
    after_statement, insertion, is_require_statement, removal_edits, render, request_for, specifier,
    specifier_like,
};
use super::plan::Planner;
use super::RejectReason;
use crate::graph::types::{BindingTarget, ImportBinding, ImportForm, ImportResolution, ScopeKind};
use crate::graph::{is_indexable, Certainty, FileExtraction, Symbol, SymbolId, Usage, WarningKind};
use crate::parser::{ImportRequest, LanguageAdapter, SupportedLanguage};

/// Import lines to add, per file, deduplicated in request order.
#[derive(Debug, Default)]
struct PendingImports(BTreeMap<PathBuf, Vec<String>>);

impl PendingImports {
    fn add(&mut self, file: &Path, line: String) {
        let lines = self.0.entry(file.to_path_buf()).or_default();
        if !lines.contains(&line) {
            lines.push(line);
        }
    }

    fn take(&mut self, file: &Path) -> Vec<String> {
        self.0.remove(file).unwrap_or_default()
    }
}

fn resolves_to(binding: &ImportBinding, id: SymbolId) -> bool {
    matches!(&binding.resolution, ImportResolution::Symbol { target, .. } if *target == id)
}

/// Two bindings that make the same name mean the same thing.
fn same_origin(a: &ImportBinding, b: &ImportBinding) -> bool {
    match (&a.resolution, &b.resolution) {
        (ImportResolution::Symbol { target: x, .. }, ImportResolution::Symbol { target: y, .. }) => x == y,
        (ImportResolution::Module(x), ImportResolution::Module(y)) => x == y,
        (ImportResolution::Unresolved(_), ImportResolution::Unresolved(_)) => {
            a.module == b.module && a.imported == b.imported && a.form == b.form
        }
        _ => false,
    }
}

impl Planner<'_> {
    pub(super) fn move_symbol(&mut self, id: SymbolId, target: &Path) -> Result<(), RejectReason> {
        let target = self.normalize(target);
        let symbol = self.symbol(id)?;
        if symbol.file == target {
            debug!(symbol = %id, file = %target.display(), "Already in target file");
            return Ok(());
        }
        self.check_movable(&symbol, &target)?;

        let adapter = self.adapter_of(&symbol.file)?;
        let usages = self.graph().usages(id);
        let mut edits = EditSet::default();
        let mut imports = PendingImports::default();
        let mut exported_siblings = BTreeSet::new();

        let body = self.cut_declaration(&symbol, adapter, &mut edits)?;
        self.carry_dependencies(&symbol, &target, adapter, &mut imports, &mut exported_siblings)?;
        self.retarget_importers(&symbol, &target, adapter, &mut edits)?;
        self.rewrite_indirect_uses(&symbol, &target, adapter, &mut edits, &mut imports)?;

        if self.source_still_needs(&symbol, &usages) {
            let spec = specifier(adapter, &symbol.file, &target, self.scratch.module_context())?;
            imports.add(
                &symbol.file,
                adapter.render_import(&ImportRequest::named(spec, &symbol.name)),
            );
        }
        if let Some(prefix) = adapter.export_prefix() {
            let graph = self.graph();
            for sibling in exported_siblings.iter().filter_map(|&s| graph.symbol(s)) {
                edits.push(&symbol.file, TextEdit::insert(sibling.span.start, prefix));
            }
        }

        self.paste_declaration(&target, body, adapter, &mut imports, &mut edits);
        for (file, lines) in imports.0 {
            let source = self.source(&file)?;
            if let Some(edit) = insertion(
                Some(&source.extraction),
                &source.text,
                adapter.declaration_separator(),
                &lines,
            ) {
                edits.push(&file, edit);
            }
        }

        debug!(
            symbol = %id,
            from = %symbol.file.display(),
            to = %target.display(),
            usages = usages.len(),
            "Planned move"
        );
        let hints = self.identity_hints(id, &target, str::to_string);
        self.commit(edits, &hints)?;
        self.verify_identity(id, &target, &symbol.name, usages.len())
    }

    fn check_movable(&self, symbol: &Symbol, target: &Path) -> Result<(), RejectReason> {
        let not_movable = |detail: &str| RejectReason::NotMovable {
            symbol: symbol.id,
            detail: detail.to_string(),
        };
        if symbol.kind.as_import().is_some() {
            return Err(not_movable("import bindings move with their statement"));
        }
        if !symbol.is_top_level() {
            return Err(not_movable("only top-level declarations move"));
        }
        if symbol.attributes.conditional {
            return Err(not_movable("declared under a module-level condition"));
        }

        let source = self.source(&symbol.file)?;
        let unsupported = || RejectReason::UnsupportedTarget {
            file: target.to_path_buf(),
        };
        let to = SupportedLanguage::from_path(target).ok_or_else(unsupported)?;
        if to != source.language() {
            return Err(RejectReason::LanguageMismatch {
                from: source.language(),
                to,
            });
        }
        if self.scratch.file(target).is_none() {
            let root = self.scratch.root();
            if root.join(target).exists() || !is_indexable(root, self.scratch.config(), target) {
                return Err(unsupported());
            }
        }

        let graph = self.graph();
        if let Some(usage) = graph
            .usages(symbol.id)
            .into_iter()
            .find(|u| u.certainty == Certainty::Ambiguous)
        {
            return Err(RejectReason::AmbiguousReference {
                file: usage.file,
                line: usage.span.start_line,
                name: symbol.name.clone(),
            });
        }
        if let Some(warning) = graph.warnings_for(&symbol.file).iter().find(|w| {
            matches!(w.kind, WarningKind::Ambiguous { .. }) && symbol.span.contains(&w.span)
        }) {
            return Err(RejectReason::AmbiguousReference {
                file: warning.file.clone(),
                line: warning.span.start_line,
                name: warning.name.clone(),
            });
        }

        self.claim_name(target, &symbol.name, |b| resolves_to(b, symbol.id))?;
        let default_export = source.extraction.exports.iter().any(|e| e.exported == "default" && e.local == symbol.name);
        if default_export
            && self
                .scratch
                .file(target)
                .is_some_and(|t| t.extraction.exports.iter().any(|e| e.exported == "default"))
        {
            return Err(RejectReason::NameCollision {
                file: target.to_path_buf(),
                name: "default".into(),
            });
        }
        Ok(())
    }

    /// Whether `file` already binds `name` at module level to the same thing
    /// (`Ok(true)`), not at all (`Ok(false)`), or to something else.
    fn claim_name(
        &self,
        file: &Path,
        name: &str,
        is_same: impl Fn(&ImportBinding) -> bool,
    ) -> Result<bool, RejectReason> {
        let Some(source) = self.scratch.file(file) else {
            return Ok(false);
        };
        let collision = || RejectReason::NameCollision {
            file: file.to_path_buf(),
            name: name.to_string(),
        };
        let graph = self.graph();
        let mut bound = false;
        for (index, _) in source.extraction.module_symbols_named(name) {
            let binding = graph
                .symbol_at(file, index)
                .and_then(|id| graph.symbol(id))
                .and_then(|s| s.kind.as_import());
            match binding {
                Some(b) if is_same(b) => bound = true,
                _ => return Err(collision()),
            }
        }
        let plain_local = source
            .extraction
            .scopes
            .first()
            .and_then(|scope| scope.bindings.get(name))
            .is_some_and(|bs| bs.iter().any(|b| b.target == BindingTarget::Local));
        if plain_local {
            return Err(collision());
        }
        Ok(bound)
    }

    /// Queue the source deletion; return the text to paste.
    fn cut_declaration(
        &self,
        symbol: &Symbol,
        adapter: &dyn LanguageAdapter,
        edits: &mut EditSet,
    ) -> Result<String, RejectReason> {
        let source = self.source(&symbol.file)?;
        let lines = declaration_lines(&source.text, symbol.span, adapter.line_comment()).ok_or_else(|| {
            RejectReason::NotMovable {
                symbol: symbol.id,
                detail: "declaration shares its lines with other code".into(),
            }
        })?;
        let (start, end) = lines.removal;
        let graph = self.graph();
        let neighbour = graph
            .symbols_in(&symbol.file)
            .iter()
            .filter_map(|&s| graph.symbol(s))
            .find(|s| !graph.is_within(s.id, symbol.id) && s.span.start < end && start < s.span.end);
        if let Some(other) = neighbour {
            return Err(RejectReason::NotMovable {
                symbol: symbol.id,
                detail: format!("declaration shares its statement with `{}`", other.name),
            });
        }
        edits.push(&symbol.file, TextEdit::delete(start, end));

        let mut body = lines.text;
        if let Some(prefix) = adapter.export_prefix() {
            if !source.text[symbol.span.start..].starts_with(prefix.trim_end()) {
                body.insert_str(symbol.span.start - lines.text_start, prefix);
            }
        }
        Ok(body)
    }

    /// Imports the moved body needs in the target.
    fn carry_dependencies(
        &self,
        symbol: &Symbol,
        target: &Path,
        adapter: &dyn LanguageAdapter,
        imports: &mut PendingImports,
        exported_siblings: &mut BTreeSet<SymbolId>,
    ) -> Result<(), RejectReason> {
        let graph = self.graph();
        let ctx = self.scratch.module_context();
        for (dep, edge) in graph.uses_from(symbol.id) {
            if graph.is_within(dep, symbol.id) {
                continue;
            }
            match edge.via {
                Some(via) => {
                    let Some(binding_symbol) = graph.symbol(via) else {
                        continue;
                    };
                    // Imports inside the body travel with it.
                    if binding_symbol.file != symbol.file || graph.is_within(via, symbol.id) {
                        continue;
                    }
                    let Some(binding) = binding_symbol.kind.as_import() else {
                        continue;
                    };
                    let Some(line) = self.rerender_binding(binding_symbol, binding, target, adapter)? else {
                        continue;
                    };
                    let local = (binding.form != ImportForm::Wildcard).then_some(binding.local_name.as_str());
                    if let Some(local) = local {
                        if self.claim_name(target, local, |b| same_origin(b, binding))? {
                            continue;
                        }
                    }
                    imports.add(target, line);
                }
                None => {
                    let mut top = dep;
                    while let Some(parent) = graph.symbol(top).and_then(|s| s.parent) {
                        top = parent;
                    }
                    let Some(sibling) = graph.symbol(top) else {
                        continue;
                    };
                    if sibling.file != symbol.file || sibling.kind.as_import().is_some() {
                        continue;
                    }
                    if self.claim_name(target, &sibling.name, |b| resolves_to(b, sibling.id))? {
                        continue;
                    }
                    let spec = specifier(adapter, target, &symbol.file, ctx)?;
                    imports.add(
                        target,
                        adapter.render_import(&ImportRequest::named(spec, &sibling.name)),
                    );
                    if !sibling.attributes.exported {
                        exported_siblings.insert(sibling.id);
                    }
                }
            }
        }
        Ok(())
    }

    /// The import line `binding` becomes in the target, or `None` when the
    /// name is already the target's own.
    fn rerender_binding(
        &self,
        binding_symbol: &Symbol,
        binding: &ImportBinding,
        target: &Path,
        adapter: &dyn LanguageAdapter,
    ) -> Result<Option<String>, RejectReason> {
        let unsupported = |detail: String| RejectReason::UnsupportedUsage {
            file: binding_symbol.file.clone(),
            line: binding_symbol.span.start_line,
            detail,
        };
        let module_file = binding.resolution.module_file();
        if module_file.is_some_and(|f| f == target) {
            return match &binding.resolution {
                ImportResolution::Symbol { .. } if binding.alias.is_some() => Err(unsupported(format!(
                    "`{}` is an alias for a name of the target",
                    binding.local_name
                ))),
                ImportResolution::Symbol { .. } | ImportResolution::Wildcard(_) => Ok(None),
                _ => Err(unsupported(format!(
                    "`{}` would make the target import itself",
                    binding.local_name
                ))),
            };
        }

        let spec = match module_file {
            Some(file) => {
                specifier_like(adapter, target, file, self.scratch.module_context(), &binding.module)?
            }
            None if binding.module.starts_with('.') => {
                return Err(unsupported(format!("unresolved relative import `{}`", binding.module)))
            }
            None => binding.module.clone(),
        };
        let source = self.source(&binding_symbol.file)?;
        if binding.form == ImportForm::Named && is_require_statement(&source.text, &source.extraction, binding.statement) {
            return Err(unsupported(format!("`{}` comes from a destructured require", binding.local_name)));
        }
        Ok(Some(adapter.render_import(&request_for(binding, spec))))
    }

    /// Point every import that named the source at the target.
    fn retarget_importers(
        &self,
        symbol: &Symbol,
        target: &Path,
        adapter: &dyn LanguageAdapter,
        edits: &mut EditSet,
    ) -> Result<(), RejectReason> {
        let graph = self.graph();
        let mut groups: BTreeMap<(PathBuf, usize), Vec<&Symbol>> = BTreeMap::new();
        for importer in graph.importers_of(symbol.id) {
            let Some(binding) = importer.kind.as_import() else {
                continue;
            };
            match &binding.resolution {
                ImportResolution::Symbol { direct_file, .. } if *direct_file == symbol.file => {
                    groups
                        .entry((importer.file.clone(), binding.statement))
                        .or_default()
                        .push(importer);
                }
                _ => {}
            }
        }

        for ((file, statement), members) in groups {
            let source = self.source(&file)?;
            let ext = &source.extraction;
            let Some(stmt) = ext.import_statements.get(statement) else {
                continue;
            };
            let indices: Vec<usize> = members.iter().map(|m| m.index).collect();
            let unsupported = |detail: String| RejectReason::UnsupportedUsage {
                file: file.clone(),
                line: stmt.span.start_line,
                detail,
            };

            if file == target {
                for member in &members {
                    let local = member.kind.as_import().map_or("", |b| b.local_name.as_str());
                    if local != symbol.name && !graph.binding_uses(member.id).is_empty() {
                        return Err(unsupported(format!(
                            "the target uses `{}` under the alias `{local}`",
                            symbol.name
                        )));
                    }
                }
                for edit in removal_edits(ext, &source.text, &indices) {
                    edits.push(&file, edit);
                }
                continue;
            }

            let ctx = self.scratch.module_context();
            let spec = specifier_like(adapter, &file, target, ctx, &stmt.module)?;
            if stmt.bindings.len() == members.len() {
                let module_span = stmt
                    .module_span
                    .ok_or_else(|| unsupported("import has no module text".into()))?;
                edits.push(&file, TextEdit::of_span(module_span, spec));
                continue;
            }
            if is_require_statement(&source.text, ext, statement) {
                return Err(unsupported("destructured require shares the moved name with others".into()));
            }
            let mut lines = Vec::new();
            for binding in members.iter().filter_map(|m| m.kind.as_import()) {
                let request = request_for(binding, spec.clone());
                let line = render(adapter, &request, binding.reexport)
                    .ok_or_else(|| unsupported(format!("cannot re-export `{}`", binding.local_name)))?;
                lines.push(line);
            }
            for edit in removal_edits(ext, &source.text, &indices) {
                edits.push(&file, edit);
            }
            if let Some(edit) = after_statement(ext, &source.text, statement, &lines) {
                edits.push(&file, edit);
            }
        }
        Ok(())
    }

    /// Uses that reach the symbol through a wildcard or a module object.
    fn rewrite_indirect_uses(
        &self,
        symbol: &Symbol,
        target: &Path,
        adapter: &dyn LanguageAdapter,
        edits: &mut EditSet,
        imports: &mut PendingImports,
    ) -> Result<(), RejectReason> {
        let graph = self.graph();
        let ctx = self.scratch.module_context();
        let is_same = |b: &ImportBinding| resolves_to(b, symbol.id);
        let mut wildcards: BTreeMap<PathBuf, bool> = BTreeMap::new();

        for (_, edge) in graph.incoming(symbol.id) {
            let (Some(site), Some(via)) = (edge.site.as_ref(), edge.via) else {
                continue;
            };
            if !edge.kind.is_usage() {
                continue;
            }
            let Some(binding) = graph.symbol(via).and_then(|s| s.kind.as_import()) else {
                continue;
            };
            match binding.form {
                ImportForm::Wildcard => {
                    wildcards.entry(site.file.clone()).or_insert(binding.reexport);
                }
                ImportForm::Module | ImportForm::Namespace | ImportForm::Require if site.segment > 0 => {
                    let unsupported = |detail: &str| RejectReason::UnsupportedUsage {
                        file: site.file.clone(),
                        line: site.span.start_line,
                        detail: detail.to_string(),
                    };
                    if binding.form == ImportForm::Require {
                        return Err(unsupported("member of a required module object"));
                    }
                    let source = self.source(&site.file)?;
                    let ext = &source.extraction;
                    let reference = ext
                        .sites
                        .get(site.index)
                        .ok_or_else(|| unsupported("reference site is gone"))?;
                    let (Some(first), Some(last)) = (
                        reference.segment_spans.first(),
                        reference.segment_spans.get(site.segment),
                    ) else {
                        return Err(unsupported("reference has no segment spans"));
                    };
                    check_capture(ext, reference.scope, 0, &symbol.name, &site.file, site.span.start_line)?;
                    edits.push(&site.file, TextEdit::replace(first.start, last.end, symbol.name.clone()));
                    if site.file != target && !self.claim_name(&site.file, &symbol.name, is_same)? {
                        let spec = specifier(adapter, &site.file, target, ctx)?;
                        imports.add(
                            &site.file,
                            adapter.render_import(&ImportRequest::named(spec, &symbol.name)),
                        );
                    }
                }
                _ => {}
            }
        }

        // Wildcards further up re-export chains also stop providing the name.
        for importer in graph.importers_of(symbol.id) {
            let Some(ImportResolution::Symbol { via, .. }) = importer.kind.as_import().map(|b| &b.resolution)
            else {
                continue;
            };
            for hop in via.iter().filter_map(|&h| graph.symbol(h)) {
                if let Some(b) = hop.kind.as_import().filter(|b| b.form == ImportForm::Wildcard) {
                    wildcards.entry(hop.file.clone()).or_insert(b.reexport);
                }
            }
        }

        for (file, reexport) in wildcards {
            if file == target || file == symbol.file {
                continue;
            }
            if self.claim_name(&file, &symbol.name, is_same)? {
                continue;
            }
            let spec = specifier(adapter, &file, target, ctx)?;
            let request = ImportRequest::named(spec, &symbol.name);
            let line = render(adapter, &request, reexport).ok_or_else(|| RejectReason::Unsupported {
                detail: format!("cannot re-export `{}` from {}", symbol.name, file.display()),
            })?;
            imports.add(&file, line);
        }
        Ok(())
    }

    /// Whether the source keeps using the symbol once it has moved.
    fn source_still_needs(&self, symbol: &Symbol, usages: &[Usage]) -> bool {
        let graph = self.graph();
        let used = usages
            .iter()
            .any(|u| u.file == symbol.file && !u.from.is_some_and(|f| graph.is_within(f, symbol.id)));
        let listed = self.scratch.file(&symbol.file).is_some_and(|f| {
            f.extraction
                .export_list
                .iter()
                .flatten()
                .any(|(name, _)| name == &symbol.name)
        });
        used || listed
    }

    /// Queue the pasted declaration and the target's new imports.
    fn paste_declaration(
        &self,
        target: &Path,
        body: String,
        adapter: &dyn LanguageAdapter,
        imports: &mut PendingImports,
        edits: &mut EditSet,
    ) {
        let needed = imports.take(target);
        let separator = adapter.declaration_separator();
        let Some(file) = self.scratch.file(target) else {
            let mut content = String::new();
            if !needed.is_empty() {
                content.push_str(&needed.join("\n"));
                content.push('\n');
                content.push_str(separator);
            }
            content.push_str(&body);
            edits.push(target, TextEdit::insert(0, content));
            return;
        };

        let (at, end, lead) = append_point(&file.text, separator);
        let insert_at = file.extraction.import_insertion.min(file.text.len());
        if needed.is_empty() {
            edits.push(target, TextEdit::replace(at, end, format!("{lead}{body}")));
        } else if insert_at < at {
            if let Some(edit) = insertion(Some(&file.extraction), &file.text, separator, &needed) {
                edits.push(target, edit);
            }
            edits.push(target, TextEdit::replace(at, end, format!("{lead}{body}")));
        } else {
            // Nothing but imports so far: the new ones follow them directly.
            let head = if at == 0 { "" } else { "\n" };
            edits.push(
                target,
                TextEdit::replace(at, end, format!("{head}{}\n{separator}{body}", needed.join("\n"))),
            );
        }
    }
}

/// Reject if a binding between `scope` and `until` (exclusive) would
/// capture a bare `name` written in `scope`.
pub(super) fn check_capture(
    ext: &FileExtraction,
    scope: usize,
    until: usize,
    name: &str,
    file: &Path,
    line: usize,
) -> Result<(), RejectReason> {
    let mut current = Some(scope);
    while let Some(id) = current {
        let Some(s) = ext.scopes.get(id) else {
            break;
        };
        if id == until || s.kind == ScopeKind::Module {
            break;
        }
        // Class bodies are only visible to code written directly in them.
        let visible = s.kind != ScopeKind::Class || id == scope;
        if visible && s.bindings.contains_key(name) && !s.globals.contains(name) {
            return Err(RejectReason::LocalCapture {
                file: file.to_path_buf(),
                line,
                name: name.to_string(),
            });
        }
        current = s.parent;
    }
    Ok(())
}
