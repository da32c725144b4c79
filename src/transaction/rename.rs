//! Renaming a symbol together with every use and import that names it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::edit::{EditSet, TextEdit};
use super::plan::Planner;
use super::relocate::check_capture;
use super::RejectReason;
use crate::graph::types::{ImportForm, ImportResolution};
use crate::graph::{Certainty, CodeGraph, IdentityHint, SymbolId};

/// Whether a name survives every hop of a re-export chain unchanged.
fn name_flows(graph: &CodeGraph, via: &[SymbolId]) -> bool {
    via.iter().all(|&hop| {
        graph
            .symbol(hop)
            .and_then(|s| s.kind.as_import())
            .is_some_and(|b| b.form == ImportForm::Wildcard || b.alias.is_none())
    })
}

/// `a.b.old` -> `a.b.new`, and the same for names nested under it.
fn requalify(qualified: &str, old: &str, new: &str) -> String {
    if qualified == old {
        return new.to_string();
    }
    match qualified.strip_prefix(old) {
        Some(rest) if rest.starts_with('.') => format!("{new}{rest}"),
        _ => qualified.to_string(),
    }
}

fn with_last_segment(qualified: &str, name: &str) -> String {
    match qualified.rsplit_once('.') {
        Some((parent, _)) => format!("{parent}.{name}"),
        None => name.to_string(),
    }
}

impl Planner<'_> {
    pub(super) fn rename_symbol(&mut self, id: SymbolId, new_name: &str) -> Result<(), RejectReason> {
        let symbol = self.symbol(id)?;
        if symbol.name == new_name {
            return Ok(());
        }
        if symbol.kind.as_import().is_some() {
            return Err(RejectReason::Unsupported {
                detail: "rename the declaration, not an import binding".into(),
            });
        }
        let adapter = self.adapter_of(&symbol.file)?;
        if !adapter.is_valid_identifier(new_name) {
            return Err(RejectReason::InvalidIdentifier {
                name: new_name.to_string(),
            });
        }

        let old = symbol.name.as_str();
        let source = self.source(&symbol.file)?;
        let graph = self.graph();
        let collision = |file: &Path| RejectReason::NameCollision {
            file: file.to_path_buf(),
            name: new_name.to_string(),
        };

        let declared_in = source.extraction.symbols.get(symbol.index).map_or(0, |s| s.scope);
        if source
            .extraction
            .scopes
            .get(declared_in)
            .is_some_and(|s| s.bindings.contains_key(new_name))
        {
            return Err(collision(&symbol.file));
        }
        let is_member = symbol
            .parent
            .and_then(|p| graph.symbol(p))
            .is_some_and(|p| p.kind.as_class().is_some());
        if is_member {
            let unknown = graph.member_refs.values().any(|names| names.contains(old))
                || self
                    .scratch
                    .files()
                    .iter()
                    .any(|(_, f)| f.extraction.member_accesses.iter().any(|m| m.name == old));
            if unknown {
                return Err(RejectReason::UnknownReceiver { name: old.to_string() });
            }
        }

        let usages = graph.usages(id);
        if let Some(usage) = usages.iter().find(|u| u.certainty == Certainty::Ambiguous) {
            return Err(RejectReason::AmbiguousReference {
                file: usage.file.clone(),
                line: usage.span.start_line,
                name: old.to_string(),
            });
        }

        let mut edits = EditSet::default();
        edits.push(&symbol.file, TextEdit::of_span(symbol.name_span, new_name));

        let mut hints = self.identity_hints(id, &symbol.file, |q| {
            requalify(q, &symbol.qualified_name, &with_last_segment(&symbol.qualified_name, new_name))
        });

        // Import tokens along chains that carry the name unchanged.
        let mut renamed_bindings: BTreeSet<SymbolId> = BTreeSet::new();
        let mut listing_files: BTreeSet<PathBuf> = BTreeSet::new();
        if symbol.is_top_level() {
            listing_files.insert(symbol.file.clone());
        }
        for importer in graph.importers_of(id) {
            let Some(binding) = importer.kind.as_import() else {
                continue;
            };
            let ImportResolution::Symbol { via, .. } = &binding.resolution else {
                continue;
            };
            if binding.imported.as_deref() != Some(old) || !name_flows(graph, via) {
                continue;
            }
            let token = binding.imported_span.ok_or_else(|| RejectReason::UnsupportedUsage {
                file: importer.file.clone(),
                line: importer.span.start_line,
                detail: format!("import of `{old}` has no name token"),
            })?;
            edits.push(&importer.file, TextEdit::of_span(token, new_name));
            if binding.alias.is_some() {
                continue;
            }

            let file = self.source(&importer.file)?;
            let scope = file.extraction.symbols.get(importer.index).map_or(0, |s| s.scope);
            let taken = file
                .extraction
                .scopes
                .get(scope)
                .is_some_and(|s| s.bindings.contains_key(new_name))
                || file.extraction.module_symbols_named(new_name).next().is_some();
            if taken {
                return Err(collision(&importer.file));
            }
            renamed_bindings.insert(importer.id);
            if importer.parent.is_none() {
                listing_files.insert(importer.file.clone());
            }
            hints.push(IdentityHint {
                id: importer.id,
                file: importer.file.clone(),
                qualified_name: with_last_segment(&importer.qualified_name, new_name),
                kind: importer.kind.tag(),
            });
        }

        // Every resolved use.
        for (_, edge) in graph.incoming(id) {
            let Some(site) = edge.site.as_ref().filter(|_| edge.kind.is_usage()) else {
                continue;
            };
            let file = self.source(&site.file)?;
            let ext = &file.extraction;
            let Some(reference) = ext.sites.get(site.index) else {
                continue;
            };
            let Some(token) = reference.segment_spans.get(site.segment).copied() else {
                continue;
            };
            if token.slice(&file.text) != old {
                continue;
            }
            if site.segment == 0 {
                let via_binding = edge.via.and_then(|v| graph.symbol(v));
                let wildcard = via_binding
                    .and_then(|b| b.kind.as_import())
                    .is_some_and(|b| b.form == ImportForm::Wildcard);
                let bound_in = match via_binding {
                    None => Some(declared_in),
                    Some(_) if wildcard => Some(0),
                    Some(b) if renamed_bindings.contains(&b.id) => {
                        Some(ext.symbols.get(b.index).map_or(0, |s| s.scope))
                    }
                    Some(_) => None,
                };
                let Some(bound_in) = bound_in else {
                    continue;
                };
                check_capture(ext, reference.scope, bound_in, new_name, &site.file, site.span.start_line)?;
                if wildcard && ext.module_symbols_named(new_name).next().is_some() {
                    return Err(collision(&site.file));
                }
            }
            edits.push(&site.file, TextEdit::of_span(token, new_name));
        }

        // `__all__` listings in files whose module-level name changed.
        for path in &listing_files {
            let file = self.source(path)?;
            for (_, span) in file.extraction.export_list.iter().flatten().filter(|(n, _)| n == old) {
                edits.push(path, TextEdit::of_span(*span, new_name));
            }
        }

        debug!(
            symbol = %id,
            from = old,
            to = new_name,
            usages = usages.len(),
            bindings = renamed_bindings.len(),
            "Planned rename"
        );
        let file = symbol.file.clone();
        let before = usages.len();
        self.commit(edits, &hints)?;
        self.verify_identity(id, &file, new_name, before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodeweaveConfig;
    use crate::transaction::{validate, Operation, Transaction, TransactionError};
    use crate::workspace::Workspace;
    use std::fs;
    use tempfile::tempdir;

    fn workspace(files: &[(&str, &str)]) -> (tempfile::TempDir, Workspace) {
        let dir = tempdir().unwrap();
        for (rel, text) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let mut config = CodeweaveConfig::default();
        config.cache.enabled = false;
        let ws = Workspace::load(dir.path(), config).unwrap();
        (dir, ws)
    }

    fn plan_rename(ws: &Workspace, file: &str, qname: &str, new_name: &str) -> Result<Transaction, RejectReason> {
        let symbol = ws.graph().find_qualified(Path::new(file), qname).unwrap();
        let mut tx = Transaction::single(Operation::RenameSymbol {
            symbol,
            new_name: new_name.into(),
        });
        match validate(ws, &mut tx) {
            Ok(_) => Ok(tx),
            Err(TransactionError::Rejected { reason }) => Err(reason),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requalify() {
        assert_eq!(requalify("Box.open", "Box", "Crate"), "Crate.open");
        assert_eq!(requalify("Boxer", "Box", "Crate"), "Boxer");
        assert_eq!(with_last_segment("Box.open", "close"), "Box.close");
    }

    #[test]
    fn test_rename_across_import() {
        let (_dir, ws) = workspace(&[
            ("util.py", "__all__ = ['helper']\n\n\ndef helper():\n    pass\n"),
            ("main.py", "from util import helper\nimport util\n\nhelper()\nutil.helper()\n"),
        ]);
        let tx = plan_rename(&ws, "util.py", "helper", "assist").unwrap();
        assert_eq!(
            tx.planned_text(Path::new("util.py")),
            Some("__all__ = ['assist']\n\n\ndef assist():\n    pass\n")
        );
        assert_eq!(
            tx.planned_text(Path::new("main.py")),
            Some("from util import assist\nimport util\n\nassist()\nutil.assist()\n")
        );
    }

    #[test]
    fn test_rename_keeps_alias() {
        let (_dir, ws) = workspace(&[
            ("util.js", "export function helper() {}\n"),
            ("main.js", "import { helper as h } from './util';\n\nh();\n"),
        ]);
        let tx = plan_rename(&ws, "util.js", "helper", "assist").unwrap();
        assert_eq!(
            tx.planned_text(Path::new("main.js")),
            Some("import { assist as h } from './util';\n\nh();\n")
        );
    }

    #[test]
    fn test_rename_rejections() {
        let (_dir, ws) = workspace(&[(
            "a.py",
            "def helper():\n    pass\n\n\ndef run():\n    assist = 1\n    helper()\n    return assist\n\n\nclass A:\n    def go(self):\n        pass\n\n\ndef poke(x):\n    x.go()\n",
        )]);
        assert!(matches!(
            plan_rename(&ws, "a.py", "helper", "assist"),
            Err(RejectReason::LocalCapture { .. })
        ));
        assert!(matches!(
            plan_rename(&ws, "a.py", "helper", "run"),
            Err(RejectReason::NameCollision { .. })
        ));
        assert!(matches!(
            plan_rename(&ws, "a.py", "helper", "1st"),
            Err(RejectReason::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            plan_rename(&ws, "a.py", "A.go", "leave"),
            Err(RejectReason::UnknownReceiver { .. })
        ));
    }
}
