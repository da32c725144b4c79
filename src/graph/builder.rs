//
//  builder.rs
//  Codeweave
//

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::engine::CodeGraph;
use super::resolver::resolve_files;
use super::types::FileExtraction;
use super::ExtractionSet;
use crate::config::CodeweaveConfig;
use crate::error::{Error, Result};
use crate::parser::{extract_file, ModuleContext, ParsedFile, SupportedLanguage};

/// Directories that should never be indexed, even without .gitignore.
const BUILTIN_IGNORE: &[&str] = &[
    "node_modules",
    "vendor",
    "dist",
    "build",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".tox",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    "target",
    ".next",
    ".nuxt",
    "coverage",
    ".cache",
    ".turbo",
    ".output",
    ".codeweave",
];

/// Check if a path contains any built-in ignored directory.
fn is_builtin_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        if let std::path::Component::Normal(name) = c {
            BUILTIN_IGNORE.contains(&name.to_str().unwrap_or(""))
        } else {
            false
        }
    })
}

/// Configured exclude globs as an ignore override.
fn exclusions(root: &Path, config: &CodeweaveConfig) -> Result<Override> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in &config.project.exclude {
        if let Err(e) = overrides.add(&format!("!{pattern}")) {
            warn!(pattern = %pattern, error = %e, "Ignoring invalid exclude pattern");
        }
    }
    overrides
        .build()
        .map_err(|e| Error::InvalidInput(format!("exclude patterns: {e}")))
}

/// Whether a single root-relative path would be indexed. Used for paths
/// reported by change notifications, which bypass the directory walk.
pub fn is_indexable(root: &Path, config: &CodeweaveConfig, rel: &Path) -> bool {
    if is_builtin_ignored(rel) || !SupportedLanguage::from_path(rel).is_some_and(|l| config.language_enabled(l)) {
        return false;
    }
    let Ok(overrides) = exclusions(root, config) else {
        return true;
    };
    let mut prefix = PathBuf::new();
    let components: Vec<_> = rel.components().collect();
    for (i, component) in components.iter().enumerate() {
        prefix.push(component);
        let is_dir = i + 1 < components.len();
        if overrides.matched(root.join(&prefix), is_dir).is_ignore() {
            return false;
        }
    }
    true
}

/// Source files under `root`, relative to it and sorted.
///
/// Respects .gitignore and the configured ignore file, skips vendor and build
/// directories, and keeps only languages enabled in config.
pub fn discover(root: &Path, config: &CodeweaveConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::RootNotFound(root.to_path_buf()));
    }
    let overrides = exclusions(root, config)?;

    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(&config.project.ignore_file)
        .overrides(overrides)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .filter(|rel| !is_builtin_ignored(rel))
        .filter(|rel| SupportedLanguage::from_path(rel).is_some_and(|l| config.language_enabled(l)))
        .collect();
    files.sort();

    debug!(root = %root.display(), files = files.len(), "Discovered source files");
    Ok(files)
}

/// Read the given files in parallel. Unreadable files are skipped.
pub fn read_sources(root: &Path, paths: &[PathBuf]) -> Vec<(PathBuf, String)> {
    paths
        .par_iter()
        .filter_map(|rel| match fs::read_to_string(root.join(rel)) {
            Ok(text) => Some((rel.clone(), text)),
            Err(e) => {
                warn!(file = %rel.display(), error = %e, "Skipping unreadable file");
                None
            }
        })
        .collect()
}

/// Parse and extract files on the rayon pool. Output order follows input.
pub fn extract_parallel(sources: &[(PathBuf, String)]) -> Vec<(PathBuf, Result<ParsedFile>)> {
    sources
        .par_iter()
        .map(|(path, text)| (path.clone(), extract_file(path, text)))
        .collect()
}

/// Build a fully resolved graph from a set of extractions.
pub fn build_graph(files: &dyn ExtractionSet, ctx: &ModuleContext) -> CodeGraph {
    let paths = files.paths();
    let extractions: Vec<&FileExtraction> = paths.iter().filter_map(|p| files.extraction(p)).collect();

    let mut graph = CodeGraph::new();
    graph.update_files(&extractions, &[], &[]);
    resolve_files(&mut graph, files, &paths, ctx);

    let stats = graph.stats();
    info!(
        files = stats.file_count,
        symbols = stats.symbol_count,
        edges = stats.total_edges,
        warnings = stats.warnings,
        "Graph built"
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_discover_skips_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "main.py", "print(1)\n");
        write(root, "lib/util.js", "export const a = 1;\n");
        write(root, "node_modules/pkg/index.js", "module.exports = 1;\n");
        write(root, "gen/out.py", "X = 1\n");
        write(root, "skip/me.py", "X = 1\n");
        write(root, "README.md", "# readme\n");
        write(root, ".codeweaveignore", "gen/\n");

        let mut config = CodeweaveConfig::default();
        config.project.exclude = vec!["skip".to_string()];
        let files = discover(root, &config).unwrap();
        assert_eq!(files, vec![PathBuf::from("lib/util.js"), PathBuf::from("main.py")]);
    }

    #[test]
    fn test_discover_honours_languages() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.py", "");
        write(dir.path(), "b.js", "");
        let mut config = CodeweaveConfig::default();
        config.project.languages = vec!["javascript".to_string()];
        assert_eq!(discover(dir.path(), &config).unwrap(), vec![PathBuf::from("b.js")]);
    }

    #[test]
    fn test_is_indexable() {
        let dir = tempdir().unwrap();
        let mut config = CodeweaveConfig::default();
        config.project.exclude = vec!["skip".to_string()];
        assert!(is_indexable(dir.path(), &config, Path::new("pkg/mod.py")));
        assert!(!is_indexable(dir.path(), &config, Path::new("skip/mod.py")));
        assert!(!is_indexable(dir.path(), &config, Path::new("node_modules/x/index.js")));
        assert!(!is_indexable(dir.path(), &config, Path::new("notes.txt")));
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let err = discover(&dir.path().join("nope"), &CodeweaveConfig::default()).unwrap_err();
        assert!(matches!(err, Error::RootNotFound(_)));
    }

    #[test]
    fn test_build_graph() {
        let sources = vec![
            (PathBuf::from("util.py"), "def helper():\n    return 1\n".to_string()),
            (
                PathBuf::from("main.py"),
                "from util import helper\n\nhelper()\n".to_string(),
            ),
        ];
        let files: BTreeMap<PathBuf, FileExtraction> = extract_parallel(&sources)
            .into_iter()
            .map(|(path, parsed)| (path, parsed.unwrap().extraction))
            .collect();
        let graph = build_graph(&files, &ModuleContext::default());
        let stats = graph.stats();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.symbol_count, 1);
        assert_eq!(stats.import_count, 1);
        assert_eq!(stats.call_edges, 1);
        assert_eq!(stats.import_edges, 1);
    }
}
