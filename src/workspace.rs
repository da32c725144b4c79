//
//  workspace.rs
//  Codeweave
//

//! The file table and the graph derived from it.
//!
//! A `Workspace` is cheap to clone: file records sit behind `Arc`, so a
//! transaction's scratch copy shares every file it does not edit.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::cache::{hash_content, CacheBlob, CacheEntry, ChangeDetector};
use crate::config::CodeweaveConfig;
use crate::error::{Error, Result};
use crate::graph::{
    build_graph, discover, is_indexable, resolve_files, CodeGraph, ExtractionSet, FileExtraction,
    IdentityHint,
};
use crate::parser::{adapter_for, extract_file, ModuleContext, SupportedLanguage, SyntaxTree};

/// One source file: text, hash, extraction and (lazily) its syntax tree.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub hash: String,
    pub extraction: FileExtraction,
    tree: OnceLock<Option<Arc<SyntaxTree>>>,
}

impl SourceFile {
    /// Parse and extract `text`.
    pub fn parse(path: &Path, text: String) -> Result<Self> {
        let parsed = extract_file(path, &text)?;
        let tree = OnceLock::new();
        let _ = tree.set(Some(parsed.tree));
        Ok(Self {
            path: path.to_path_buf(),
            hash: hash_content(text.as_bytes()),
            text,
            extraction: parsed.extraction,
            tree,
        })
    }

    /// A file restored from the cache. Its tree is parsed on first use.
    pub fn cached(path: &Path, text: String, hash: String, extraction: FileExtraction) -> Self {
        Self {
            path: path.to_path_buf(),
            text,
            hash,
            extraction,
            tree: OnceLock::new(),
        }
    }

    pub fn language(&self) -> SupportedLanguage {
        self.extraction.language
    }

    pub fn is_clean(&self) -> bool {
        self.extraction.status.is_clean()
    }

    pub fn tree(&self) -> Option<Arc<SyntaxTree>> {
        self.tree
            .get_or_init(|| {
                adapter_for(self.language())
                    .parse(&self.text)
                    .map(|outcome| Arc::new(outcome.into_parts().0))
                    .map_err(|e| warn!(file = %self.path.display(), error = %e, "Re-parse failed"))
                    .ok()
            })
            .clone()
    }
}

/// Files by root-relative path.
#[derive(Debug, Clone, Default)]
pub struct FileTable(BTreeMap<PathBuf, Arc<SourceFile>>);

impl FileTable {
    pub fn get(&self, path: &Path) -> Option<&Arc<SourceFile>> {
        self.0.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Arc<SourceFile>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, file: Arc<SourceFile>) {
        self.0.insert(file.path.clone(), file);
    }

    fn remove(&mut self, path: &Path) -> Option<Arc<SourceFile>> {
        self.0.remove(path)
    }
}

impl ExtractionSet for FileTable {
    fn extraction(&self, path: &Path) -> Option<&FileExtraction> {
        self.0.get(path).map(|f| &f.extraction)
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.0.keys().cloned().collect()
    }
}

/// A change to feed through `Workspace::apply_changes`.
#[derive(Debug, Clone)]
pub enum FileChange {
    Upsert(Arc<SourceFile>),
    Remove(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Upsert(file) => &file.path,
            FileChange::Remove(path) => path,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub changed: usize,
    pub removed: usize,
    /// Files re-resolved: the changed files and their dependents.
    pub resolved: usize,
}

/// `[python] source_roots` as import roots relative to the project root.
pub fn module_context(config: &CodeweaveConfig) -> ModuleContext {
    let roots: Vec<PathBuf> = config
        .python
        .source_roots
        .iter()
        .map(|root| {
            let trimmed = root.trim_start_matches("./").trim_end_matches('/');
            if trimmed.is_empty() || trimmed == "." {
                PathBuf::new()
            } else {
                PathBuf::from(trimmed)
            }
        })
        .collect();
    if roots.is_empty() {
        ModuleContext::default()
    } else {
        ModuleContext { source_roots: roots }
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: Arc<CodeweaveConfig>,
    ctx: ModuleContext,
    files: FileTable,
    graph: CodeGraph,
    detector: ChangeDetector,
    generation: u64,
}

impl Workspace {
    /// Discover, parse (or restore from cache) and resolve every file.
    pub fn load(root: &Path, config: CodeweaveConfig) -> Result<Self> {
        let paths = discover(root, &config)?;
        let cache = if config.cache.enabled {
            CacheBlob::load(&config.resolve_cache_path(root))
        } else {
            None
        };

        let loaded: Vec<SourceFile> = paths
            .par_iter()
            .filter_map(|rel| {
                let text = match fs::read_to_string(root.join(rel)) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(file = %rel.display(), error = %e, "Skipping unreadable file");
                        return None;
                    }
                };
                let hash = hash_content(text.as_bytes());
                if let Some(extraction) = cache.as_ref().and_then(|c| c.lookup(rel, &hash)) {
                    return Some(SourceFile::cached(rel, text, hash, extraction.clone()));
                }
                SourceFile::parse(rel, text)
                    .map_err(|e| warn!(file = %rel.display(), error = %e, "Skipping unparseable file"))
                    .ok()
            })
            .collect();

        let mut files = FileTable::default();
        let mut detector = ChangeDetector::new();
        let mut from_cache = 0;
        for file in loaded {
            if file.tree.get().is_none() {
                from_cache += 1;
            }
            detector.record(&file.path, file.hash.clone());
            files.insert(Arc::new(file));
        }

        let ctx = module_context(&config);
        let graph = build_graph(&files, &ctx);
        info!(
            root = %root.display(),
            files = files.len(),
            cached = from_cache,
            "Workspace loaded"
        );
        Ok(Self {
            root: root.to_path_buf(),
            config: Arc::new(config),
            ctx,
            files,
            graph,
            detector,
            generation: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CodeweaveConfig {
        &self.config
    }

    pub fn module_context(&self) -> &ModuleContext {
        &self.ctx
    }

    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn file(&self, path: &Path) -> Option<&Arc<SourceFile>> {
        self.files.get(path)
    }

    /// Bumped by every applied change set.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Hash the workspace last saw for `path`.
    pub fn known_hash(&self, path: &Path) -> Option<&str> {
        self.detector.hash_of(path)
    }

    /// `path` relative to the root; relative paths are returned unchanged.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }

    /// Merge changed files into the table and graph, then re-resolve the
    /// blast radius: the changed files plus every file whose last
    /// resolution looked at one of them.
    pub fn apply_changes(&mut self, changes: Vec<FileChange>, hints: &[IdentityHint]) -> UpdateSummary {
        if changes.is_empty() {
            return UpdateSummary::default();
        }
        let changed: HashSet<PathBuf> = changes.iter().map(|c| c.path().to_path_buf()).collect();
        let mut blast: BTreeSet<PathBuf> = self.graph.dependents_of(&changed).into_iter().collect();

        let mut removed = Vec::new();
        let mut upserted = Vec::new();
        for change in changes {
            match change {
                FileChange::Upsert(file) => {
                    self.detector.record(&file.path, file.hash.clone());
                    upserted.push(file.path.clone());
                    self.files.insert(file);
                }
                FileChange::Remove(path) => {
                    self.detector.remove_hash(&path);
                    if self.files.remove(&path).is_some() {
                        removed.push(path);
                    }
                }
            }
        }

        let extractions: Vec<&FileExtraction> = upserted
            .iter()
            .filter_map(|p| self.files.extraction(p))
            .collect();
        self.graph.update_files(&extractions, &removed, hints);

        blast.extend(upserted.iter().cloned());
        let targets: Vec<PathBuf> = blast.into_iter().filter(|p| self.files.contains(p)).collect();
        resolve_files(&mut self.graph, &self.files, &targets, &self.ctx);
        self.generation += 1;

        let summary = UpdateSummary {
            changed: upserted.len(),
            removed: removed.len(),
            resolved: targets.len(),
        };
        debug!(
            changed = summary.changed,
            removed = summary.removed,
            resolved = summary.resolved,
            generation = self.generation,
            "Applied changes"
        );
        summary
    }

    /// Read `paths` from disk and turn real differences into changes.
    fn read_changes(&self, paths: &[PathBuf], force: bool) -> Vec<FileChange> {
        let candidates: Vec<PathBuf> = paths
            .iter()
            .map(|p| self.relative(p))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        candidates
            .par_iter()
            .filter_map(|rel| {
                let disk = self.root.join(rel);
                if !disk.is_file() {
                    return self.files.contains(rel).then(|| FileChange::Remove(rel.clone()));
                }
                if !self.files.contains(rel) && !is_indexable(&self.root, &self.config, rel) {
                    return None;
                }
                let text = match fs::read_to_string(&disk) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(file = %rel.display(), error = %e, "Skipping unreadable file");
                        return None;
                    }
                };
                if !force && !self.detector.is_changed(rel, text.as_bytes()) {
                    return None;
                }
                match SourceFile::parse(rel, text) {
                    Ok(file) => Some(FileChange::Upsert(Arc::new(file))),
                    Err(e) => {
                        warn!(file = %rel.display(), error = %e, "Skipping unparseable file");
                        None
                    }
                }
            })
            .collect()
    }

    /// Re-read the given files and apply whatever changed on disk.
    pub fn sync(&mut self, paths: &[PathBuf]) -> UpdateSummary {
        let changes = self.read_changes(paths, false);
        self.apply_changes(changes, &[])
    }

    /// Rescan the whole tree; only files whose hash differs are re-processed.
    pub fn refresh(&mut self) -> Result<UpdateSummary> {
        let mut paths = discover(&self.root, &self.config)?;
        paths.extend(self.files.paths());
        Ok(self.sync(&paths))
    }

    /// Re-parse and re-resolve everything. Symbol ids survive.
    pub fn rebuild(&mut self) -> Result<UpdateSummary> {
        let mut paths = discover(&self.root, &self.config)?;
        paths.extend(self.files.paths());
        let changes = self.read_changes(&paths, true);
        let mut summary = self.apply_changes(changes, &[]);
        let all = self.files.paths();
        resolve_files(&mut self.graph, &self.files, &all, &self.ctx);
        summary.resolved = all.len();
        Ok(summary)
    }

    /// Persist every file's hash and extraction.
    pub fn save_cache(&self) -> Result<()> {
        if !self.config.cache.enabled {
            return Ok(());
        }
        let mut blob = CacheBlob::default();
        for (path, file) in self.files.iter() {
            blob.entries.insert(
                path.clone(),
                CacheEntry {
                    hash: file.hash.clone(),
                    extraction: file.extraction.clone(),
                },
            );
        }
        blob.save(&self.config.resolve_cache_path(&self.root))
    }

    /// Graph invariants against the current file texts.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.graph
            .check_invariants(|path| self.files.get(path).map(|f| f.text.len()))
    }

    /// Text of a file, for callers that plan edits.
    pub fn text(&self, path: &Path) -> Result<&str> {
        self.files
            .get(path)
            .map(|f| f.text.as_str())
            .ok_or_else(|| Error::FileNotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn calls_to(ws: &Workspace, file: &str, qname: &str) -> usize {
        let id = ws.graph().find_qualified(Path::new(file), qname).unwrap();
        ws.graph().call_sites(id).len()
    }

    #[test]
    fn test_module_context_roots() {
        let mut config = CodeweaveConfig::default();
        config.python.source_roots = vec![".".to_string(), "./src/".to_string()];
        let ctx = module_context(&config);
        assert_eq!(ctx.source_roots, vec![PathBuf::new(), PathBuf::from("src")]);
    }

    #[test]
    fn test_sync_reresolves_dependents() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "util.py", "def helper():\n    pass\n");
        write(root, "main.py", "from util import helper\n\nhelper()\n");
        let mut ws = Workspace::load(root, CodeweaveConfig::default()).unwrap();
        let helper = ws.graph().find_qualified(Path::new("util.py"), "helper").unwrap();
        assert_eq!(calls_to(&ws, "util.py", "helper"), 1);

        write(root, "util.py", "# moved down\n\n\ndef helper():\n    return 1\n");
        let summary = ws.sync(&[root.join("util.py")]);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.resolved, 2);
        assert_eq!(ws.generation(), 1);
        assert_eq!(ws.graph().find_qualified(Path::new("util.py"), "helper"), Some(helper));
        assert_eq!(calls_to(&ws, "util.py", "helper"), 1);
        assert!(ws.check_invariants().is_ok());

        // Unchanged content is a no-op.
        let summary = ws.sync(&[PathBuf::from("util.py")]);
        assert_eq!(summary, UpdateSummary::default());
        assert_eq!(ws.generation(), 1);
    }

    #[test]
    fn test_new_file_satisfies_missing_import() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "main.py", "from util import helper\n\nhelper()\n");
        let mut ws = Workspace::load(root, CodeweaveConfig::default()).unwrap();
        assert_eq!(ws.graph().stats().call_edges, 0);

        write(root, "util.py", "def helper():\n    pass\n");
        let summary = ws.refresh().unwrap();
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.resolved, 2);
        assert_eq!(calls_to(&ws, "util.py", "helper"), 1);
    }

    #[test]
    fn test_removed_file_leaves_warning() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "util.py", "def helper():\n    pass\n");
        write(root, "main.py", "from util import helper\n\nhelper()\n");
        let mut ws = Workspace::load(root, CodeweaveConfig::default()).unwrap();

        fs::remove_file(root.join("util.py")).unwrap();
        let summary = ws.sync(&[PathBuf::from("util.py")]);
        assert_eq!(summary.removed, 1);
        assert!(ws.file(Path::new("util.py")).is_none());
        assert_eq!(ws.graph().stats().call_edges, 0);
        assert_eq!(ws.graph().stats().import_edges, 0);
        assert!(ws.check_invariants().is_ok());
    }

    #[test]
    fn test_warm_restart_uses_cache() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "util.py", "def helper():\n    pass\n");
        write(root, "main.py", "from util import helper\n\nhelper()\n");
        let ws = Workspace::load(root, CodeweaveConfig::default()).unwrap();
        ws.save_cache().unwrap();
        assert!(root.join(".codeweave/cache.bin").exists());

        write(root, "main.py", "from util import helper\n\nhelper()\nhelper()\n");
        let warm = Workspace::load(root, CodeweaveConfig::default()).unwrap();
        let util = warm.file(Path::new("util.py")).unwrap();
        assert!(util.tree.get().is_none());
        assert!(util.tree().is_some());
        assert!(warm.file(Path::new("main.py")).unwrap().tree.get().is_some());
        assert_eq!(calls_to(&warm, "util.py", "helper"), 2);
        assert_eq!(warm.graph().stats().import_edges, 1);
    }

    #[test]
    fn test_rebuild_keeps_ids() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "def f():\n    pass\n\nf()\n");
        let mut ws = Workspace::load(root, CodeweaveConfig::default()).unwrap();
        let f = ws.graph().find_qualified(Path::new("a.py"), "f").unwrap();
        let summary = ws.rebuild().unwrap();
        assert_eq!(summary.resolved, 1);
        assert_eq!(ws.graph().find_qualified(Path::new("a.py"), "f"), Some(f));
        let calls = ws
            .graph()
            .usages(f)
            .into_iter()
            .filter(|u| u.kind == EdgeKind::Calls)
            .count();
        assert_eq!(calls, 1);
    }
}
