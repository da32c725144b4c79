//! File-system watching: debounced change events feed
//! [`Codebase::notify_changed`], so the next query sees them.

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::codebase::Codebase;
use crate::config::STATE_DIR;
use crate::error::{Error, Result};
use crate::parser::SupportedLanguage;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Keeps the watch alive; dropping it stops delivery.
pub struct WatchHandle {
    _debouncer: Debouncer<RecommendedWatcher>,
    root: PathBuf,
}

impl WatchHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Whether a changed path can affect the graph.
pub fn is_relevant(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    if rel.components().any(|c| c.as_os_str() == STATE_DIR) {
        return false;
    }
    SupportedLanguage::from_path(rel).is_some()
}

pub fn watch(codebase: Arc<Codebase>) -> Result<WatchHandle> {
    watch_with_debounce(codebase, DEFAULT_DEBOUNCE)
}

pub fn watch_with_debounce(codebase: Arc<Codebase>, debounce: Duration) -> Result<WatchHandle> {
    let root = codebase.root().to_path_buf();
    let filter_root = root.clone();
    let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
        Ok(events) => {
            let paths: BTreeSet<PathBuf> = events
                .into_iter()
                .map(|e| e.path)
                .filter(|p| is_relevant(&filter_root, p))
                .collect();
            if !paths.is_empty() {
                debug!(files = paths.len(), "File changes observed");
                codebase.notify_changed(paths);
            }
        }
        Err(e) => error!(error = %e, "Watch error"),
    })
    .map_err(|e| Error::Io(std::io::Error::other(format!("Failed to create debouncer: {e}"))))?;

    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "Failed to watch {}: {e}",
                root.display()
            )))
        })?;
    info!(root = %root.display(), "Watching for changes");

    Ok(WatchHandle {
        _debouncer: debouncer,
        root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodeweaveConfig;
    use tempfile::tempdir;

    #[test]
    fn test_is_relevant() {
        let root = Path::new("/work");
        assert!(is_relevant(root, Path::new("/work/src/app.py")));
        assert!(is_relevant(root, Path::new("/work/web/index.js")));
        assert!(!is_relevant(root, Path::new("/work/README.md")));
        assert!(!is_relevant(root, Path::new("/work/.codeweave/cache.bin")));
        assert!(!is_relevant(root, Path::new("/work/.app.py.codeweave-tmp")));
    }

    #[test]
    fn test_watch_starts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let mut config = CodeweaveConfig::default();
        config.cache.enabled = false;
        let codebase = Arc::new(Codebase::load_with_config(dir.path(), config).unwrap());
        let handle = watch(Arc::clone(&codebase)).unwrap();
        assert_eq!(handle.root(), codebase.root());
    }
}
