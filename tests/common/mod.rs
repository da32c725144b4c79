#![allow(dead_code)]

use codeweave::{Codebase, CodeweaveConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (rel, text) in files {
        write(dir.path(), rel, text);
    }
    dir
}

pub fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

pub fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

pub fn open(root: &Path) -> Codebase {
    let mut config = CodeweaveConfig::default();
    config.cache.enabled = false;
    Codebase::load_with_config(root, config).unwrap()
}

/// Every symbol with the sorted locations of its uses, keyed by where it
/// is declared. Ids are left out so two loads compare equal.
pub fn usage_map(codebase: &Codebase) -> BTreeMap<(PathBuf, String), Vec<(PathBuf, usize, usize)>> {
    codebase.with_workspace(|ws| {
        let graph = ws.graph();
        let mut map = BTreeMap::new();
        for file in graph.files() {
            for &id in graph.symbols_in(file) {
                let Some(symbol) = graph.symbol(id) else { continue };
                let mut uses: Vec<_> = graph
                    .usages(id)
                    .into_iter()
                    .map(|u| (u.file, u.span.start, u.span.end))
                    .collect();
                uses.sort();
                map.insert((symbol.file.clone(), symbol.qualified_name.clone()), uses);
            }
        }
        map
    })
}
