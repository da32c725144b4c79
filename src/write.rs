//! File writes for applied transactions: atomic replace, backup and revert.
//!
//! Every write goes through a sibling temp file followed by a rename, so a
//! reader never sees a half-written source file.

use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Parent directory missing for {0}")]
    MissingParent(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of one file write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub path: PathBuf,
    pub created: bool,
    pub time_ms: u64,
    pub lines_written: usize,
    pub bytes_written: usize,
}

/// Replace `path` with `content` via a temp file and rename.
pub fn write_atomic(path: &Path, content: &str, create_dirs: bool) -> Result<WriteResult, WriteError> {
    let start = std::time::Instant::now();
    let created = !path.exists();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            if !create_dirs {
                return Err(WriteError::MissingParent(path.to_path_buf()));
            }
            fs::create_dir_all(parent).map_err(|e| WriteError::io(parent, e))?;
        }
    }

    let temp = temp_path(path);
    let written = File::create(&temp)
        .and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&temp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(WriteError::io(path, e));
    }

    Ok(WriteResult {
        path: path.to_path_buf(),
        created,
        time_ms: start.elapsed().as_millis() as u64,
        lines_written: content.lines().count(),
        bytes_written: content.len(),
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.codeweave-tmp"))
}

/// A file's content before a transaction touched it.
#[derive(Debug, Clone)]
pub struct Backup {
    pub path: PathBuf,
    /// `None` when the file did not exist.
    pub original: Option<String>,
    /// Directories a write created, deepest first.
    created_dirs: Vec<PathBuf>,
}

impl Backup {
    pub fn capture(path: &Path) -> Result<Self, WriteError> {
        let original = match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(WriteError::io(path, e)),
        };
        let mut created_dirs = Vec::new();
        let mut dir = path.parent();
        while let Some(d) = dir.filter(|d| !d.as_os_str().is_empty() && !d.exists()) {
            created_dirs.push(d.to_path_buf());
            dir = d.parent();
        }
        Ok(Self {
            path: path.to_path_buf(),
            original,
            created_dirs,
        })
    }

    /// Put the file back the way it was captured.
    pub fn restore(&self) -> Result<(), WriteError> {
        match &self.original {
            Some(text) => write_atomic(&self.path, text, true).map(|_| ()),
            None => {
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(WriteError::io(&self.path, e)),
                }
                // Only empty directories go; anything else was not ours.
                for dir in &self.created_dirs {
                    let _ = fs::remove_dir(dir);
                }
                Ok(())
            }
        }
    }
}
