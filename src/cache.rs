//! Content hashing and the warm-restart cache blob.
//!
//! `ChangeDetector` remembers a SHA-256 per file so unchanged files are
//! skipped on refresh. `CacheBlob` persists each file's hash together with
//! its extraction, so a restart only re-parses files that changed on disk.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::FileExtraction;

/// Bumped whenever the extraction format changes.
pub const CACHE_VERSION: u32 = 1;

/// Tracks file content hashes for change detection.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    known_hashes: HashMap<PathBuf, String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the file is new or its content hash differs.
    pub fn is_changed(&self, path: &Path, content: &[u8]) -> bool {
        self.known_hashes.get(path) != Some(&hash_content(content))
    }

    pub fn hash_of(&self, path: &Path) -> Option<&str> {
        self.known_hashes.get(path).map(String::as_str)
    }

    pub fn record(&mut self, path: &Path, hash: String) {
        self.known_hashes.insert(path.to_path_buf(), hash);
    }

    pub fn remove_hash(&mut self, path: &Path) {
        self.known_hashes.remove(path);
    }

    pub fn tracked_count(&self) -> usize {
        self.known_hashes.len()
    }
}

/// Lowercase hex SHA-256 of `content`.
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub extraction: FileExtraction,
}

/// On-disk cache: per file, the hash its extraction was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheBlob {
    pub version: u32,
    pub entries: BTreeMap<PathBuf, CacheEntry>,
}

impl Default for CacheBlob {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl CacheBlob {
    /// Extraction cached for `path`, if it was computed from `hash`.
    pub fn lookup(&self, path: &Path, hash: &str) -> Option<&FileExtraction> {
        self.entries
            .get(path)
            .filter(|entry| entry.hash == hash)
            .map(|entry| &entry.extraction)
    }

    /// Write the blob atomically: temp file, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("bin.tmp");
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            bincode::serialize_into(&mut writer, self)?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }
        fs::rename(&temp_path, path)?;
        debug!(path = %path.display(), entries = self.entries.len(), "Saved cache");
        Ok(())
    }

    /// Load a blob. A missing file, a corrupt blob or a version mismatch
    /// all yield `None`; the caller then parses from scratch.
    pub fn load(path: &Path) -> Option<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => {
                debug!(path = %path.display(), "No cache found");
                return None;
            }
        };
        let blob: CacheBlob = match bincode::deserialize_from(BufReader::new(file)) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt cache");
                return None;
            }
        };
        if blob.version != CACHE_VERSION {
            warn!(
                path = %path.display(),
                found = blob.version,
                expected = CACHE_VERSION,
                "Ignoring cache from another version"
            );
            return None;
        }
        debug!(path = %path.display(), entries = blob.entries.len(), "Loaded cache");
        Some(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract_file;
    use tempfile::tempdir;

    #[test]
    fn test_new_file_is_changed() {
        let detector = ChangeDetector::new();
        assert!(detector.is_changed(Path::new("a.py"), b"x = 1\n"));
    }

    #[test]
    fn test_same_content_not_changed() {
        let mut detector = ChangeDetector::new();
        detector.record(Path::new("a.py"), hash_content(b"x = 1\n"));
        assert!(!detector.is_changed(Path::new("a.py"), b"x = 1\n"));
        assert!(detector.is_changed(Path::new("a.py"), b"x = 2\n"));
        detector.remove_hash(Path::new("a.py"));
        assert!(detector.is_changed(Path::new("a.py"), b"x = 1\n"));
        assert_eq!(detector.tracked_count(), 0);
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = hash_content(b"");
        assert_eq!(hash, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn test_blob_round_trip_and_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".codeweave/cache.bin");
        let text = "def f():\n    pass\n";
        let extraction = extract_file(Path::new("a.py"), text).unwrap().extraction;
        let mut blob = CacheBlob::default();
        blob.entries.insert(
            PathBuf::from("a.py"),
            CacheEntry {
                hash: hash_content(text.as_bytes()),
                extraction: extraction.clone(),
            },
        );
        blob.save(&path).unwrap();

        let loaded = CacheBlob::load(&path).unwrap();
        let hash = hash_content(text.as_bytes());
        assert_eq!(loaded.lookup(Path::new("a.py"), &hash), Some(&extraction));
        assert!(loaded.lookup(Path::new("a.py"), "stale").is_none());
    }

    #[test]
    fn test_corrupt_and_foreign_blobs_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        fs::write(&path, b"not a cache").unwrap();
        assert!(CacheBlob::load(&path).is_none());

        let old = CacheBlob {
            version: CACHE_VERSION + 1,
            entries: BTreeMap::new(),
        };
        old.save(&path).unwrap();
        assert!(CacheBlob::load(&path).is_none());
        assert!(CacheBlob::load(&dir.path().join("missing.bin")).is_none());
    }
}
