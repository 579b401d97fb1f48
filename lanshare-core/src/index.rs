//! File index: walk the shared directory and address files by content hash.
//! No cache: every call rescans the disk, so results always reflect current state.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{integrity, transfer};

/// One shared file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub hash: String,
    pub path: PathBuf,
    pub name: String,
}

/// Read-only view of local files that the responder needs.
pub trait FileSource {
    /// Find a file by its final path segment.
    fn find_by_name(&self, name: &str) -> io::Result<Option<FileEntry>>;
    /// Find a file by content hash.
    fn find_by_hash(&self, hash: &str) -> io::Result<Option<FileEntry>>;
    /// Read a file's full contents.
    fn read(&self, entry: &FileEntry) -> io::Result<Vec<u8>>;
}

/// Index over a shared-files root.
#[derive(Debug, Clone)]
pub struct FileIndex {
    root: PathBuf,
}

impl FileIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Full scan: hash -> entry. A missing root is an empty index.
    /// Files with identical content collapse to one entry (first in walk order wins).
    /// Entries that vanish or cannot be read mid-scan are skipped; only an
    /// unreadable root fails the scan.
    pub fn scan(&self) -> io::Result<BTreeMap<String, FileEntry>> {
        let mut out = BTreeMap::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for dent in WalkDir::new(&self.root).sort_by_file_name() {
            let dent = match dent {
                Ok(d) => d,
                Err(e) if e.depth() == 0 => return Err(io::Error::from(e)),
                Err(e) => {
                    debug!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !dent.file_type().is_file() {
                continue;
            }
            let name = dent.file_name().to_string_lossy().into_owned();
            if transfer::is_partial(&name) {
                continue;
            }
            let path = dent.path().to_path_buf();
            let hash = match integrity::hash_file(&path) {
                Ok(h) => h,
                Err(e) => {
                    warn!(path = %path.display(), "skipping file: {e}");
                    continue;
                }
            };
            out.entry(hash.clone())
                .or_insert(FileEntry { hash, path, name });
        }
        Ok(out)
    }

    /// hash -> path for every shared file.
    pub fn list_all(&self) -> io::Result<BTreeMap<String, PathBuf>> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|(hash, entry)| (hash, entry.path))
            .collect())
    }

    pub fn entries(&self) -> io::Result<Vec<FileEntry>> {
        Ok(self.scan()?.into_values().collect())
    }

    pub fn lookup_by_hash(&self, hash: &str) -> io::Result<Option<PathBuf>> {
        Ok(self.find_by_hash(hash)?.map(|e| e.path))
    }

    pub fn lookup_by_name(&self, name: &str) -> io::Result<Option<String>> {
        Ok(self.find_by_name(name)?.map(|e| e.hash))
    }
}

impl FileSource for FileIndex {
    fn find_by_name(&self, name: &str) -> io::Result<Option<FileEntry>> {
        Ok(self.scan()?.into_values().find(|e| e.name == name))
    }

    fn find_by_hash(&self, hash: &str) -> io::Result<Option<FileEntry>> {
        Ok(self.scan()?.remove(&hash.to_ascii_lowercase()))
    }

    fn read(&self, entry: &FileEntry) -> io::Result<Vec<u8>> {
        fs::read(&entry.path)
    }
}
