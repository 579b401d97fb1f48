//! Manifests: per-file size, whole-file digest and chunk count.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{integrity, transfer};

/// Chunk size used for `chunk_count`.
pub const CHUNK_SIZE: u64 = 1024 * 1024; // 1 MiB

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileManifest {
    pub filename: String,
    pub size: u64,
    pub sha256: String,
    pub chunk_count: u64,
}

/// Number of `chunk_size` pieces needed to cover `total_len` bytes.
pub fn chunk_count(total_len: u64, chunk_size: u64) -> u64 {
    let size = if chunk_size == 0 { CHUNK_SIZE } else { chunk_size };
    total_len.div_ceil(size)
}

pub fn manifest_for_file(path: &Path) -> io::Result<FileManifest> {
    let size = fs::metadata(path)?.len();
    let sha256 = integrity::hash_file(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(FileManifest {
        filename,
        size,
        sha256,
        chunk_count: chunk_count(size, CHUNK_SIZE),
    })
}

/// Manifest for every file under `dir`, recursively, in file-name order.
/// In-progress downloads and files that vanish mid-walk are left out.
pub fn manifest_for_directory(dir: &Path) -> io::Result<Vec<FileManifest>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for dent in WalkDir::new(dir).sort_by_file_name() {
        let dent = match dent {
            Ok(d) => d,
            Err(e) if e.depth() == 0 => return Err(io::Error::from(e)),
            Err(e) => {
                debug!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !dent.file_type().is_file()
            || transfer::is_partial(&dent.file_name().to_string_lossy())
        {
            continue;
        }
        match manifest_for_file(dent.path()) {
            Ok(m) => out.push(m),
            Err(e) => warn!(path = %dent.path().display(), "skipping file: {e}"),
        }
    }
    Ok(out)
}
