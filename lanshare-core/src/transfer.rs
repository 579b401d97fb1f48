//! Whole-file transfer payloads: build `file_data`, decode and verify it, save it.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::integrity;
use crate::protocol::{self, Message};

/// Build a `file_data` message carrying `bytes` as standard base64.
pub fn file_data_message(file_hash: &str, file_name: &str, bytes: &[u8]) -> Message {
    Message::FileData {
        file_hash: file_hash.to_string(),
        file_name: file_name.to_string(),
        file_format: protocol::file_format(file_name),
        data: BASE64.encode(bytes),
    }
}

/// Decode a base64 payload and check it hashes to `expected_hash`.
pub fn decode_payload(data: &str, expected_hash: &str) -> Result<Vec<u8>, TransferError> {
    let bytes = BASE64.decode(data)?;
    if !integrity::verify(&bytes, expected_hash) {
        return Err(TransferError::HashMismatch {
            expected: expected_hash.to_string(),
            actual: integrity::hash_bytes(&bytes),
        });
    }
    Ok(bytes)
}

/// Suffix of in-progress download files. The index never lists them.
pub const PARTIAL_SUFFIX: &str = ".part";

/// True for a temp file written by `save`.
pub fn is_partial(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(PARTIAL_SUFFIX)
}

/// Write `bytes` to `dest`, creating parent directories. Data goes to a
/// sibling temp file first and is renamed into place.
pub fn save(dest: &Path, bytes: &[u8]) -> Result<(), TransferError> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(TransferError::Write)?;
    let file_name = dest
        .file_name()
        .ok_or_else(|| TransferError::Write(io::Error::new(io::ErrorKind::InvalidInput, "no file name")))?;
    let tmp = parent.join(format!(".{}{PARTIAL_SUFFIX}", file_name.to_string_lossy()));
    let result = (|| {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, dest)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(TransferError::Write)
}

/// Reduce a requested file name to a single safe path segment.
/// Returns None for names that have no usable final segment.
pub fn sanitize_file_name(requested: &str) -> Option<String> {
    let last = Path::new(requested.trim()).components().last()?;
    match last {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("write error: {0}")]
    Write(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{self, SAFE_DATAGRAM_LEN};

    #[test]
    fn base64_roundtrip_across_sizes() {
        // Largest raw size whose base64 still fits under the safe datagram size.
        let ceiling = (SAFE_DATAGRAM_LEN - 512) / 4 * 3;
        for len in [0usize, 1, 2, 3, 4096, ceiling] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 31) as u8).collect();
            let hash = integrity::hash_bytes(&bytes);
            let msg = file_data_message(&hash, "x.bin", &bytes);
            let datagram = wire::encode_datagram(&msg).unwrap();
            assert!(!wire::exceeds_safe_size(&datagram), "len {len}");
            let Message::FileData { data, .. } = wire::decode_datagram(&datagram).unwrap() else {
                panic!("expected FileData");
            };
            assert_eq!(decode_payload(&data, &hash).unwrap(), bytes);
        }
    }

    #[test]
    fn bad_base64_is_an_error() {
        assert!(matches!(
            decode_payload("@@not base64@@", &integrity::hash_bytes(b"")),
            Err(TransferError::Decode(_))
        ));
    }

    #[test]
    fn wrong_content_is_an_error() {
        let data = BASE64.encode(b"other");
        assert!(matches!(
            decode_payload(&data, &integrity::hash_bytes(b"expected")),
            Err(TransferError::HashMismatch { .. })
        ));
    }

    #[test]
    fn save_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("downloads/deep/report.pdf");
        save(&dest, b"content").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"content");
        let leftovers: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn partial_names() {
        assert!(is_partial(".report.pdf.part"));
        assert!(!is_partial("report.pdf"));
        assert!(!is_partial("notes.part"));
    }

    #[test]
    fn sanitize_keeps_last_segment() {
        assert_eq!(sanitize_file_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("dir/notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("/"), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[test]
    fn file_data_fields() {
        let msg = file_data_message("ab", "report.pdf", b"hi");
        assert_eq!(
            msg,
            Message::FileData {
                file_hash: "ab".into(),
                file_name: "report.pdf".into(),
                file_format: "pdf".into(),
                data: "aGk=".into(),
            }
        );
    }
}
