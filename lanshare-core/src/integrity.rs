//! Integrity: SHA-256 content hashes (hex) for files and payloads, verify on receive.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Read size used when streaming a file through the hasher.
pub const HASH_READ_SIZE: usize = 4096;

/// Hash a payload. Returns lowercase hex of the 32-byte digest.
pub fn hash_bytes(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Hash everything `reader` yields, in fixed-size reads.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_READ_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_file(path: &Path) -> io::Result<String> {
    hash_reader(File::open(path)?)
}

/// Verify payload against expected hex hash (case-insensitive).
pub fn verify(payload: &[u8], expected_hash: &str) -> bool {
    hash_bytes(payload).eq_ignore_ascii_case(expected_hash)
}
