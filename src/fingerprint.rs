//! Content fingerprinting for uploaded files.
//!
//! The fingerprint is a SHA-256 digest of the file bytes, streamed in fixed
//! 4096-byte blocks so large uploads never need to be held in memory. The
//! digest is independent of the read block size, so byte-identical files
//! always produce the same fingerprint regardless of filename or how they
//! were written.
//!
//! The fingerprint names the persisted collection (`doc_<digest>`) and is
//! compared against the session's last-processed fingerprint to skip
//! reprocessing of an unchanged file.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const READ_BLOCK_BYTES: usize = 4096;

/// Compute the content fingerprint of a file as a lowercase hex string.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for fingerprinting: {}", path.display()))?;
    fingerprint_reader(file)
}

/// Fingerprint any byte stream. Exposed for tests and non-file callers.
pub fn fingerprint_reader(mut reader: impl Read) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut block = [0u8; READ_BLOCK_BYTES];
    loop {
        let n = reader.read(&mut block)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Derive the persisted collection identifier from a fingerprint.
/// One collection per distinct content, never per filename.
pub fn collection_id(fingerprint: &str) -> String {
    format!("doc_{}", fingerprint)
}
