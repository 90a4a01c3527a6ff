//! Streaming SHA-1 computation
//!
//! Files are read in fixed-size chunks so memory use is independent of file
//! size; a multi-gigabyte artifact costs the same 64 KiB buffer as a tiny one.

use crate::errors::HashError;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Chunk size for streaming digest computation
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the SHA-1 digest of a file's content as lowercase hex.
///
/// Any open or read failure is returned as a `HashError`; a partially read
/// file never produces a digest.
pub fn sha1_file(path: &Path) -> Result<String, HashError> {
    let file = File::open(path).map_err(|source| HashError {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buffer).map_err(|source| HashError {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// SHA-1 of an in-memory buffer as lowercase hex (used by the seeder).
pub fn sha1_bytes(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}
