//! Content hashing for cache keys.
//!
//! Binaries are keyed by the SHA-256 of their bytes. The digest is only a
//! deduplication key: identical binaries share one cache slot no matter
//! which dump or module they came from.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::types::ContentDigest;

const READ_CHUNK: usize = 64 * 1024;

/// Hash the file at `path` without loading it into memory at once.
///
/// This is blocking I/O; async callers should run it on the blocking pool
/// (see [`LocalFilesystem`](crate::platform::LocalFilesystem)).
///
/// ## Errors
///
/// Returns any error from opening or reading the file.
pub fn hash_file(path: &Path) -> io::Result<ContentDigest>
{
    let mut reader = BufReader::with_capacity(READ_CHUNK, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(finish(hasher))
}

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> ContentDigest
{
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    finish(hasher)
}

fn finish(hasher: Sha256) -> ContentDigest
{
    let mut hex = String::with_capacity(64);
    for byte in hasher.finalize() {
        let _ = write!(hex, "{byte:02x}");
    }
    ContentDigest::from_hex(hex)
}
