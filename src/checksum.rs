//! # Checksum Engine
//!
//! Streams a file through SHA-256 in bounded chunks and returns the lowercase
//! hex digest. Media files can be several gigabytes, so the file is never
//! held in memory.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read buffer size
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 hex digest of a file
pub async fn checksum_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
