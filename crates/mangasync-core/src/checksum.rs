//! SHA-256 of stored chapter files, for verifying them after the fact.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const BUF_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of a file, read in bounded chunks.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut f = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// True if the file's digest equals `expected` (case-insensitive hex).
pub async fn verify_file(path: &Path, expected: &str) -> Result<bool> {
    let actual = sha256_file(path).await?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}
