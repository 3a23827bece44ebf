//! Checksum command: SHA-256 of a chapter file, or a check against a known digest.

use anyhow::{bail, Result};
use mangasync_core::checksum;
use std::path::Path;

pub async fn run_checksum(path: &Path, expect: Option<&str>) -> Result<()> {
    match expect {
        Some(expected) => {
            if !checksum::verify_file(path, expected).await? {
                bail!("checksum mismatch for {}: expected {expected}", path.display());
            }
            println!("{}: OK", path.display());
        }
        None => {
            let digest = checksum::sha256_file(path).await?;
            println!("{}  {}", digest, path.display());
        }
    }
    Ok(())
}
