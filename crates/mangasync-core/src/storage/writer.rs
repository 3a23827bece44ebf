//! Stream a chapter to disk while hashing it.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::source::ChapterStream;

use super::temp_path;

const BUF_SIZE: usize = 64 * 1024;

/// A chapter file that has been durably written and renamed into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChapter {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

/// Where writing a chapter went wrong: reading from the source or touching disk.
#[derive(Debug, thiserror::Error)]
pub enum ChapterWriteError {
    #[error("reading chapter content: {0}")]
    Source(#[source] io::Error),
    #[error("writing {path}: {source}")]
    Disk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn disk(path: &Path) -> impl FnOnce(io::Error) -> ChapterWriteError + '_ {
    move |source| ChapterWriteError::Disk {
        path: path.to_path_buf(),
        source,
    }
}

/// Copy `stream` to `final_path` via its `.part` file: fsync, then rename.
/// The temp file is removed if anything fails.
pub async fn write_chapter(
    final_path: &Path,
    stream: ChapterStream,
) -> Result<StoredChapter, ChapterWriteError> {
    let tmp = temp_path(final_path);
    let result = copy_and_finalize(&tmp, final_path, stream).await;
    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

async fn copy_and_finalize(
    tmp: &Path,
    final_path: &Path,
    mut stream: ChapterStream,
) -> Result<StoredChapter, ChapterWriteError> {
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await.map_err(disk(parent))?;
    }
    let mut file = File::create(tmp).await.map_err(disk(tmp))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = stream.read(&mut buf).await.map_err(ChapterWriteError::Source)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await.map_err(disk(tmp))?;
        bytes += n as u64;
    }
    file.flush().await.map_err(disk(tmp))?;
    file.sync_all().await.map_err(disk(tmp))?;
    drop(file);
    fs::rename(tmp, final_path).await.map_err(disk(final_path))?;

    Ok(StoredChapter {
        path: final_path.to_path_buf(),
        bytes,
        sha256: hex::encode(hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Yields some bytes, then fails like a dropped connection.
    struct Broken(bool);

    impl AsyncRead for Broken {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.0 {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
            }
            self.0 = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn writes_hashes_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("7").join("Title").join("42.bin");
        let stream: ChapterStream = Box::new(std::io::Cursor::new(b"hello\n".to_vec()));

        let stored = write_chapter(&final_path, stream).await.unwrap();
        assert_eq!(stored.bytes, 6);
        assert_eq!(
            stored.sha256,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello\n");
        assert!(!temp_path(&final_path).exists());
    }

    #[tokio::test]
    async fn source_failure_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("1.bin");

        let err = write_chapter(&final_path, Box::new(Broken(false)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChapterWriteError::Source(_)));
        assert!(!final_path.exists());
        assert!(!temp_path(&final_path).exists());
    }
}
