//! Chapter file layout and lifecycle.
//!
//! Content is written to `<final>.part`, fsynced, then renamed into place, so
//! a chapter file either exists complete or not at all.

mod sanitize;
mod writer;

use std::path::{Path, PathBuf};

use crate::source::{ChapterId, SourceId};

pub use sanitize::sanitize_dir_name;
pub use writer::{write_chapter, ChapterWriteError, StoredChapter};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Extension of a finished chapter file.
pub const CHAPTER_EXT: &str = "bin";

/// Path for the temp file: appends `.part` to the final path.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// `<root>/<source>/<sanitized title>/`. Falls back to `manga` when the
/// title sanitizes to nothing.
pub fn manga_dir(root: &Path, source: SourceId, title: &str) -> PathBuf {
    let mut name = sanitize_dir_name(title);
    if name.is_empty() {
        name = "manga".to_string();
    }
    root.join(source.to_string()).join(name)
}

/// Final location of a downloaded chapter.
pub fn chapter_path(root: &Path, source: SourceId, title: &str, chapter: ChapterId) -> PathBuf {
    manga_dir(root, source, title).join(format!("{chapter}.{CHAPTER_EXT}"))
}
