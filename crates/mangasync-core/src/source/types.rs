use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type MangaId = i64;
pub type ChapterId = i64;

/// Chapter content handed back by a provider.
pub type ChapterStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Identifier of a remote source (extension id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(SourceId)
    }
}

/// One chapter as listed by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRef {
    /// Source-relative chapter URL; together with the manga id it keys the sync record.
    pub url: String,
    pub name: String,
    pub chapter_number: f32,
    /// Upload time as Unix seconds (0 if the source does not report it).
    pub upload_date: i64,
}

impl ChapterRef {
    pub fn new(url: impl Into<String>, name: impl Into<String>, chapter_number: f32) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            chapter_number,
            upload_date: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_parses_and_displays() {
        let id: SourceId = " 2499283573021220255 ".parse().unwrap();
        assert_eq!(id, SourceId(2499283573021220255));
        assert_eq!(id.to_string(), "2499283573021220255");
        assert!("mangadex".parse::<SourceId>().is_err());
    }

    #[test]
    fn chapter_ref_serializes_camel_case() {
        let c = ChapterRef::new("/ch/1", "Chapter 1", 1.0);
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"chapterNumber\":1.0"));
        assert!(json.contains("\"uploadDate\":0"));
    }
}
