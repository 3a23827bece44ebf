use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseEnumError;

/// The two batch processes; at most one run of each kind is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Library update: fetch chapter lists for many manga.
    Update,
    /// Chapter download: fetch chapter content to local storage.
    Download,
}

impl RunKind {
    pub const ALL: [RunKind; 2] = [RunKind::Update, RunKind::Download];

    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Update => "update",
            RunKind::Download => "download",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(RunKind::Update),
            "download" => Ok(RunKind::Download),
            other => Err(ParseEnumError::new("run kind", other)),
        }
    }
}
