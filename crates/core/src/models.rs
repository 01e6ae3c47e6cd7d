use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const FILE_SCHEME: &str = "file://";

/// Opaque content identifier. Equality is plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaUri(String);

impl MediaUri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(format!("{FILE_SCHEME}{}", path.to_string_lossy()))
    }

    /// `None` for paths that are not valid UTF-8, which could not be turned
    /// back into the same path.
    pub fn try_from_path(path: &Path) -> Option<Self> {
        path.to_str().map(|p| Self(format!("{FILE_SCHEME}{p}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local path for `file://` URIs, `None` for anything else.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        self.0
            .strip_prefix(FILE_SCHEME)
            .filter(|rest| !rest.is_empty())
            .map(PathBuf::from)
    }
}

impl fmt::Display for MediaUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaUri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MediaUri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub uri: MediaUri,
    pub is_video: bool,
    pub name: String,
    pub last_modified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub name: String,
    pub last_modified: i64,
    pub is_video: bool,
}

/// Raw columns returned by a content query; either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentInfo {
    pub display_name: Option<String>,
    pub date_modified: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Images,
    Videos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMediaEntry {
    pub display_name: String,
    pub mime_type: String,
    pub collection: Collection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOption {
    #[default]
    DateDesc,
    DateAsc,
    NameAsc,
    NameDesc,
}

impl FromStr for SortOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "date-desc" => Ok(Self::DateDesc),
            "date-asc" => Ok(Self::DateAsc),
            "name-asc" => Ok(Self::NameAsc),
            "name-desc" => Ok(Self::NameDesc),
            _ => Err(Error::InvalidArgument(format!("unknown sort option: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaFilter {
    #[default]
    All,
    ImagesOnly,
    VideosOnly,
}

impl MediaFilter {
    pub fn accepts(self, item: &MediaItem) -> bool {
        match self {
            MediaFilter::All => true,
            MediaFilter::ImagesOnly => !item.is_video,
            MediaFilter::VideosOnly => item.is_video,
        }
    }
}

impl FromStr for MediaFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "images" | "images-only" => Ok(Self::ImagesOnly),
            "videos" | "videos-only" => Ok(Self::VideosOnly),
            _ => Err(Error::InvalidArgument(format!("unknown filter: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestProgress {
    pub total_files: usize,
    pub processed_files: usize,
    pub current_file_name: String,
    pub loading_progress: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub requested: usize,
    pub skipped_existing: usize,
    pub copied: usize,
    pub fell_back: usize,
    pub added: Vec<MediaUri>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: usize,
    pub removed_legacy: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub migration: MigrationReport,
    pub duplicates_pruned: bool,
}
