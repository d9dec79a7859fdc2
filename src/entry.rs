//! Catalog data model: identities, lifecycle status and the records handed
//! to a [`CatalogSink`](crate::sink::CatalogSink).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::CodecId;

/// Opaque handle assigned by the catalog when an entry is created.
/// Never reused within a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a cataloged entry.
///
/// `Created` is the only non-terminal state this crate produces; every entry
/// it touches ends in `ReadyForAnalysis` or `AnalysisFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Created,
    ReadyForAnalysis,
    AnalysisFailed,
}

/// Descriptive payload copied from the container's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Path exactly as stored in the container.
    pub archive_name:      String,
    pub codec:             CodecId,
    pub compressed_size:   u64,
    pub uncompressed_size: u64,
    pub crc32:             u32,
    /// Offset of the entry's local header.
    pub start_pos:         u64,
    /// One past the last byte of the entry's compressed data.
    pub end_pos:           u64,
    pub version_major:     u8,
    pub version_minor:     u8,
}

/// Unix-second timestamps; 0 means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub ctime:  i64,
    pub crtime: i64,
    pub atime:  i64,
    pub mtime:  i64,
}

impl Timestamps {
    pub fn modified(mtime: i64) -> Self {
        Self { mtime, ..Self::default() }
    }
}

/// Everything the catalog needs to create an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    /// Final path component only.
    pub name:       String,
    pub parent:     EntryId,
    pub is_dir:     bool,
    pub size:       u64,
    /// `None` for synthesized directories.
    pub metadata:   Option<EntryMetadata>,
    pub timestamps: Timestamps,
    pub full_path:  String,
}

impl NewEntry {
    /// A directory with no counterpart in the container's index.
    pub fn synthesized_dir(name: &str, parent: EntryId, full_path: String) -> Self {
        Self {
            name:       name.to_owned(),
            parent,
            is_dir:     true,
            size:       0,
            metadata:   None,
            timestamps: Timestamps::default(),
            full_path,
        }
    }
}

/// A cataloged entry as stored by an in-process catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id:         EntryId,
    pub parent:     EntryId,
    pub name:       String,
    pub is_dir:     bool,
    pub size:       u64,
    pub metadata:   Option<EntryMetadata>,
    pub timestamps: Timestamps,
    pub full_path:  String,
    pub status:     EntryStatus,
}

impl Entry {
    pub fn from_new(id: EntryId, new: NewEntry) -> Self {
        Entry {
            id,
            parent:     new.parent,
            name:       new.name,
            is_dir:     new.is_dir,
            size:       new.size,
            metadata:   new.metadata,
            timestamps: new.timestamps,
            full_path:  new.full_path,
            status:     EntryStatus::Created,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// The archive file itself: root parent of every top-level entry and prefix
/// of every cataloged full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub identity:  EntryId,
    pub full_path: String,
}

impl Container {
    pub fn new(identity: EntryId, full_path: impl Into<String>) -> Self {
        Self { identity, full_path: full_path.into() }
    }

    /// Logical path of `sub_path` inside this container.
    pub fn join(&self, sub_path: &str) -> String {
        let base = self.full_path.trim_end_matches(['/', '\\']);
        if base.is_empty() {
            sub_path.to_owned()
        } else {
            format!("{base}/{sub_path}")
        }
    }
}
