//! Input boundary: a container exposing a flat central index of entries.
//!
//! Parsing of the container format is delegated to a library (see
//! [`zip::ZipSource`]); this module defines the view the walker needs and the
//! classification of open/read failures into "not an archive" versus
//! "corrupt archive".

use std::io::{self, Read};

use thiserror::Error;

use crate::codec::CodecId;
use crate::entry::{EntryMetadata, Timestamps};

pub mod detect;
pub mod salvage;
pub mod zip;

pub use self::salvage::SalvageSource;
pub use self::zip::ZipSource;

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;

/// Does a Unix mode describe a directory?
pub fn is_dir_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

#[derive(Error, Debug)]
pub enum ContainerError {
    /// The stream carries no container signature at all.
    #[error("input is not a ZIP container")]
    NotAnArchive,
    /// The stream looks like a container but its structure is invalid.
    #[error("corrupt container: {reason}")]
    Corrupt { reason: String },
    #[error("entry index {index} out of range ({len} entries)")]
    NoSuchEntry { index: usize, len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ContainerError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        ContainerError::Corrupt { reason: reason.into() }
    }
}

/// One record of the container's central index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name exactly as stored.
    pub raw_path:          String,
    /// Trailing separator in the name, or directory file attributes.
    pub is_dir:            bool,
    pub codec:             CodecId,
    pub compressed_size:   u64,
    pub uncompressed_size: u64,
    pub crc32:             u32,
    /// Offset of the local header.
    pub header_start:      u64,
    /// Offset of the first compressed byte.
    pub data_start:        u64,
    pub version_major:     u8,
    pub version_minor:     u8,
    /// Unix seconds, 0 when the stored date is unusable.
    pub mtime:             i64,
}

impl ArchiveEntry {
    pub fn end_pos(&self) -> u64 {
        self.data_start + self.compressed_size
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            archive_name:      self.raw_path.clone(),
            codec:             self.codec,
            compressed_size:   self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            crc32:             self.crc32,
            start_pos:         self.header_start,
            end_pos:           self.end_pos(),
            version_major:     self.version_major,
            version_minor:     self.version_minor,
        }
    }

    pub fn timestamps(&self) -> Timestamps {
        Timestamps::modified(self.mtime)
    }
}

/// Random access to a container's central index, in stored order.
pub trait EntrySource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index record `index`. Reads the entry's local header, so structural
    /// damage to an entry surfaces here.
    fn entry(&mut self, index: usize) -> Result<ArchiveEntry, ContainerError>;

    /// The entry's compressed byte range, undecoded.
    fn raw(&mut self, index: usize) -> Result<Box<dyn Read + '_>, ContainerError>;
}
