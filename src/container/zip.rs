//! [`EntrySource`] over a ZIP container, backed by the `zip` crate.
//!
//! Only the central directory and local headers are interpreted through the
//! library. Entry data is always handed out raw (`by_index_raw`) so codec
//! acceptance stays with [`CodecPolicy`](crate::codec::CodecPolicy).

use std::io::{self, Read, Seek};

use ::zip::result::ZipError;
use ::zip::{CompressionMethod, DateTime, ZipArchive};
use chrono::NaiveDate;

use super::{detect, is_dir_mode, ArchiveEntry, ContainerError, EntrySource};
use crate::codec::CodecId;

pub struct ZipSource<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ZipSource<R> {
    /// Parse the central directory.
    ///
    /// A stream the parser rejects is `NotAnArchive` unless it carries a ZIP
    /// signature (see [`detect::has_zip_signature`]), in which case it is
    /// `Corrupt` and worth a [`SalvageSource`](super::SalvageSource) pass.
    pub fn open(mut reader: R) -> Result<Self, ContainerError> {
        let signed = detect::has_zip_signature(&mut reader)?;
        match ZipArchive::new(reader) {
            Ok(archive) => Ok(Self { archive }),
            Err(e) => Err(match classify(e) {
                ContainerError::Corrupt { .. } if !signed => ContainerError::NotAnArchive,
                other => other,
            }),
        }
    }

    fn check(&self, index: usize) -> Result<(), ContainerError> {
        let len = self.archive.len();
        if index >= len {
            return Err(ContainerError::NoSuchEntry { index, len });
        }
        Ok(())
    }
}

impl<R: Read + Seek> EntrySource for ZipSource<R> {
    fn len(&self) -> usize {
        self.archive.len()
    }

    fn entry(&mut self, index: usize) -> Result<ArchiveEntry, ContainerError> {
        self.check(index)?;
        let file = self.archive.by_index_raw(index).map_err(classify)?;
        let (version_major, version_minor) = file.version_made_by();
        Ok(ArchiveEntry {
            raw_path:          file.name().to_owned(),
            is_dir:            file.is_dir() || file.unix_mode().map_or(false, is_dir_mode),
            codec:             CodecId::from_method(method_number(file.compression())),
            compressed_size:   file.compressed_size(),
            uncompressed_size: file.size(),
            crc32:             file.crc32(),
            header_start:      file.header_start(),
            data_start:        file.data_start(),
            version_major,
            version_minor,
            mtime:             dos_to_unix(file.last_modified()),
        })
    }

    fn raw(&mut self, index: usize) -> Result<Box<dyn Read + '_>, ContainerError> {
        self.check(index)?;
        let file = self.archive.by_index_raw(index).map_err(classify)?;
        Ok(Box::new(file))
    }
}

fn classify(err: ZipError) -> ContainerError {
    match err {
        ZipError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            ContainerError::corrupt(format!("truncated: {e}"))
        }
        ZipError::Io(e) => ContainerError::Io(e),
        ZipError::InvalidArchive(reason) => ContainerError::corrupt(reason),
        ZipError::UnsupportedArchive(reason) => ContainerError::corrupt(reason),
        other => ContainerError::corrupt(other.to_string()),
    }
}

fn method_number(method: CompressionMethod) -> u16 {
    #[allow(deprecated)]
    method.to_u16()
}

/// DOS date/time fields read as UTC; impossible dates become 0.
pub(super) fn dos_to_unix(dt: DateTime) -> i64 {
    NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)
        .and_then(|d| d.and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32))
        .map(|t| t.and_utc().timestamp())
        .unwrap_or(0)
}
