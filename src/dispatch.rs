//! Extraction of regular-file entries: codec policy, decoding, content
//! storage and scheduling. Decides each file entry's final status.

use tracing::{debug, error, warn};

use crate::archive::ExtractOptions;
use crate::codec::verify::{Expected, VerifyingReader};
use crate::container::{ArchiveEntry, ContainerError, EntrySource};
use crate::entry::{EntryId, EntryStatus};
use crate::error::EntryError;
use crate::sink::{Services, Stage};

/// What happened to one file entry.
#[derive(Debug)]
pub struct Dispatched {
    pub status: EntryStatus,
    /// Bytes handed to the content sink, if storing succeeded.
    pub stored: Option<u64>,
    pub error:  Option<EntryError>,
}

impl Dispatched {
    fn ready(stored: u64) -> Self {
        Self { status: EntryStatus::ReadyForAnalysis, stored: Some(stored), error: None }
    }

    fn failed(error: EntryError) -> Self {
        Self { status: EntryStatus::AnalysisFailed, stored: None, error: Some(error) }
    }
}

pub struct Dispatcher<'a> {
    services: Services<'a>,
    options:  &'a ExtractOptions,
}

impl<'a> Dispatcher<'a> {
    pub fn new(services: Services<'a>, options: &'a ExtractOptions) -> Self {
        Self { services, options }
    }

    /// Extract entry `index` of `source`, already cataloged as `id`.
    ///
    /// Entry-level problems come back inside [`Dispatched`]. Only a failure to
    /// reach the entry's bytes in the container is returned as an error.
    pub fn dispatch<S: EntrySource + ?Sized>(
        &self,
        source:    &mut S,
        index:     usize,
        id:        EntryId,
        entry:     &ArchiveEntry,
        full_path: &str,
    ) -> Result<Dispatched, ContainerError> {
        let codec = entry.codec;
        if !self.options.codecs.accepts(codec) {
            warn!(path = %full_path, %codec, "unsupported compression method");
            return Ok(Dispatched::failed(EntryError::UnsupportedCodec { path: full_path.to_owned(), codec }));
        }

        let raw = source.raw(index)?;
        let decoded = match self.options.codecs.decoder(codec, raw) {
            Ok(d) => d,
            Err(source) => {
                warn!(path = %full_path, %codec, %source, "cannot decode entry");
                return Ok(Dispatched::failed(EntryError::Codec { path: full_path.to_owned(), source }));
            }
        };

        let mut reader = if self.options.verify_checksums {
            VerifyingReader::new(decoded, Expected { size: entry.uncompressed_size, crc32: entry.crc32 })
        } else {
            VerifyingReader::unchecked(decoded)
        };

        let stored = match self.services.content.store_content(id, &mut reader) {
            Ok(n) => n,
            Err(source) => {
                error!(path = %full_path, %id, %source, "failed to store content");
                return Ok(Dispatched::failed(EntryError::ContentStore { path: full_path.to_owned(), id, source }));
            }
        };
        debug!(path = %full_path, %id, bytes = stored, "stored content");

        // Content is in place; a scheduling failure does not undo that.
        if let Err(source) = self.services.scheduler.enqueue(Stage::ContentAnalysis, id) {
            error!(path = %full_path, %id, %source, "failed to schedule content analysis");
            let mut out = Dispatched::ready(stored);
            out.error = Some(EntryError::Scheduler { path: full_path.to_owned(), id, source });
            return Ok(out);
        }

        Ok(Dispatched::ready(stored))
    }
}
