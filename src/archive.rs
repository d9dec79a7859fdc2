//! High-level [`Extractor`] API, the primary embedding surface.
//!
//! ```no_run
//! use std::fs::File;
//! use ziptree::archive::{ExtractOptions, Extractor, RunOutcome};
//! use ziptree::entry::{Container, EntryId};
//! use ziptree::sink::{MemoryCatalog, MemoryContentStore, MemoryQueue, Services};
//!
//! let catalog = MemoryCatalog::starting_at(1);
//! let content = MemoryContentStore::new();
//! let queue   = MemoryQueue::new();
//! let options = ExtractOptions::default();
//! let extractor = Extractor::new(Services::new(&catalog, &content, &queue), &options);
//!
//! let container = Container::new(EntryId(0), "evidence/bundle.zip");
//! match extractor.run(File::open("bundle.zip")?, &container)? {
//!     RunOutcome::Completed(report) => println!("{}", report.summary()),
//!     RunOutcome::Skipped           => println!("not a zip archive"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt::Write as _;
use std::io::{Read, Seek};

use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::codec::CodecPolicy;
use crate::container::{ContainerError, EntrySource, SalvageSource, ZipSource};
use crate::entry::Container;
use crate::error::{EntryError, RunError};
use crate::materialize::PathIdentityCache;
use crate::sink::Services;
use crate::walker::Walker;

// ── ExtractOptions ────────────────────────────────────────────────────────────

/// Configuration for an [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Compression methods the extractor will decode. Entries using any
    /// other method are cataloged but marked failed.
    pub codecs:           CodecPolicy,
    /// Check each decoded stream against the declared size and CRC-32.
    pub verify_checksums: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            codecs:           CodecPolicy::default(),
            verify_checksums: true,
        }
    }
}

// ── RunReport ─────────────────────────────────────────────────────────────────

/// What one run did. Returned on success, and carried inside
/// [`RunError::CorruptArchive`] when a run is cut short.
#[derive(Debug)]
pub struct RunReport {
    pub run_id:                 Uuid,
    /// Entries read from the central index.
    pub entries_seen:           usize,
    /// Entries (files and listed directories) written to the catalog.
    pub entries_cataloged:      usize,
    /// Directories listed explicitly in the container.
    pub directories:            usize,
    /// Directories created because a descendant implied them.
    pub directories_synthesized: usize,
    pub files_extracted:        usize,
    pub files_failed:           usize,
    pub bytes_stored:           u64,
    pub failures:               Vec<EntryError>,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            entries_seen:            0,
            entries_cataloged:       0,
            directories:             0,
            directories_synthesized: 0,
            files_extracted:         0,
            files_failed:            0,
            bytes_stored:            0,
            failures:                Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One line per counter, then one line per failure.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "run {}", self.run_id);
        let _ = writeln!(s, "  entries seen         {}", self.entries_seen);
        let _ = writeln!(s, "  entries cataloged    {}", self.entries_cataloged);
        let _ = writeln!(s, "  directories          {} listed, {} synthesized",
                         self.directories, self.directories_synthesized);
        let _ = writeln!(s, "  files                {} extracted, {} failed",
                         self.files_extracted, self.files_failed);
        let _ = writeln!(s, "  bytes stored         {}", self.bytes_stored);
        for e in &self.failures {
            let _ = writeln!(s, "  ! {e}");
        }
        s
    }
}

// ── RunOutcome ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// The input is not a zip container. Nothing was cataloged.
    Skipped,
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(r) => Some(r),
            RunOutcome::Skipped      => None,
        }
    }
}

// ── Extractor ─────────────────────────────────────────────────────────────────

/// Reconstructs the directory tree of zip containers into the catalog.
///
/// An extractor holds no per-run state: each call to [`run`](Self::run)
/// starts with an empty path cache and a fresh run id.
pub struct Extractor<'a> {
    services: Services<'a>,
    options:  &'a ExtractOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(services: Services<'a>, options: &'a ExtractOptions) -> Self {
        Self { services, options }
    }

    /// Open `reader` as a zip container and catalog every entry beneath
    /// `container`. When the central directory is unreadable, the records
    /// before the damage are still cataloged and the run ends with
    /// [`RunError::CorruptArchive`].
    pub fn run<R: Read + Seek>(&self, mut reader: R, container: &Container) -> Result<RunOutcome, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, container = %container.full_path);
        let _guard = span.enter();

        let cause = match ZipSource::open(&mut reader) {
            Ok(mut source) => return self.walk(&mut source, container, run_id),
            Err(ContainerError::NotAnArchive) => {
                debug!("not a zip container, skipping");
                return Ok(RunOutcome::Skipped);
            }
            Err(ContainerError::Io(e)) => return Err(RunError::Io(e)),
            Err(cause) => cause,
        };

        warn!(%cause, "central directory unreadable, salvaging entries");
        let mut source = SalvageSource::scan(&mut reader, &cause.to_string())?;
        self.walk(&mut source, container, run_id)
    }

    /// Catalog the entries of an already opened source.
    pub fn run_source<S: EntrySource + ?Sized>(&self, source: &mut S, container: &Container) -> Result<RunOutcome, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, container = %container.full_path);
        let _guard = span.enter();
        self.walk(source, container, run_id)
    }

    fn walk<S: EntrySource + ?Sized>(&self, source: &mut S, container: &Container, run_id: Uuid) -> Result<RunOutcome, RunError> {
        info!(entries = source.len(), "walking container");

        let mut cache = PathIdentityCache::new();
        let mut walker = Walker::new(container, self.services, self.options, &mut cache, RunReport::new(run_id));
        let result = walker.walk(source);
        let report = walker.into_report();

        match result {
            Ok(()) => {
                info!(
                    cataloged   = report.entries_cataloged,
                    synthesized = report.directories_synthesized,
                    extracted   = report.files_extracted,
                    failed      = report.files_failed,
                    bytes       = report.bytes_stored,
                    "run complete"
                );
                Ok(RunOutcome::Completed(report))
            }
            Err(ContainerError::Io(e)) => Err(RunError::Io(e)),
            Err(source) => {
                warn!(%source, after = report.entries_seen, "container corrupt, abandoning run");
                Err(RunError::CorruptArchive {
                    container: container.full_path.clone(),
                    source,
                    report:    Box::new(report),
                })
            }
        }
    }
}

/// Run with default options. Shorthand for [`Extractor::run`].
pub fn run<R: Read + Seek>(
    reader:    R,
    container: &Container,
    services:  Services<'_>,
    options:   &ExtractOptions,
) -> Result<RunOutcome, RunError> {
    Extractor::new(services, options).run(reader, container)
}
