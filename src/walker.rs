//! Single forward pass over a container's central index.
//!
//! Entries are processed strictly in stored order, one at a time: resolving
//! entry *N+1*'s parent may depend on a directory materialized while handling
//! entry *N*. Any order is tolerated, including children before their
//! directory and directories that are never listed.

use tracing::{debug, error, warn};

use crate::archive::{ExtractOptions, RunReport};
use crate::container::{ArchiveEntry, ContainerError, EntrySource};
use crate::dispatch::Dispatcher;
use crate::entry::{Container, EntryId, EntryStatus, NewEntry};
use crate::error::EntryError;
use crate::materialize::{Materializer, PathIdentityCache};
use crate::path::ArchivePath;
use crate::sink::Services;

pub struct Walker<'a> {
    container: &'a Container,
    services:  Services<'a>,
    options:   &'a ExtractOptions,
    cache:     &'a mut PathIdentityCache,
    report:    RunReport,
}

impl<'a> Walker<'a> {
    pub fn new(
        container: &'a Container,
        services:  Services<'a>,
        options:   &'a ExtractOptions,
        cache:     &'a mut PathIdentityCache,
        report:    RunReport,
    ) -> Self {
        Self { container, services, options, cache, report }
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Process every entry. Stops at the first entry the container cannot
    /// produce; everything before it stays cataloged.
    pub fn walk<S: EntrySource + ?Sized>(&mut self, source: &mut S) -> Result<(), ContainerError> {
        for index in 0..source.len() {
            self.step(source, index)?;
        }
        Ok(())
    }

    fn step<S: EntrySource + ?Sized>(&mut self, source: &mut S, index: usize) -> Result<(), ContainerError> {
        let entry = source.entry(index)?;
        self.report.entries_seen += 1;

        let mut path = match ArchivePath::parse(&entry.raw_path) {
            Ok(p) => p,
            Err(e) => {
                warn!(index, %e, "skipping entry");
                self.report.failures.push(e.into());
                return Ok(());
            }
        };
        if entry.is_dir && !path.is_dir() {
            debug!(index, path = %entry.raw_path, "directory by attributes");
            path = path.into_dir();
        }
        let key = path.key();
        let full_path = self.container.join(&key);

        if !self.claim(&path, &key, &full_path) {
            return Ok(());
        }

        let parent = self.parent_of(&path);
        let Some(id) = self.create(&path, &entry, parent, &full_path) else {
            return Ok(());
        };
        debug!(index, path = %full_path, %id, %parent, is_dir = path.is_dir(), "cataloged entry");

        let status = if path.is_dir() {
            self.cache.insert_dir(key, id);
            self.report.directories += 1;
            EntryStatus::ReadyForAnalysis
        } else {
            self.cache.insert_file(key);
            let dispatcher = Dispatcher::new(self.services, self.options);
            match dispatcher.dispatch(source, index, id, &entry, &full_path) {
                Ok(d) => {
                    match d.stored {
                        Some(n) => {
                            self.report.files_extracted += 1;
                            self.report.bytes_stored += n;
                        }
                        None => self.report.files_failed += 1,
                    }
                    self.report.failures.extend(d.error);
                    d.status
                }
                Err(e) => {
                    self.report.files_failed += 1;
                    self.persist_status(id, EntryStatus::AnalysisFailed);
                    return Err(e);
                }
            }
        };

        self.persist_status(id, status);
        Ok(())
    }

    /// Reject paths already cataloged in this run. A directory listed after
    /// it was synthesized is simply already done.
    fn claim(&mut self, path: &ArchivePath, key: &str, full_path: &str) -> bool {
        if path.is_dir() {
            if let Some(id) = self.cache.dir(key) {
                debug!(path = %full_path, %id, "directory already materialized");
                return false;
            }
            if self.cache.has_file(key) {
                warn!(path = %full_path, "directory entry shadows a cataloged file");
                self.report.failures.push(EntryError::PathConflict { path: full_path.to_owned() });
                return false;
            }
        } else if self.cache.contains(key) {
            warn!(path = %full_path, "duplicate entry");
            self.report.failures.push(EntryError::DuplicatePath { path: full_path.to_owned() });
            return false;
        }
        true
    }

    fn parent_of(&mut self, path: &ArchivePath) -> EntryId {
        if path.is_top_level() {
            return self.container.identity;
        }
        let resolved = Materializer::new(self.services.catalog, self.container, self.cache)
            .resolve(path.parent_components());
        self.report.directories_synthesized += resolved.synthesized;
        self.report.failures.extend(resolved.errors);
        resolved.identity
    }

    fn create(&mut self, path: &ArchivePath, entry: &ArchiveEntry, parent: EntryId, full_path: &str) -> Option<EntryId> {
        let new = NewEntry {
            name:       path.name().to_owned(),
            parent,
            is_dir:     path.is_dir(),
            size:       if path.is_dir() { 0 } else { entry.uncompressed_size },
            metadata:   Some(entry.metadata()),
            timestamps: entry.timestamps(),
            full_path:  full_path.to_owned(),
        };
        match self.services.catalog.create_entry(&new) {
            Ok(id) => {
                self.report.entries_cataloged += 1;
                Some(id)
            }
            Err(source) => {
                error!(path = %full_path, %source, "failed to create entry");
                self.report.failures.push(EntryError::CatalogWrite { path: full_path.to_owned(), source });
                None
            }
        }
    }

    fn persist_status(&mut self, id: EntryId, status: EntryStatus) {
        if let Err(source) = self.services.catalog.set_status(id, status) {
            error!(%id, ?status, %source, "failed to update entry status");
            self.report.failures.push(EntryError::StatusWrite { id, source });
        }
    }
}
