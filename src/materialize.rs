//! Directory materialization with a per-run path→identity cache.
//!
//! Containers list entries in arbitrary order and often leave out directory
//! entries altogether. [`Materializer::resolve`] turns any directory path into
//! an identity, creating each missing ancestor on first reference and
//! remembering it so that no directory is ever created twice in a run.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, warn};

use crate::entry::{Container, EntryId, EntryStatus, NewEntry};
use crate::error::EntryError;
use crate::path::Chain;
use crate::sink::CatalogSink;

/// Directory path → identity for one run, plus the file paths cataloged so
/// far. Keys are normalized sub-paths (`a/b`). Never shared between runs.
#[derive(Debug, Default)]
pub struct PathIdentityCache {
    dirs:  HashMap<String, EntryId>,
    files: HashSet<String>,
}

impl PathIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(&self, key: &str) -> Option<EntryId> {
        self.dirs.get(key).copied()
    }

    pub fn insert_dir(&mut self, key: String, id: EntryId) {
        self.dirs.insert(key, id);
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.contains(key)
    }

    /// Returns false if the file was already recorded.
    pub fn insert_file(&mut self, key: String) -> bool {
        self.files.insert(key)
    }

    /// Is `key` cataloged as either a directory or a file?
    pub fn contains(&self, key: &str) -> bool {
        self.dirs.contains_key(key) || self.files.contains(key)
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }
}

/// Outcome of [`Materializer::resolve`].
#[derive(Debug)]
pub struct Resolved {
    /// Identity of the requested directory, or of its deepest ancestor that
    /// could be materialized.
    pub identity:    EntryId,
    /// Directories created by this call.
    pub synthesized: usize,
    pub errors:      Vec<EntryError>,
}

impl Resolved {
    fn hit(identity: EntryId) -> Self {
        Self { identity, synthesized: 0, errors: Vec::new() }
    }
}

pub struct Materializer<'a> {
    catalog:   &'a dyn CatalogSink,
    container: &'a Container,
    cache:     &'a mut PathIdentityCache,
}

impl<'a> Materializer<'a> {
    pub fn new(catalog: &'a dyn CatalogSink, container: &'a Container, cache: &'a mut PathIdentityCache) -> Self {
        Self { catalog, container, cache }
    }

    /// Identity of the directory named by `dir` (components, root first).
    /// An empty slice is the container itself.
    ///
    /// A failed creation is logged and the walk continues with the running
    /// parent, so descendants attach to the nearest materialized ancestor.
    /// Failed paths are not cached; the next reference retries them.
    pub fn resolve(&mut self, dir: &[String]) -> Resolved {
        if dir.is_empty() {
            return Resolved::hit(self.container.identity);
        }
        if let Some(id) = self.cache.dir(&dir.join("/")) {
            return Resolved::hit(id);
        }

        let mut out = Resolved::hit(self.container.identity);
        for link in Chain::new(dir) {
            if let Some(id) = self.cache.dir(&link.sub_path) {
                out.identity = id;
                continue;
            }
            if let Some(id) = self.synthesize(link.name, out.identity, &link.sub_path, &mut out.errors) {
                out.identity = id;
                out.synthesized += 1;
            }
        }
        out
    }

    fn synthesize(&mut self, name: &str, parent: EntryId, sub_path: &str, errors: &mut Vec<EntryError>) -> Option<EntryId> {
        let full_path = self.container.join(sub_path);

        if self.cache.has_file(sub_path) {
            warn!(path = %full_path, "directory implied by a descendant shadows a cataloged file");
            errors.push(EntryError::PathConflict { path: full_path });
            return None;
        }

        let id = match self.catalog.create_entry(&NewEntry::synthesized_dir(name, parent, full_path.clone())) {
            Ok(id) => id,
            Err(source) => {
                error!(path = %full_path, %source, "failed to create directory entry");
                errors.push(EntryError::CatalogWrite { path: full_path, source });
                return None;
            }
        };
        debug!(path = %full_path, %id, %parent, "synthesized directory");
        self.cache.insert_dir(sub_path.to_owned(), id);

        if let Err(source) = self.catalog.set_status(id, EntryStatus::ReadyForAnalysis) {
            error!(path = %full_path, %id, %source, "failed to update directory status");
            errors.push(EntryError::StatusWrite { id, source });
        }
        Some(id)
    }
}
