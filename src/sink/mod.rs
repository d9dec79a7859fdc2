//! Services the walker hands its results to.
//!
//! All three are shared between concurrent runs over different containers,
//! so implementations take `&self` and must be `Send + Sync`. A run never
//! calls them from more than one thread.

use std::io::{self, Read};

use thiserror::Error;

use crate::entry::{EntryId, EntryStatus, NewEntry};

pub mod fs;
pub mod memory;

pub use fs::DirContentStore;
pub use memory::{DiscardContent, MemoryCatalog, MemoryContentStore, MemoryQueue};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown entry {0}")]
    UnknownEntry(EntryId),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Pipeline stages an entry can be queued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ContentAnalysis,
}

/// Persistent record of cataloged entries.
pub trait CatalogSink: Send + Sync {
    /// Create an entry and return its newly assigned identity.
    fn create_entry(&self, entry: &NewEntry) -> Result<EntryId, SinkError>;
    fn set_status(&self, id: EntryId, status: EntryStatus) -> Result<(), SinkError>;
}

/// Storage for extracted file content.
pub trait ContentSink: Send + Sync {
    /// Drain `content` and store it under `id`. Returns bytes stored.
    fn store_content(&self, id: EntryId, content: &mut dyn Read) -> Result<u64, SinkError>;
}

/// Work queue feeding later pipeline stages.
pub trait Scheduler: Send + Sync {
    fn enqueue(&self, stage: Stage, id: EntryId) -> Result<(), SinkError>;
}

/// The collaborators of one run.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub catalog:   &'a dyn CatalogSink,
    pub content:   &'a dyn ContentSink,
    pub scheduler: &'a dyn Scheduler,
}

impl<'a> Services<'a> {
    pub fn new(catalog: &'a dyn CatalogSink, content: &'a dyn ContentSink, scheduler: &'a dyn Scheduler) -> Self {
        Self { catalog, content, scheduler }
    }
}
