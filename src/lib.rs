//! Reconstructs the directory hierarchy held inside zip containers as
//! catalog entries, and hands each regular file's decoded content on for
//! analysis.

pub mod entry;
pub mod path;
pub mod codec;
pub mod container;
pub mod sink;
pub mod materialize;
pub mod dispatch;
pub mod walker;
pub mod archive;
pub mod error;

pub use archive::{run, ExtractOptions, Extractor, RunOutcome, RunReport};
pub use codec::{CodecId, CodecPolicy};
pub use container::{ContainerError, EntrySource, SalvageSource, ZipSource};
pub use entry::{Container, Entry, EntryId, EntryStatus, NewEntry};
pub use error::{EntryError, RunError};
pub use sink::{CatalogSink, ContentSink, Scheduler, Services, SinkError, Stage};
