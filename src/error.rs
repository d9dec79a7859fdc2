use std::io;

use thiserror::Error;

use crate::archive::RunReport;
use crate::codec::{CodecError, CodecId};
use crate::container::ContainerError;
use crate::entry::EntryId;
use crate::path::PathError;
use crate::sink::SinkError;

/// Failures confined to a single entry. None of these stop the walk; they
/// are logged where they happen and collected in the [`RunReport`].
#[derive(Error, Debug)]
pub enum EntryError {
    #[error(transparent)]
    MalformedPath(#[from] PathError),

    #[error("'{path}': compression method {codec} not supported")]
    UnsupportedCodec { path: String, codec: CodecId },

    #[error("'{path}': {source}")]
    Codec { path: String, source: CodecError },

    #[error("catalog write failed for '{path}': {source}")]
    CatalogWrite { path: String, source: SinkError },

    #[error("status update failed for {id}: {source}")]
    StatusWrite { id: EntryId, source: SinkError },

    #[error("'{path}' is already cataloged")]
    DuplicatePath { path: String },

    #[error("directory '{path}' would shadow a cataloged file")]
    PathConflict { path: String },

    #[error("storing content of '{path}' ({id}) failed: {source}")]
    ContentStore { path: String, id: EntryId, source: SinkError },

    #[error("scheduling '{path}' ({id}) failed: {source}")]
    Scheduler { path: String, id: EntryId, source: SinkError },
}

/// Failures that end a run. A non-archive input is not one of them; it is
/// reported as [`RunOutcome::Skipped`](crate::archive::RunOutcome::Skipped).
#[derive(Error, Debug)]
pub enum RunError {
    /// The container's structure broke mid-walk. Entries processed before
    /// the damage stay cataloged; `report` describes them.
    #[error("corrupt container '{container}': {source}")]
    CorruptArchive {
        container: String,
        source:    ContainerError,
        report:    Box<RunReport>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RunError {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunError::CorruptArchive { report, .. } => Some(report),
            RunError::Io(_) => None,
        }
    }
}
