//! Content store writing one file per entry identity.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{ContentSink, SinkError};
use crate::entry::EntryId;

/// Stores content at `<root>/<id>`. Each blob is staged in a temporary file
/// in `root` and renamed into place, so a failed stream leaves no partial file.
pub struct DirContentStore {
    root: PathBuf,
}

impl DirContentStore {
    pub fn create<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_owned();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: EntryId) -> PathBuf {
        self.root.join(id.0.to_string())
    }
}

impl ContentSink for DirContentStore {
    fn store_content(&self, id: EntryId, content: &mut dyn Read) -> Result<u64, SinkError> {
        let mut staged = NamedTempFile::new_in(&self.root)?;
        let n = io::copy(content, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(self.path_of(id)).map_err(|e| SinkError::Io(e.error))?;
        Ok(n)
    }
}
