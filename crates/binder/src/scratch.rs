//! Per-file scratch directories.

use std::io;
use std::path::{Path, PathBuf};

use slicer_core::naming::slice_dir_name;
use slicer_core::slicing::BlockRange;
use slicer_core::types::DbId;

/// A scratch directory owned by one reconciliation, removed on drop.
///
/// Only the binder holding a file's binding works in `<root>/<raw_file_id>`,
/// so anything already there is debris from an earlier crash and is cleared.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub async fn create(root: &Path, raw_file_id: DbId) -> io::Result<Self> {
        let path = root.join(raw_file_id.to_string());
        if tokio::fs::try_exists(&path).await? {
            tracing::warn!(path = %path.display(), "Removing stale scratch directory");
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory a slice's bundle is unpacked into.
    pub fn slice_dir(&self, range: BlockRange) -> PathBuf {
        self.path.join(slice_dir_name(range))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}
