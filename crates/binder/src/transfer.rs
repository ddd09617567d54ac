//! Moving bundles in from staging and merged artifacts out to the archive.
//!
//! Transfers are blocking from the binder's point of view: each one is
//! awaited before the next starts, and a failed attempt is retried a bounded
//! number of times with a linearly growing pause.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BinderError;

/// Pause after the first failed attempt; later pauses grow linearly.
const RETRY_STEP: Duration = Duration::from_secs(2);

/// Access to the staging area and the archive.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Copy the staged bundle `name` to `dest`.
    async fn fetch(&self, name: &str, dest: &Path) -> io::Result<()>;

    /// Copy `src` to the archive location `dest`, replacing any older copy.
    async fn upload(&self, src: &Path, dest: &Path) -> io::Result<()>;
}

/// Staging and archive both reachable as local (or mounted) filesystems.
#[derive(Debug, Clone)]
pub struct LocalTransfer {
    staging_dir: PathBuf,
}

impl LocalTransfer {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }
}

#[async_trait]
impl Transfer for LocalTransfer {
    async fn fetch(&self, name: &str, dest: &Path) -> io::Result<()> {
        tokio::fs::copy(self.staging_dir.join(name), dest).await?;
        Ok(())
    }

    async fn upload(&self, src: &Path, dest: &Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Copy beside the destination, then rename, so readers never see a
        // partial artifact.
        let partial = dest.with_extension("partial");
        tokio::fs::copy(src, &partial).await?;
        tokio::fs::rename(&partial, dest).await
    }
}

/// Run `op` up to `attempts` times, pausing between failures.
///
/// `path` names the object being moved, for logs and the final error.
pub async fn with_retries<F, Fut>(
    path: &Path,
    attempts: u32,
    step: Duration,
    mut op: F,
) -> Result<(), BinderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                tracing::warn!(path = %path.display(), attempt, error = %e, "Transfer failed, retrying");
                tokio::time::sleep(step * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(BinderError::Transfer {
                    path: path.to_path_buf(),
                    attempts,
                    source: e,
                })
            }
        }
    }
}

/// [`with_retries`] with the default pause.
pub async fn retrying<F, Fut>(path: &Path, attempts: u32, op: F) -> Result<(), BinderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    with_retries(path, attempts, RETRY_STEP, op).await
}
