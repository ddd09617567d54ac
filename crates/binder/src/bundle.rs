//! Unpacking of per-slice output bundles.
//!
//! A bundle is a zip archive; anything else, gzipped tarballs included, is
//! reported as [`BinderError::Bundle`].
//!
//! Bundles come from workers the binder does not control, so entry names
//! are confined to the destination directory and sizes are capped.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::BinderError;

const MAX_ENTRIES: usize = 10_000;
const MAX_TOTAL_UNCOMPRESSED_BYTES: u64 = 64 * 1024 * 1024 * 1024;

/// Unpack `zip_path` into `dest_dir`, returning the number of files written.
///
/// Runs on the blocking thread pool.
pub async fn unpack(zip_path: &Path, dest_dir: &Path) -> Result<usize, BinderError> {
    let zip_path = zip_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || unpack_blocking(&zip_path, &dest_dir))
        .await
        .map_err(|e| BinderError::Io(std::io::Error::other(e)))?
}

fn unpack_blocking(zip_path: &Path, dest_dir: &Path) -> Result<usize, BinderError> {
    let bad = |reason: String| BinderError::Bundle {
        path: zip_path.to_path_buf(),
        reason,
    };

    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| bad(e.to_string()))?;
    if archive.len() > MAX_ENTRIES {
        return Err(bad(format!("{} entries, limit is {MAX_ENTRIES}", archive.len())));
    }

    std::fs::create_dir_all(dest_dir)?;
    let mut written = 0;
    let mut total: u64 = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| bad(e.to_string()))?;

        total = total.saturating_add(entry.size());
        if total > MAX_TOTAL_UNCOMPRESSED_BYTES {
            return Err(bad("uncompressed size exceeds limit".to_string()));
        }

        let Some(relative) = entry.enclosed_name() else {
            return Err(bad(format!("entry '{}' escapes the bundle", entry.name())));
        };
        let outpath: PathBuf = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| bad(e.to_string()))?;
        written += 1;
    }
    Ok(written)
}
