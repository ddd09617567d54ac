//! Naming conventions shared by the dispatcher, workers and the binder.
//!
//! Every name that crosses a process boundary (block input selectors, per-slice
//! output suffixes, staging bundles, archive paths) is generated here so the
//! producer and the consumer cannot drift apart.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::slicing::BlockRange;

/// Extension carried by raw event-stream files.
pub const RAW_EXTENSION: &str = "evio";

static RUN_SEQNO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d+)_(\d+)\.evio$").expect("valid regex"));

/// Derive `(run, seqno)` from a raw file name such as
/// `hd_rawdata_071000_003.evio`.
///
/// ```
/// use slicer_core::naming::parse_run_seqno;
/// use std::path::Path;
///
/// assert_eq!(parse_run_seqno(Path::new("/raw/hd_rawdata_071000_003.evio")), Some((71000, 3)));
/// assert_eq!(parse_run_seqno(Path::new("/raw/notes.txt")), None);
/// ```
pub fn parse_run_seqno(path: &Path) -> Option<(i32, i32)> {
    let name = path.file_name()?.to_str()?;
    let caps = RUN_SEQNO_RE.captures(name)?;
    let run = caps[1].parse().ok()?;
    let seqno = caps[2].parse().ok()?;
    Some((run, seqno))
}

/// Address a worker reads a raw file from.
///
/// A path under `storage_root` has that root replaced by `input_prefix`
/// (typically an xrootd URL); any other path is returned as is. An empty
/// root places every path under the prefix.
///
/// ```
/// use slicer_core::naming::input_url;
///
/// assert_eq!(
///     input_url("/dcache/raw/hd_rawdata_071000_003.evio", "/dcache", "root://xrd.example.org/pnfs"),
///     "root://xrd.example.org/pnfs/raw/hd_rawdata_071000_003.evio"
/// );
/// assert_eq!(input_url("/scratch/x.evio", "/dcache", "root://xrd"), "/scratch/x.evio");
/// ```
pub fn input_url(raw_path: &str, storage_root: &str, input_prefix: &str) -> String {
    match raw_path.strip_prefix(storage_root) {
        Some(rest) if storage_root.is_empty() || rest.is_empty() || rest.starts_with('/') => {
            format!("{input_prefix}{rest}")
        }
        _ => raw_path.to_string(),
    }
}

/// Selector for the single block `block` of the raw file at `url`.
///
/// Convention: `{url}+{block},{block + 1}`
pub fn block_input(url: &str, block: i32) -> String {
    format!("{url}+{block},{}", block + 1)
}

/// Suffix workers append to every per-slice output file.
///
/// Convention: `{run:06}_{seqno:03}_{block1:05}-{block2:05}`. The binder
/// finds slice ranges in merge-tool diagnostics by matching this suffix.
pub fn output_suffix(run: i32, seqno: i32, range: BlockRange) -> String {
    format!(
        "{run:06}_{seqno:03}_{:05}-{:05}",
        range.block1, range.block2
    )
}

/// Name of the packaged output bundle a worker leaves in staging.
pub fn bundle_name(cluster_id: i64, process_id: i64) -> String {
    format!("job_{cluster_id}_{process_id}.zip")
}

/// Scratch sub-directory a slice's bundle is unpacked into.
pub fn slice_dir_name(range: BlockRange) -> String {
    format!("{}-{}", range.block1, range.block2)
}

/// Archive destination of a merged artifact.
///
/// Convention: `{prefix}/{category}/{run:06}/{category}_{run:06}_{seqno:03}.{ext}`
pub fn archive_path(prefix: &Path, category: &str, run: i32, seqno: i32, ext: &str) -> PathBuf {
    prefix
        .join(category)
        .join(format!("{run:06}"))
        .join(format!("{category}_{run:06}_{seqno:03}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(a: i32, b: i32) -> BlockRange {
        BlockRange::new(a, b).unwrap()
    }

    #[test]
    fn input_url_replaces_only_a_whole_root() {
        assert_eq!(
            input_url("/dcache/raw/a.evio", "/dcache", "root://xrd/pnfs"),
            "root://xrd/pnfs/raw/a.evio"
        );
        assert_eq!(input_url("/dcache2/raw/a.evio", "/dcache", "root://xrd"), "/dcache2/raw/a.evio");
        assert_eq!(input_url("/raw/a.evio", "", "root://xrd"), "root://xrd/raw/a.evio");
        assert_eq!(input_url("/raw/a.evio", "", ""), "/raw/a.evio");
    }

    #[test]
    fn block_input_selects_one_block() {
        assert_eq!(block_input("root://xrd/raw/a.evio", 7), "root://xrd/raw/a.evio+7,8");
    }

    #[test]
    fn output_suffix_encodes_run_and_range() {
        assert_eq!(output_suffix(71000, 3, r(6, 10)), "071000_003_00006-00010");
    }

    #[test]
    fn bundle_name_uses_cluster_and_process() {
        assert_eq!(bundle_name(1234, 7), "job_1234_7.zip");
    }

    #[test]
    fn archive_path_layout() {
        let path = archive_path(Path::new("/archive"), "hists", 71000, 3, "root");
        assert_eq!(path, Path::new("/archive/hists/071000/hists_071000_003.root"));
    }

    #[test]
    fn run_seqno_requires_evio_suffix() {
        assert_eq!(parse_run_seqno(Path::new("hd_rawdata_071000_003.root")), None);
        assert_eq!(parse_run_seqno(Path::new("x_5_12.evio")), Some((5, 12)));
    }
}
