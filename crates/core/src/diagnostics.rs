//! Extraction of slice ranges from merge-tool diagnostics.
//!
//! Merge tools name the input file they choke on. Per-slice files carry the
//! output suffix `{run:06}_{seqno:03}_{block1:05}-{block2:05}`, so the
//! offending ranges can be recovered from the tool's stdout/stderr.

use std::collections::BTreeSet;

use regex::Regex;

use crate::slicing::BlockRange;

/// Find every slice range of raw file `(run, seqno)` mentioned in `output`.
///
/// Suffixes belonging to other raw files are ignored.
pub fn implicated_ranges(output: &str, run: i32, seqno: i32) -> BTreeSet<BlockRange> {
    let pattern = format!(r"{run:06}_{seqno:03}_(\d+)-(\d+)");
    let Ok(re) = Regex::new(&pattern) else {
        return BTreeSet::new();
    };

    re.captures_iter(output)
        .filter_map(|caps| {
            let block1 = caps[1].parse().ok()?;
            let block2 = caps[2].parse().ok()?;
            BlockRange::new(block1, block2).ok()
        })
        .collect()
}
