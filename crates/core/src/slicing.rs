//! Block-range arithmetic for slices.
//!
//! A slice is the half-open range `[block1, block2)` of one raw file. The
//! slices of a file must always partition `[0, nblocks)` exactly; the helpers
//! here compute grants and splits that keep that true, and check it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::BlockIndex;

/// A half-open block range `[block1, block2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct BlockRange {
    pub block1: BlockIndex,
    pub block2: BlockIndex,
}

impl BlockRange {
    /// Build a range, rejecting empty or negative ones.
    pub fn new(block1: BlockIndex, block2: BlockIndex) -> Result<Self, CoreError> {
        if block1 < 0 || block2 <= block1 {
            return Err(CoreError::Validation(format!(
                "Invalid block range [{block1}, {block2})"
            )));
        }
        Ok(Self { block1, block2 })
    }

    /// Number of blocks covered.
    pub fn len(&self) -> BlockIndex {
        self.block2 - self.block1
    }

    pub fn is_empty(&self) -> bool {
        self.block2 <= self.block1
    }

    /// Iterate over every block index in the range.
    pub fn blocks(&self) -> impl Iterator<Item = BlockIndex> {
        self.block1..self.block2
    }
}

/// Rendered as `block1,block2`, the form stored in binding details.
impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.block1, self.block2)
    }
}

impl FromStr for BlockRange {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .trim()
            .split_once(',')
            .ok_or_else(|| CoreError::Validation(format!("Malformed block range '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<BlockIndex>()
                .map_err(|_| CoreError::Validation(format!("Malformed block range '{s}'")))
        };
        Self::new(parse(a)?, parse(b)?)
    }
}

// ---------------------------------------------------------------------------
// Grants
// ---------------------------------------------------------------------------

/// The outcome of sizing a claimed slice to a worker's parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// The sub-range handed to the worker.
    pub granted: BlockRange,
    /// The unassigned remainder, when the claimed slice had to be split.
    pub remainder: Option<BlockRange>,
}

/// Size a claimed slice for a worker with `parallelism` cores.
///
/// The worker receives `min(max_blocks_per_core * parallelism, claimed.len())`
/// blocks from the start of the claimed range. Anything left over becomes the
/// remainder, so `granted` and `remainder` together cover `claimed` exactly.
pub fn grant(
    claimed: BlockRange,
    max_blocks_per_core: BlockIndex,
    parallelism: BlockIndex,
) -> Result<Grant, CoreError> {
    if max_blocks_per_core < 1 {
        return Err(CoreError::Validation(format!(
            "max_blocks_per_core must be positive, got {max_blocks_per_core}"
        )));
    }
    if parallelism < 1 {
        return Err(CoreError::Validation(format!(
            "parallelism must be positive, got {parallelism}"
        )));
    }

    Ok(split(claimed, quota(max_blocks_per_core, parallelism)))
}

/// Blocks a worker may receive: `max_blocks_per_core * parallelism`,
/// saturating at `BlockIndex::MAX`.
pub fn quota(max_blocks_per_core: BlockIndex, parallelism: BlockIndex) -> BlockIndex {
    let quota = i64::from(max_blocks_per_core) * i64::from(parallelism);
    quota.clamp(1, i64::from(BlockIndex::MAX)) as BlockIndex
}

/// Split `claimed` after its first `quota` blocks (at least one).
pub fn split(claimed: BlockRange, quota: BlockIndex) -> Grant {
    let size = quota.clamp(1, claimed.len().max(1));
    let split_at = claimed.block1 + size;

    let granted = BlockRange {
        block1: claimed.block1,
        block2: split_at,
    };
    let remainder = (split_at < claimed.block2).then_some(BlockRange {
        block1: split_at,
        block2: claimed.block2,
    });

    Grant { granted, remainder }
}

// ---------------------------------------------------------------------------
// Partition check
// ---------------------------------------------------------------------------

/// Ways a set of slices can fail to partition `[0, nblocks)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    #[error("gap in coverage at block {at}")]
    Gap { at: BlockIndex },

    #[error("slices overlap at block {at}")]
    Overlap { at: BlockIndex },

    #[error("coverage ends at block {end}, expected {nblocks}")]
    WrongEnd { end: BlockIndex, nblocks: BlockIndex },
}

/// Verify that `ranges` tile `[0, nblocks)` with no gap and no overlap.
pub fn check_partition(nblocks: BlockIndex, ranges: &[BlockRange]) -> Result<(), PartitionError> {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    let mut cursor = 0;
    for r in &sorted {
        if r.block1 > cursor {
            return Err(PartitionError::Gap { at: cursor });
        }
        if r.block1 < cursor {
            return Err(PartitionError::Overlap { at: r.block1 });
        }
        cursor = r.block2;
    }

    if cursor != nblocks {
        if cursor < nblocks {
            return Err(PartitionError::Gap { at: cursor });
        }
        return Err(PartitionError::WrongEnd {
            end: cursor,
            nblocks,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bad-range detail codec
// ---------------------------------------------------------------------------

/// Encode a set of bad ranges as binding detail text (`"b1,b2 b1,b2 ..."`).
pub fn format_bad_ranges(ranges: &BTreeSet<BlockRange>) -> String {
    ranges
        .iter()
        .map(BlockRange::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse binding detail text back into ranges.
///
/// Tokens that are not `b1,b2` pairs are skipped, so free text around the
/// ranges does not prevent recycling.
pub fn parse_bad_ranges(detail: &str) -> BTreeSet<BlockRange> {
    detail
        .split_whitespace()
        .filter_map(|token| token.parse::<BlockRange>().ok())
        .collect()
}
