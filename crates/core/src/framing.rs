//! Top-level block framing of raw event-stream files.
//!
//! A raw file is a sequence of self-delimiting blocks. Each block starts with
//! a 4-byte big-endian word count that includes the count word itself. The
//! partitioner only needs this outer framing to count blocks; block contents
//! are never interpreted here (see [`crate::evio`] for the full decoder).

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Size of one framing word in bytes.
pub const WORD_BYTES: u64 = 4;

/// Error type for framing scans.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("block {index} at byte {offset} declares zero length")]
    ZeroLength { index: u64, offset: u64 },

    #[error("block {index} at byte {offset} runs past end of file ({declared_bytes} bytes declared, {available} available)")]
    Truncated {
        index: u64,
        offset: u64,
        declared_bytes: u64,
        available: u64,
    },

    #[error("{0} trailing bytes after the last block do not form a word")]
    TrailingBytes(u64),

    #[error("file contains no blocks")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of scanning a file's block framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockScan {
    /// Number of top-level blocks.
    pub nblocks: u64,
    /// Total byte size of the file.
    pub size_bytes: u64,
}

/// Count the blocks of a stream whose total length is `len` bytes.
///
/// Only the 4-byte length prefix of each block is read; the payload is
/// skipped with a seek.
pub fn scan_blocks<R: Read + Seek>(reader: &mut R, len: u64) -> Result<BlockScan, FramingError> {
    let mut offset: u64 = 0;
    let mut nblocks: u64 = 0;
    let mut word = [0u8; WORD_BYTES as usize];

    while offset < len {
        let available = len - offset;
        if available < WORD_BYTES {
            return Err(FramingError::TrailingBytes(available));
        }

        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(&mut word)?;
        let words = u64::from(u32::from_be_bytes(word));
        if words == 0 {
            return Err(FramingError::ZeroLength {
                index: nblocks,
                offset,
            });
        }

        let declared_bytes = words * WORD_BYTES;
        if declared_bytes > available {
            return Err(FramingError::Truncated {
                index: nblocks,
                offset,
                declared_bytes,
                available,
            });
        }

        offset += declared_bytes;
        nblocks += 1;
    }

    if nblocks == 0 {
        return Err(FramingError::Empty);
    }

    Ok(BlockScan {
        nblocks,
        size_bytes: len,
    })
}

/// Scan a file on disk. Runs on the blocking thread pool.
pub async fn scan_file(path: &Path) -> Result<BlockScan, FramingError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        let len = file.metadata()?.len();
        let mut reader = std::io::BufReader::new(file);
        scan_blocks(&mut reader, len)
    })
    .await
    .map_err(|e| FramingError::Io(std::io::Error::other(e)))?
}
