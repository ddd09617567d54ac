//! Diagnostic decoder for the nested bank/segment tag tree inside raw blocks.
//!
//! The partitioner never needs this (it only reads the outer length prefix,
//! see [`crate::framing`]). It exists for the operator `scan` command.
//!
//! [`Nodes`] walks an immutable byte slice depth-first and yields one
//! [`Node`] per block header or structure header. The only mutable state is
//! the word cursor and the stack of open containers; payloads are never
//! copied. A malformed structure yields a single error and ends iteration.

use std::fmt;

/// Magic word closing every block header.
pub const BLOCK_MAGIC: u32 = 0xc0da_0100;

/// Minimum block header length in words.
const BLOCK_HEADER_WORDS: usize = 8;

/// Word order of a block, detected from its magic word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Content type code carried in every structure header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Unknown32,
    UInt32,
    Float32,
    CharStar8,
    Short16,
    UShort16,
    Char8,
    UChar8,
    Double64,
    Long64,
    ULong64,
    Int32,
    TagSegment,
    Segment,
    Bank,
    Composite,
    Other(u8),
}

impl ContentType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x0 => Self::Unknown32,
            0x1 => Self::UInt32,
            0x2 => Self::Float32,
            0x3 => Self::CharStar8,
            0x4 => Self::Short16,
            0x5 => Self::UShort16,
            0x6 => Self::Char8,
            0x7 => Self::UChar8,
            0x8 => Self::Double64,
            0x9 => Self::Long64,
            0xa => Self::ULong64,
            0xb => Self::Int32,
            0xc => Self::TagSegment,
            0xd | 0x20 => Self::Segment,
            0xe | 0x10 => Self::Bank,
            0xf => Self::Composite,
            other => Self::Other(other),
        }
    }

    /// The structure kind of the children, for container types.
    fn child_kind(self) -> Option<StructureKind> {
        match self {
            Self::Bank => Some(StructureKind::Bank),
            Self::Segment => Some(StructureKind::Segment),
            Self::TagSegment => Some(StructureKind::TagSegment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    Bank,
    Segment,
    TagSegment,
}

impl StructureKind {
    fn header_words(self) -> usize {
        match self {
            Self::Bank => 2,
            Self::Segment | Self::TagSegment => 1,
        }
    }
}

/// A decoded block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Word offset of the header from the start of the input.
    pub offset: usize,
    /// Total block length in words, header included.
    pub words: u32,
    pub number: u32,
    pub header_words: u32,
    pub event_count: u32,
    pub version: u8,
    pub order: ByteOrder,
}

/// A decoded bank, segment or tag segment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub kind: StructureKind,
    /// Nesting depth; events directly inside a block are depth 1.
    pub depth: usize,
    /// Word offset of the header from the start of the input.
    pub offset: usize,
    pub tag: u16,
    /// Only banks carry a `num` field.
    pub num: Option<u8>,
    pub content: ContentType,
    /// Payload length in words, header excluded.
    pub payload_words: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Block(BlockHeader),
    Structure(Structure),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Block(b) => write!(
                f,
                "block {} of {} words, {} events, version {} ({:?} endian)",
                b.number, b.words, b.event_count, b.version, b.order
            ),
            Node::Structure(s) => {
                let indent = "  ".repeat(s.depth);
                write!(
                    f,
                    "{indent}{:?} tag {} of {} words of {:?}",
                    s.kind, s.tag, s.payload_words, s.content
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("input length {0} is not a whole number of words")]
    Unaligned(usize),

    #[error("bad block magic {found:#010x} at word {offset}")]
    BadMagic { offset: usize, found: u32 },

    #[error("structure at word {offset} overruns its container (ends at {end}, container ends at {limit})")]
    Overrun {
        offset: usize,
        end: usize,
        limit: usize,
    },

    #[error("unexpected end of input at word {0}")]
    Eof(usize),
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Read-only word view over the input.
#[derive(Debug, Clone, Copy)]
struct Words<'a> {
    bytes: &'a [u8],
}

impl<'a> Words<'a> {
    fn len(&self) -> usize {
        self.bytes.len() / 4
    }

    fn raw(&self, index: usize) -> Option<[u8; 4]> {
        let start = index.checked_mul(4)?;
        self.bytes.get(start..start + 4)?.try_into().ok()
    }

    fn get(&self, index: usize, order: ByteOrder) -> Result<u32, DecodeError> {
        let raw = self.raw(index).ok_or(DecodeError::Eof(index))?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        })
    }
}

/// An open container on the traversal stack.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Word index one past the container's last word.
    end: usize,
    /// Kind of the structures it contains.
    child: StructureKind,
    depth: usize,
}

// ---------------------------------------------------------------------------
// Iterator
// ---------------------------------------------------------------------------

/// Lazy depth-first sequence of nodes over a raw buffer.
pub struct Nodes<'a> {
    words: Words<'a>,
    pos: usize,
    order: ByteOrder,
    stack: Vec<Frame>,
    done: bool,
}

/// Decode the tag tree of `bytes` lazily.
pub fn nodes(bytes: &[u8]) -> Nodes<'_> {
    Nodes {
        words: Words { bytes },
        pos: 0,
        order: ByteOrder::Big,
        stack: Vec::new(),
        done: false,
    }
}

impl<'a> Nodes<'a> {
    fn read_block(&mut self) -> Result<Node, DecodeError> {
        let offset = self.pos;
        let magic_index = offset + BLOCK_HEADER_WORDS - 1;
        let raw_magic = self.words.raw(magic_index).ok_or(DecodeError::Eof(magic_index))?;
        self.order = if u32::from_be_bytes(raw_magic) == BLOCK_MAGIC {
            ByteOrder::Big
        } else if u32::from_le_bytes(raw_magic) == BLOCK_MAGIC {
            ByteOrder::Little
        } else {
            return Err(DecodeError::BadMagic {
                offset: magic_index,
                found: u32::from_be_bytes(raw_magic),
            });
        };

        let word = |i: usize| self.words.get(offset + i, self.order);
        let header = BlockHeader {
            offset,
            words: word(0)?,
            number: word(1)?,
            header_words: word(2)?,
            event_count: word(3)?,
            version: (word(5)? & 0xff) as u8,
            order: self.order,
        };

        let end = offset + header.words as usize;
        let body = offset + (header.header_words as usize).max(BLOCK_HEADER_WORDS);
        if end > self.words.len() || body > end {
            return Err(DecodeError::Overrun {
                offset,
                end,
                limit: self.words.len(),
            });
        }

        self.pos = body;
        self.stack.push(Frame {
            end,
            child: StructureKind::Bank,
            depth: 1,
        });
        Ok(Node::Block(header))
    }

    fn read_structure(&mut self, frame: Frame) -> Result<Node, DecodeError> {
        let offset = self.pos;
        let first = self.words.get(offset, self.order)?;

        let (tag, num, code, length) = match frame.child {
            StructureKind::Bank => {
                let second = self.words.get(offset + 1, self.order)?;
                (
                    (second >> 16) as u16,
                    Some((second & 0xff) as u8),
                    ((second >> 8) & 0x3f) as u8,
                    first,
                )
            }
            StructureKind::Segment => (
                (first >> 24) as u16,
                None,
                ((first >> 16) & 0x3f) as u8,
                first & 0xffff,
            ),
            StructureKind::TagSegment => (
                (first >> 20) as u16,
                None,
                ((first >> 16) & 0xf) as u8,
                first & 0xffff,
            ),
        };

        // Every length field excludes the first header word.
        let total = length as usize + 1;
        let header_words = frame.child.header_words();
        let end = offset + total;
        if total < header_words || end > frame.end {
            return Err(DecodeError::Overrun {
                offset,
                end,
                limit: frame.end,
            });
        }

        let content = ContentType::from_code(code);
        let payload_words = (total - header_words) as u32;
        let depth = frame.depth;

        match content.child_kind() {
            Some(child) => {
                self.pos = offset + header_words;
                self.stack.push(Frame {
                    end,
                    child,
                    depth: depth + 1,
                });
            }
            None => self.pos = end,
        }

        Ok(Node::Structure(Structure {
            kind: frame.child,
            depth,
            offset,
            tag,
            num,
            content,
            payload_words,
        }))
    }

    fn step(&mut self) -> Option<Result<Node, DecodeError>> {
        loop {
            match self.stack.last().copied() {
                Some(frame) if self.pos >= frame.end => {
                    self.pos = frame.end;
                    self.stack.pop();
                }
                Some(frame) => return Some(self.read_structure(frame)),
                None if self.pos >= self.words.len() => return None,
                None => return Some(self.read_block()),
            }
        }
    }
}

impl<'a> Iterator for Nodes<'a> {
    type Item = Result<Node, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.pos == 0 && self.stack.is_empty() && self.words.bytes.len() % 4 != 0 {
            self.done = true;
            return Some(Err(DecodeError::Unaligned(self.words.bytes.len())));
        }
        let item = self.step();
        if matches!(item, Some(Err(_)) | None) {
            self.done = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    /// One block holding one event bank (tag 1) that contains one leaf bank
    /// of two uint32 words and one segment of one word.
    fn sample_block() -> Vec<u32> {
        let leaf_bank = [3, (7 << 16) | (0x1 << 8), 11, 12];
        let segment = [(9 << 24) | (0x1 << 16) | 1, 13];
        let event_len = 1 + leaf_bank.len() + segment.len();
        let mut event = vec![event_len as u32, (1 << 16) | (0xe << 8) | 5];
        event.extend(leaf_bank);
        event.extend(segment);

        let block_words = 8 + event.len();
        let mut block = vec![block_words as u32, 42, 8, 1, 0, 4, 0, BLOCK_MAGIC];
        block.extend(event);
        block
    }

    #[test]
    fn walks_nested_structures_depth_first() {
        let bytes = words_to_bytes(&sample_block());
        let nodes: Vec<Node> = nodes(&bytes).collect::<Result<_, _>>().unwrap();
        assert_eq!(nodes.len(), 4);

        match &nodes[0] {
            Node::Block(b) => {
                assert_eq!(b.number, 42);
                assert_eq!(b.event_count, 1);
                assert_eq!(b.version, 4);
            }
            other => panic!("expected block, got {other:?}"),
        }
        match &nodes[1] {
            Node::Structure(s) => {
                assert_eq!(s.kind, StructureKind::Bank);
                assert_eq!(s.tag, 1);
                assert_eq!(s.num, Some(5));
                assert_eq!(s.content, ContentType::Bank);
                assert_eq!(s.depth, 1);
            }
            other => panic!("expected bank, got {other:?}"),
        }
        match &nodes[2] {
            Node::Structure(s) => {
                assert_eq!(s.tag, 7);
                assert_eq!(s.content, ContentType::UInt32);
                assert_eq!(s.payload_words, 2);
                assert_eq!(s.depth, 2);
            }
            other => panic!("expected leaf bank, got {other:?}"),
        }
        match &nodes[3] {
            Node::Structure(s) => {
                assert_eq!(s.kind, StructureKind::Segment);
                assert_eq!(s.tag, 9);
                assert_eq!(s.payload_words, 1);
                assert_eq!(s.depth, 2);
            }
            other => panic!("expected segment, got {other:?}"),
        }
    }

    #[test]
    fn consecutive_blocks_are_all_visited() {
        let mut words = sample_block();
        words.extend(sample_block());
        let bytes = words_to_bytes(&words);
        let blocks = nodes(&bytes)
            .filter_map(Result::ok)
            .filter(|n| matches!(n, Node::Block(_)))
            .count();
        assert_eq!(blocks, 2);
    }

    #[test]
    fn little_endian_blocks_are_detected() {
        let bytes: Vec<u8> = sample_block().iter().flat_map(|w| w.to_le_bytes()).collect();
        let first = nodes(&bytes).next().unwrap().unwrap();
        assert!(matches!(first, Node::Block(BlockHeader { order: ByteOrder::Little, .. })));
        assert_eq!(nodes(&bytes).filter_map(Result::ok).count(), 4);
    }

    #[test]
    fn bad_magic_stops_iteration() {
        let mut words = sample_block();
        words[7] = 0xdead_beef;
        let bytes = words_to_bytes(&words);
        let mut iter = nodes(&bytes);
        assert!(matches!(iter.next(), Some(Err(DecodeError::BadMagic { .. }))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn overrunning_bank_is_reported() {
        let mut words = sample_block();
        // Inflate the event bank length beyond the block.
        words[8] = 100;
        let bytes = words_to_bytes(&words);
        let items: Vec<_> = nodes(&bytes).collect();
        assert!(matches!(items.last(), Some(Err(DecodeError::Overrun { .. }))));
    }
}
