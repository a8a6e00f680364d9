//! Source locations and their compact encoding
//!
//! A [`SourceLocation`] is a full `(file, line, offset)` triple. Every node in a
//! document carries two of them, so the tree stores [`CompressedSourceLocation`]s
//! instead: a single `u32` that holds the triple directly when it is small
//! enough, or an index into the source manager's overflow table when it isn't.
//!
//! ## Bit layout
//!
//! ```text
//!  31              16 15        6 5     1 0
//! +------------------+-----------+-------+-+
//! |      offset      |   line    | file  |0|   inline
//! +------------------+-----------+-------+-+
//! |          overflow table index        |1|   overflow
//! +--------------------------------------+-+
//! ```
//!
//! The all-ones pattern is reserved for "unknown" and is never produced by
//! encoding.

use std::fmt;

/// Identifier of a file registered with the source manager
pub type FileId = u32;

/// A fully expanded source location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file_id: FileId,
    pub line: u32,
    /// Byte offset from the start of the file
    pub offset: u32,
}

impl SourceLocation {
    pub const UNKNOWN: SourceLocation = SourceLocation {
        file_id: u32::MAX,
        line: u32::MAX,
        offset: u32::MAX,
    };

    pub fn new(file_id: FileId, line: u32, offset: u32) -> Self {
        Self {
            file_id,
            line,
            offset,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}+{}", self.file_id, self.line, self.offset)
        } else {
            write!(f, "<unknown>")
        }
    }
}

// ============================================================================
// BIT LAYOUT
// ============================================================================

pub(super) const LARGE_TAG_BITS: u32 = 1;
pub(super) const LARGE_TAG_OFFSET: u32 = 0;
pub(super) const LARGE_INDEX_BITS: u32 = u32::BITS - LARGE_TAG_BITS;
pub(super) const LARGE_INDEX_OFFSET: u32 = LARGE_TAG_OFFSET + LARGE_TAG_BITS;

pub(super) const FILE_ID_BITS: u32 = 5;
pub(super) const FILE_ID_OFFSET: u32 = LARGE_TAG_OFFSET + LARGE_TAG_BITS;
pub(super) const LINE_BITS: u32 = 10;
pub(super) const LINE_OFFSET: u32 = FILE_ID_OFFSET + FILE_ID_BITS;
pub(super) const OFFSET_BITS: u32 = 16;
pub(super) const OFFSET_OFFSET: u32 = LINE_OFFSET + LINE_BITS;

const _: () = assert!(OFFSET_OFFSET + OFFSET_BITS == u32::BITS);

/// Largest overflow index that can be stored without producing the invalid
/// all-ones pattern.
pub(super) const MAX_OVERFLOW_INDEX: u32 = (1 << LARGE_INDEX_BITS) - 2;

fn mask(length: u32) -> u32 {
    if length >= u32::BITS {
        u32::MAX
    } else {
        (1 << length) - 1
    }
}

fn fits(value: u32, bits: u32) -> bool {
    value <= mask(bits)
}

/// A `SourceLocation` packed into 32 bits
///
/// Built only by [`SourceManager::compress`](super::SourceManager::compress);
/// the default value is the invalid location.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressedSourceLocation {
    data: u32,
}

impl CompressedSourceLocation {
    pub const INVALID: CompressedSourceLocation = CompressedSourceLocation { data: u32::MAX };

    pub fn is_valid(&self) -> bool {
        self.data != u32::MAX
    }

    /// Whether this location lives in the overflow table
    pub fn is_overflow(&self) -> bool {
        self.is_valid() && self.bits(LARGE_TAG_OFFSET, LARGE_TAG_BITS) == 1
    }

    /// Raw encoded value
    pub fn raw(&self) -> u32 {
        self.data
    }

    fn bits(&self, start: u32, length: u32) -> u32 {
        (self.data >> start) & mask(length)
    }

    fn set_bits(&mut self, value: u32, start: u32, length: u32) {
        self.data &= !(mask(length) << start);
        self.data |= (value & mask(length)) << start;
    }

    /// Try to encode a location inline. Returns `None` when a field would
    /// be truncated.
    pub(super) fn inline(file_id: FileId, line: u32, offset: u32) -> Option<Self> {
        if !(fits(file_id, FILE_ID_BITS) && fits(line, LINE_BITS) && fits(offset, OFFSET_BITS)) {
            return None;
        }
        let mut loc = Self { data: 0 };
        loc.set_bits(0, LARGE_TAG_OFFSET, LARGE_TAG_BITS);
        loc.set_bits(file_id, FILE_ID_OFFSET, FILE_ID_BITS);
        loc.set_bits(line, LINE_OFFSET, LINE_BITS);
        loc.set_bits(offset, OFFSET_OFFSET, OFFSET_BITS);
        Some(loc)
    }

    pub(super) fn overflow(index: u32) -> Self {
        assert!(
            index <= MAX_OVERFLOW_INDEX,
            "source location overflow table is full"
        );
        let mut loc = Self { data: 0 };
        loc.set_bits(1, LARGE_TAG_OFFSET, LARGE_TAG_BITS);
        loc.set_bits(index, LARGE_INDEX_OFFSET, LARGE_INDEX_BITS);
        loc
    }

    /// Decode an inline location, or return the overflow index
    pub(super) fn decode(&self) -> Result<SourceLocation, u32> {
        if self.bits(LARGE_TAG_OFFSET, LARGE_TAG_BITS) == 0 {
            Ok(SourceLocation::new(
                self.bits(FILE_ID_OFFSET, FILE_ID_BITS),
                self.bits(LINE_OFFSET, LINE_BITS),
                self.bits(OFFSET_OFFSET, OFFSET_BITS),
            ))
        } else {
            Err(self.bits(LARGE_INDEX_OFFSET, LARGE_INDEX_BITS))
        }
    }
}

impl Default for CompressedSourceLocation {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for CompressedSourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "CompressedSourceLocation(invalid)");
        }
        match self.decode() {
            Ok(loc) => write!(
                f,
                "CompressedSourceLocation({}:{}+{})",
                loc.file_id, loc.line, loc.offset
            ),
            Err(index) => write!(f, "CompressedSourceLocation(overflow #{index})"),
        }
    }
}

/// A `(start, end)` pair of compressed locations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub start: CompressedSourceLocation,
    pub end: CompressedSourceLocation,
}

impl SourceRange {
    pub fn new(start: CompressedSourceLocation, end: CompressedSourceLocation) -> Self {
        Self { start, end }
    }

    /// A zero-width range at `loc`
    pub fn point(loc: CompressedSourceLocation) -> Self {
        Self::new(loc, loc)
    }

    /// The end location, falling back to the start when the end is invalid
    pub fn effective_end(&self) -> CompressedSourceLocation {
        if self.end.is_valid() {
            self.end
        } else {
            self.start
        }
    }
}
