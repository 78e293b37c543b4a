//! Source spans attached to every AST node for diagnostics.
//!
//! A [`SrcSpan`] is deliberately tiny (12 bytes): a [`FileId`] indexing into the
//! arena's file table plus two byte offsets into that file's source text. Spans
//! are opaque to the elaboration passes; they only travel along so that errors
//! can point back at the offending source.

use std::fmt;

/// Index into the file table owned by the AST arena.
///
/// Uses `u32` to keep [`SrcSpan`] small. The parser collaborator registers
/// each compilation unit's source name once and stamps the resulting id on
/// every span it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct FileId(u32);

impl FileId {
    pub fn new(index: usize) -> Self {
        Self(index.try_into().expect("invalid file id"))
    }

    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A byte range inside one source file.
///
/// `start` and `end` are byte offsets; `end` is exclusive. The default span
/// (file 0, empty range) is used for synthesised nodes that have no direct
/// source counterpart, e.g. the concatenation calls produced by string
/// interpolation inherit the span of the literal they replace instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct SrcSpan {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl SrcSpan {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// Returns a span covering both `self` and `other`.
    ///
    /// Both spans must belong to the same file; mixed-file joins keep `self`'s
    /// file and are only meaningful for synthesised nodes.
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        Self {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Returns a sub-span relative to this span's start offset.
    ///
    /// Used by string interpolation to point at the fragment of a literal a
    /// rewritten expression came from.
    #[must_use]
    pub fn slice(self, start: u32, end: u32) -> Self {
        Self {
            file: self.file,
            start: self.start + start,
            end: self.start + end,
        }
    }
}

impl fmt::Display for SrcSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
