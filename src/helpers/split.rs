//! Defines an iterator which splits a string on a separator byte while keeping
//! track of byte offsets into the original input.
//!
//! The router uses the offsets to recover raw sub-slices of the request path,
//! e.g. the tail consumed by a catch-all route segment.

/// A segment yielded by [`SegmentSplit`], carrying its position in the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitSegment<'a> {
    /// The segment itself, separator excluded.
    pub value: &'a str,
    /// Byte offset of the first byte of the segment in the source string.
    pub start: usize,
    /// Byte offset one past the last byte of the segment.
    pub end: usize,
}

/// Splits a string on a single-byte separator, eliding empty segments.
///
/// `SegmentSplit::new("/a//b/", b'/')` yields `"a"` and `"b"` only.
pub struct SegmentSplit<'a> {
    source: &'a str,
    separator: u8,
    position: usize,
}

impl<'a> SegmentSplit<'a> {
    /// Creates an iterator over the non-empty segments of `source`.
    ///
    /// The separator must be an ASCII byte so that splitting can never land
    /// inside a multi-byte UTF-8 sequence.
    pub fn new(source: &'a str, separator: u8) -> SegmentSplit<'a> {
        debug_assert!(separator.is_ascii());
        SegmentSplit {
            source,
            separator,
            position: 0,
        }
    }
}

impl<'a> Iterator for SegmentSplit<'a> {
    type Item = SplitSegment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.source.as_bytes();

        while self.position < bytes.len() && bytes[self.position] == self.separator {
            self.position += 1;
        }

        if self.position >= bytes.len() {
            return None;
        }

        let start = self.position;
        while self.position < bytes.len() && bytes[self.position] != self.separator {
            self.position += 1;
        }

        Some(SplitSegment {
            value: &self.source[start..self.position],
            start,
            end: self.position,
        })
    }
}
