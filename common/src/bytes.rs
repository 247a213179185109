//! Byte utilities for key range queries.

use bytes::{Bytes, BytesMut};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::ops::{Bound, RangeBounds};

/// Computes the smallest byte sequence strictly greater than the input.
///
/// Trailing `0xFF` bytes cannot be incremented, so they are dropped and the
/// preceding byte is incremented instead. Returns `None` when the input is
/// empty or all `0xFF`, in which case no successor exists and callers should
/// treat the upper bound as unbounded.
pub(crate) fn lex_increment(data: &[u8]) -> Option<Bytes> {
    let end = data.iter().rposition(|&b| b < 0xFF)?;
    let mut result = BytesMut::from(&data[..=end]);
    result[end] += 1;
    Some(result.freeze())
}

/// A half-open or closed range over byte keys.
#[derive(Clone, Debug)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// Creates a range covering all keys.
    pub fn unbounded() -> Self {
        Self {
            start: Unbounded,
            end: Unbounded,
        }
    }

    /// Creates a range covering every key that starts with `prefix`.
    pub fn prefix(prefix: Bytes) -> Self {
        if prefix.is_empty() {
            return Self::unbounded();
        }
        let end = match lex_increment(&prefix) {
            Some(end) => Excluded(end),
            None => Unbounded,
        };
        Self {
            start: Included(prefix),
            end,
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Included(s) => key >= s,
            Excluded(s) => key > s,
            Unbounded => true,
        };
        let before_end = match &self.end {
            Included(e) => key <= e,
            Excluded(e) => key < e,
            Unbounded => true,
        };
        after_start && before_end
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}
