//! Half-open source offset ranges

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open `[start, end)` range of codepoint offsets into one normalized source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceOffset {
    pub start: usize,
    pub end: usize,
}

impl SourceOffset {
    /// Build a range, rejecting inverted bounds.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Range of `len` codepoints starting at `start`.
    pub fn at(start: usize, len: usize) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` falls inside `[start, end)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether `other` lies entirely within this range.
    pub fn encloses(&self, other: SourceOffset) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether both ranges share at least one codepoint.
    pub fn overlaps(&self, other: SourceOffset) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether the range fits a source of `len` codepoints.
    pub fn fits(&self, len: usize) -> bool {
        self.start <= self.end && self.end <= len
    }
}

impl fmt::Display for SourceOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(SourceOffset::new(4, 2).is_none());
        assert_eq!(SourceOffset::new(2, 2).map(|o| o.is_empty()), Some(true));
    }

    #[test]
    fn containment_is_half_open() {
        let range = SourceOffset::at(10, 5);
        assert!(range.contains(10));
        assert!(range.contains(14));
        assert!(!range.contains(15));
        assert!(range.encloses(SourceOffset::at(11, 2)));
        assert!(!range.encloses(SourceOffset::at(14, 2)));
    }

    #[test]
    fn overlap_excludes_touching_ranges() {
        let a = SourceOffset::at(0, 5);
        assert!(!a.overlaps(SourceOffset::at(5, 3)));
        assert!(a.overlaps(SourceOffset::at(4, 3)));
    }
}
