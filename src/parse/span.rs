use std::fmt;

use serde::{Deserialize, Serialize};

/// Line span of an annotation block in a document.
///
/// Both ends are 0-indexed and inclusive; `start_line <= end_line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRange {
    #[serde(rename = "start")]
    pub start_line: usize,
    #[serde(rename = "end")]
    pub end_line: usize,
}

impl BlockRange {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        debug_assert!(start_line <= end_line, "block range must not be inverted");
        BlockRange {
            start_line,
            end_line,
        }
    }

    /// Number of lines covered (always at least 1)
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }

    pub fn overlaps(&self, other: &BlockRange) -> bool {
        self.start_line <= other.end_line && other.start_line <= self.end_line
    }
}

impl fmt::Display for BlockRange {
    /// Renders 1-based line numbers, the way editors show them.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lines {}-{}", self.start_line + 1, self.end_line + 1)
    }
}
