// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain

use std::cmp::Ordering;

/// A (line, column) coordinate in the store, both 0-indexed.
///
/// Columns count bytes. Ordering is document order: by line, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl From<(usize, usize)> for Position {
    fn from((line, col): (usize, usize)) -> Self {
        Self { line, col }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.col.cmp(&other.col))
    }
}

/// Snapshot of one data block's counters, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    /// Line that the block's first byte belongs to.
    pub first_line: usize,
    /// Line boundaries held by the block.
    pub n_lines: usize,
    pub bytes_in_use: usize,
    pub bytes_allocated: usize,
}
