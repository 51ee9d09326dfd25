// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain

//! Chapter index for fast line-to-block lookup.
//!
//! Every `stride`-th block of the chain is recorded as a chapter. Chapter
//! blocks are in document order, so their line ranges are sorted and a binary
//! search picks the chapter closest before a target line. The linear scan
//! then starts there instead of at the first block.

use crate::chain::{BlockChain, BlockId};

/// Chapter slots are grown by this many entries at a time.
const CHAPTER_GROWTH: usize = 20;

/// Subsampled view of the block chain.
#[derive(Debug, Clone)]
pub struct ChapterIndex {
    stride: usize,
    /// `chapters[k]` is the block at chain position `k * stride`.
    chapters: Vec<BlockId>,
}

impl ChapterIndex {
    /// Creates an index whose first chapter is `first`.
    pub fn new(stride: usize, first: BlockId) -> Self {
        let mut chapters = Vec::with_capacity(CHAPTER_GROWTH);
        chapters.push(first);
        Self {
            stride: stride.max(1),
            chapters,
        }
    }

    /// Number of chapters recorded.
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// Number of chapter slots currently allocated.
    pub fn allocated(&self) -> usize {
        self.chapters.capacity()
    }

    pub fn chapters(&self) -> &[BlockId] {
        &self.chapters
    }

    /// Records a block just appended to the end of the chain.
    ///
    /// `block_count` is the chain length including the new block.
    pub fn note_appended(&mut self, id: BlockId, block_count: usize) {
        if (block_count - 1) % self.stride != 0 {
            return;
        }
        if self.chapters.len() == self.chapters.capacity() {
            self.chapters.reserve_exact(CHAPTER_GROWTH);
        }
        self.chapters.push(id);
    }

    /// Rebuilds the index after blocks were inserted or released mid-chain.
    pub fn rebuild(&mut self, chain: &BlockChain) {
        self.chapters.clear();
        self.chapters.extend(
            chain
                .iter()
                .step_by(self.stride)
                .map(|(id, _)| id),
        );
    }

    /// Returns the block a linear search for `line` may start from.
    ///
    /// This is the last chapter block that ends before `line`, or the first
    /// block of the chain if there is none. Scanning forward from it finds
    /// the same block a scan from the start of the chain would.
    pub fn scan_start(&self, chain: &BlockChain, line: usize) -> BlockId {
        let ends_before = self.chapters.partition_point(|&id| {
            let block = &chain[id];
            block.first_line + block.n_lines < line
        });
        match ends_before {
            0 => chain.first(),
            n => self.chapters[n - 1],
        }
    }
}
