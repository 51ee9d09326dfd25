// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain

//! Position resolution: (line, column) to (block, offset).
//!
//! Every query and mutation goes through these helpers. Resolved cursors are
//! canonical: they point at an actual byte, or at the end of the document.
//! A cursor never sits at the end of a block that has a successor.

use crate::chain::BlockId;
use crate::error::{Result, StoreError};
use crate::line_ending::{is_line_ending_byte, SENTINEL};
use crate::text_store::TextStore;

/// A resolved byte position inside the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub block: BlockId,
    pub offset: usize,
}

impl Cursor {
    pub fn new(block: BlockId, offset: usize) -> Self {
        Self { block, offset }
    }
}

impl TextStore {
    pub(crate) fn check_line(&self, line: usize) -> Result<()> {
        if line >= self.n_lines {
            return Err(StoreError::LineOutOfBounds {
                line,
                line_count: self.n_lines,
            });
        }
        Ok(())
    }

    /// Finds the block containing the start of `line`.
    ///
    /// A block contains the start of `line` when
    /// `line <= first_line + n_lines`; the first such block wins.
    pub(crate) fn find_block_for_line(&self, line: usize) -> Result<BlockId> {
        let mut cursor = Some(self.chapters.scan_start(&self.chain, line));
        while let Some(id) = cursor {
            let block = &self.chain[id];
            if block.bytes_in_use() > block.bytes_allocated() {
                return Err(StoreError::corrupted(format!(
                    "block with first line {} overflows its allocation",
                    block.first_line
                )));
            }
            if line <= block.first_line + block.n_lines {
                return Ok(id);
            }
            cursor = block.next;
        }
        Err(StoreError::corrupted(format!(
            "block chain exhausted looking for line {line}"
        )))
    }

    /// Resolves the first byte of `line`.
    pub(crate) fn line_start(&self, line: usize) -> Result<Cursor> {
        let block = self.find_block_for_line(line)?;
        let offset = self.chain[block].line_start_offset(line).ok_or_else(|| {
            StoreError::corrupted(format!("line {line} not found in its owning block"))
        })?;
        Ok(self.normalize(Cursor::new(block, offset)))
    }

    /// Resolves `col` bytes into `line`, crossing block boundaries as needed.
    ///
    /// `col` may equal the line length, which addresses the line ending (or
    /// the end of the document on the last line).
    pub(crate) fn position_in_line(&self, line: usize, col: usize) -> Result<Cursor> {
        self.check_line(line)?;
        let start = self.line_start(line)?;

        let mut consumed = 0;
        let mut end = start;
        for (block, offset, byte) in self.chain.bytes_from(start.block, start.offset) {
            if consumed == col {
                return Ok(Cursor::new(block, offset));
            }
            if byte == SENTINEL || is_line_ending_byte(byte) {
                return Err(StoreError::ColumnOutOfBounds {
                    line,
                    col,
                    line_len: consumed,
                });
            }
            consumed += 1;
            end = Cursor::new(block, offset + 1);
        }

        if consumed == col {
            Ok(end)
        } else {
            Err(StoreError::ColumnOutOfBounds {
                line,
                col,
                line_len: consumed,
            })
        }
    }

    /// Iterates the content bytes of the line starting at `start`.
    pub(crate) fn line_bytes_from(&self, start: Cursor) -> impl Iterator<Item = u8> + '_ {
        self.chain
            .bytes_from(start.block, start.offset)
            .map(|(_, _, byte)| byte)
            .take_while(|&byte| byte != SENTINEL && !is_line_ending_byte(byte))
    }

    /// Iterates raw bytes in `[from, to)`, sentinels included.
    pub(crate) fn bytes_between(&self, from: Cursor, to: Cursor) -> impl Iterator<Item = u8> + '_ {
        self.chain
            .bytes_from(from.block, from.offset)
            .take_while(move |&(block, offset, _)| !(block == to.block && offset == to.offset))
            .map(|(_, _, byte)| byte)
    }

    /// The byte at a cursor, or `None` at the end of the document.
    pub(crate) fn byte_at(&self, at: Cursor) -> Option<u8> {
        let at = self.normalize(at);
        self.chain[at.block].byte_at(at.offset)
    }

    /// The byte immediately before `at` and its cursor, stepping back over
    /// block boundaries.
    pub(crate) fn byte_before(&self, at: Cursor) -> Option<(Cursor, u8)> {
        if let Some(offset) = at.offset.checked_sub(1) {
            let byte = self.chain[at.block].byte_at(offset)?;
            return Some((Cursor::new(at.block, offset), byte));
        }
        let mut cursor = self.chain.prev(at.block);
        while let Some(id) = cursor {
            let block = &self.chain[id];
            if let Some(offset) = block.bytes_in_use().checked_sub(1) {
                let byte = block.byte_at(offset)?;
                return Some((Cursor::new(id, offset), byte));
            }
            cursor = block.prev;
        }
        None
    }

    /// Returns true if `at` starts a line whose predecessor ends in a bare
    /// `\r`.
    pub(crate) fn follows_bare_cr(&self, at: Cursor) -> bool {
        match self.byte_before(at) {
            Some((boundary, SENTINEL)) => {
                matches!(self.byte_before(boundary), Some((_, b'\r')))
            }
            _ => false,
        }
    }

    /// Checks that replacing the raw bytes in `[from, to)` with `bytes`
    /// does not put a `\n` ending directly after a bare `\r` ending.
    ///
    /// Transport text reads such a pair as one `\r\n`, so the stored line
    /// count would no longer match the text. `bytes` must already be
    /// encoded.
    pub(crate) fn check_join(&self, from: Cursor, to: Cursor, bytes: &[u8]) -> Result<()> {
        let next = self.byte_at(to);
        let first = bytes.first().copied().or(next);
        let cr_then_lf = (first == Some(b'\n') && self.follows_bare_cr(from))
            || (bytes.ends_with(&[b'\r', SENTINEL]) && next == Some(b'\n'));
        if cr_then_lf {
            return Err(StoreError::InvalidArgument(
                "edit would place a \\n line ending directly after a \\r line ending".to_string(),
            ));
        }
        Ok(())
    }

    /// Moves a cursor sitting at the end of a block to the start of the next
    /// non-empty block.
    pub(crate) fn normalize(&self, mut cursor: Cursor) -> Cursor {
        loop {
            let block = &self.chain[cursor.block];
            if cursor.offset < block.bytes_in_use() {
                return cursor;
            }
            match block.next {
                Some(next) => cursor = Cursor::new(next, 0),
                None => return cursor,
            }
        }
    }
}
