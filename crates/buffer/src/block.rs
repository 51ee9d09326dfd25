// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain

//! Fixed-capacity data blocks.
//!
//! A data block is one segment of the document's internal byte stream. It
//! never grows past the capacity it was created with; the chain splits
//! content into a new block instead. Edits inside a block shift the bytes
//! after the edit point, which is cheap because blocks are small.

use crate::chain::BlockId;
use crate::error::{Result, StoreError};
use crate::line_ending::SENTINEL;

/// Counts sentinel bytes (line boundaries) in `bytes`.
#[inline]
pub(crate) fn count_sentinels(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == SENTINEL).count()
}

/// One fixed-capacity segment of the document.
#[derive(Debug)]
pub struct DataBlock {
    /// Document-global line number of the line that byte 0 belongs to.
    /// Equals the number of sentinels in all preceding blocks.
    pub(crate) first_line: usize,
    /// Number of sentinels in `data`.
    pub(crate) n_lines: usize,
    /// Bytes allocated for this block. `data.len()` never exceeds it.
    capacity: usize,
    data: Vec<u8>,
    pub(crate) prev: Option<BlockId>,
    pub(crate) next: Option<BlockId>,
}

impl DataBlock {
    /// Allocates an empty block able to hold `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        Ok(Self {
            first_line: 0,
            n_lines: 0,
            capacity,
            data,
            prev: None,
            next: None,
        })
    }

    /// Allocates a block and fills it with `bytes`.
    pub fn with_bytes(capacity: usize, bytes: &[u8]) -> Result<Self> {
        let mut block = Self::new(capacity)?;
        block.extend(bytes)?;
        Ok(block)
    }

    pub fn bytes_in_use(&self) -> usize {
        self.data.len()
    }

    pub fn bytes_allocated(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be written without exceeding capacity.
    pub fn spare(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Returns the offset where `line` starts within this block.
    ///
    /// `line` must lie in `first_line..=first_line + n_lines`. The returned
    /// offset may equal `bytes_in_use()` when the line begins in the next
    /// block.
    pub fn line_start_offset(&self, line: usize) -> Option<usize> {
        if line < self.first_line || line > self.first_line + self.n_lines {
            return None;
        }
        let mut remaining = line - self.first_line;
        if remaining == 0 {
            return Some(0);
        }
        for (pos, &byte) in self.data.iter().enumerate() {
            if byte == SENTINEL {
                remaining -= 1;
                if remaining == 0 {
                    return Some(pos + 1);
                }
            }
        }
        None
    }

    /// Appends bytes at the end of the block.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_room(bytes.len())?;
        self.data.extend_from_slice(bytes);
        self.n_lines += count_sentinels(bytes);
        Ok(())
    }

    /// Inserts bytes at `offset`, shifting the tail right.
    ///
    /// Returns the number of sentinels inserted.
    pub fn insert_at(&mut self, offset: usize, bytes: &[u8]) -> Result<usize> {
        if offset > self.data.len() {
            return Err(StoreError::corrupted(format!(
                "insert offset {offset} past block end {}",
                self.data.len()
            )));
        }
        self.ensure_room(bytes.len())?;

        let old_len = self.data.len();
        let n = bytes.len();
        self.data.resize(old_len + n, SENTINEL);
        self.data.copy_within(offset..old_len, offset + n);
        self.data[offset..offset + n].copy_from_slice(bytes);

        let added = count_sentinels(bytes);
        self.n_lines += added;
        Ok(added)
    }

    /// Removes `start..end`, shifting the tail left.
    ///
    /// Returns the removed bytes. An inverted range or one running past the
    /// bytes in use means a resolver bug and leaves the block untouched.
    pub fn remove_range(&mut self, start: usize, end: usize) -> Result<Vec<u8>> {
        if start > end || end > self.data.len() {
            return Err(StoreError::corrupted(format!(
                "remove range {start}..{end} outside block of {} bytes",
                self.data.len()
            )));
        }
        let removed: Vec<u8> = self.data.drain(start..end).collect();
        self.n_lines -= count_sentinels(&removed);
        Ok(removed)
    }

    /// Splits the block at `offset`, returning everything after it.
    pub fn split_off(&mut self, offset: usize) -> Vec<u8> {
        let offset = offset.min(self.data.len());
        let tail = self.data.split_off(offset);
        self.n_lines -= count_sentinels(&tail);
        tail
    }

    /// Overwrites the byte at `offset`. Neither byte may be a sentinel.
    pub fn overwrite(&mut self, offset: usize, byte: u8) -> Result<()> {
        match self.data.get_mut(offset) {
            Some(slot) if *slot != SENTINEL && byte != SENTINEL => {
                *slot = byte;
                Ok(())
            }
            Some(_) => Err(StoreError::corrupted(format!(
                "overwrite at {offset} would touch a line boundary"
            ))),
            None => Err(StoreError::corrupted(format!(
                "overwrite offset {offset} past block end {}",
                self.data.len()
            ))),
        }
    }

    /// Empties the block, keeping its allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.n_lines = 0;
    }

    /// Checks the block's own counters against its bytes.
    pub fn check(&self) -> Result<()> {
        if self.data.len() > self.capacity {
            return Err(StoreError::corrupted(format!(
                "block holds {} bytes but only {} allocated",
                self.data.len(),
                self.capacity
            )));
        }
        let sentinels = count_sentinels(&self.data);
        if sentinels != self.n_lines {
            return Err(StoreError::corrupted(format!(
                "block claims {} lines but holds {sentinels} boundaries",
                self.n_lines
            )));
        }
        Ok(())
    }

    fn ensure_room(&self, extra: usize) -> Result<()> {
        if self.data.len() + extra > self.capacity {
            return Err(StoreError::corrupted(format!(
                "write of {extra} bytes overflows block ({} of {} in use)",
                self.data.len(),
                self.capacity
            )));
        }
        Ok(())
    }
}
