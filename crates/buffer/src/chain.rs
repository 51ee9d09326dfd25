// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain

//! The block chain: data blocks in document order.
//!
//! Blocks live in an arena and refer to their neighbours by [`BlockId`]
//! rather than by pointer. Released slots are recycled, so an id is only
//! meaningful while its block is linked into the chain.

use std::ops::{Index, IndexMut};

use crate::block::DataBlock;
use crate::error::{Result, StoreError};

/// Stable handle to a block in a [`BlockChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

/// Doubly linked list of data blocks backed by an arena.
#[derive(Debug)]
pub struct BlockChain {
    slots: Vec<Option<DataBlock>>,
    /// Vacant slot indices available for reuse.
    free: Vec<usize>,
    first: BlockId,
    last: BlockId,
    len: usize,
}

impl BlockChain {
    /// Creates a chain holding a single block.
    pub fn new(block: DataBlock) -> Self {
        Self {
            slots: vec![Some(block)],
            free: Vec::new(),
            first: BlockId(0),
            last: BlockId(0),
            len: 1,
        }
    }

    pub fn first(&self) -> BlockId {
        self.first
    }

    pub fn last(&self) -> BlockId {
        self.last
    }

    /// Number of linked blocks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, id: BlockId) -> Option<&DataBlock> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut DataBlock> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn next(&self, id: BlockId) -> Option<BlockId> {
        self[id].next
    }

    pub fn prev(&self, id: BlockId) -> Option<BlockId> {
        self[id].prev
    }

    /// Links `block` after the current last block.
    pub fn push_back(&mut self, block: DataBlock) -> BlockId {
        let last = self.last;
        self.insert_after(last, block)
    }

    /// Links `block` directly after `after`.
    pub fn insert_after(&mut self, after: BlockId, mut block: DataBlock) -> BlockId {
        let next = self[after].next;
        block.prev = Some(after);
        block.next = next;
        let id = self.alloc(block);

        self[after].next = Some(id);
        match next {
            Some(next) => self[next].prev = Some(id),
            None => self.last = id,
        }
        self.len += 1;
        id
    }

    /// Unlinks and releases a block, returning it.
    ///
    /// The sole remaining block cannot be removed.
    pub fn remove(&mut self, id: BlockId) -> Result<DataBlock> {
        if self.len == 1 {
            return Err(StoreError::corrupted("attempt to release the only block"));
        }
        let block = self
            .slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| StoreError::corrupted(format!("release of stale block {}", id.0)))?;

        match block.prev {
            Some(prev) => self[prev].next = block.next,
            None => self.first = block.next.unwrap_or(self.first),
        }
        match block.next {
            Some(next) => self[next].prev = block.prev,
            None => self.last = block.prev.unwrap_or(self.last),
        }

        self.free.push(id.0);
        self.len -= 1;
        Ok(block)
    }

    /// Releases every block after `id`, making `id` the last block.
    ///
    /// Returns the number of blocks released.
    pub fn truncate_after(&mut self, id: BlockId) -> usize {
        let mut released = 0;
        let mut cursor = self[id].next.take();
        while let Some(cur) = cursor {
            cursor = self.slots[cur.0].take().and_then(|block| block.next);
            self.free.push(cur.0);
            released += 1;
        }
        self.last = id;
        self.len -= released;
        released
    }

    /// Recomputes `first_line` for `from` and every block after it from the
    /// line counts of the blocks before.
    pub fn renumber_from(&mut self, from: BlockId) {
        let mut first_line = match self[from].prev {
            Some(prev) => self[prev].first_line + self[prev].n_lines,
            None => 0,
        };
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let block = &mut self[id];
            block.first_line = first_line;
            first_line += block.n_lines;
            cursor = block.next;
        }
    }

    /// Iterates blocks in document order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            chain: self,
            cursor: Some(self.first),
        }
    }

    /// Iterates the bytes of the chain starting at `(block, offset)`.
    pub fn bytes_from(&self, block: BlockId, offset: usize) -> Bytes<'_> {
        Bytes {
            chain: self,
            block: Some(block),
            offset,
        }
    }

    fn alloc(&mut self, block: DataBlock) -> BlockId {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(block);
                BlockId(slot)
            }
            None => {
                self.slots.push(Some(block));
                BlockId(self.slots.len() - 1)
            }
        }
    }
}

impl Index<BlockId> for BlockChain {
    type Output = DataBlock;

    fn index(&self, id: BlockId) -> &DataBlock {
        match self.get(id) {
            Some(block) => block,
            None => panic!("block {} is not linked into the chain", id.0),
        }
    }
}

impl IndexMut<BlockId> for BlockChain {
    fn index_mut(&mut self, id: BlockId) -> &mut DataBlock {
        match self.get_mut(id) {
            Some(block) => block,
            None => panic!("block {} is not linked into the chain", id.0),
        }
    }
}

/// Iterator over `(id, block)` pairs in chain order.
#[derive(Debug)]
pub struct Iter<'a> {
    chain: &'a BlockChain,
    cursor: Option<BlockId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (BlockId, &'a DataBlock);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let block = self.chain.get(id)?;
        self.cursor = block.next;
        Some((id, block))
    }
}

/// Iterator over raw bytes across block boundaries.
///
/// Yields `(block, offset, byte)` so callers can stop at a resolved position.
#[derive(Debug)]
pub struct Bytes<'a> {
    chain: &'a BlockChain,
    block: Option<BlockId>,
    offset: usize,
}

impl Iterator for Bytes<'_> {
    type Item = (BlockId, usize, u8);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.block?;
            let block = self.chain.get(id)?;
            if let Some(byte) = block.byte_at(self.offset) {
                let item = (id, self.offset, byte);
                self.offset += 1;
                return Some(item);
            }
            self.block = block.next;
            self.offset = 0;
        }
    }
}
