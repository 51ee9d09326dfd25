// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain

//! TextStore is the public API for line-oriented text storage.
//!
//! It combines a chain of fixed-capacity data blocks (for content storage)
//! with a chapter index (for fast line lookup) and keeps the document-wide
//! line and byte totals in step with every edit.
//!
//! All coordinates are (line, column) pairs counted in bytes. Queries return
//! freshly allocated copies; nothing hands out references into the blocks.

use tracing::{debug, trace};

use crate::block::{count_sentinels, DataBlock};
use crate::chain::{BlockChain, BlockId};
use crate::chapter_index::ChapterIndex;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::line_ending::{decode, encode, is_line_ending_byte, Encoded, SENTINEL};
use crate::resolve::Cursor;
use crate::types::{BlockStats, Position};

/// A block-structured multi-line text store.
///
/// The store maintains:
/// - Content as a chain of data blocks, each holding whole or partial lines
/// - A chapter index over the chain for line lookup in large documents
/// - The total line count and byte length of the document
///
/// There is always one more line than there are line endings, so an empty
/// store has one (empty) line.
#[derive(Debug)]
pub struct TextStore {
    pub(crate) config: StoreConfig,
    pub(crate) chain: BlockChain,
    pub(crate) chapters: ChapterIndex,
    pub(crate) n_lines: usize,
    pub(crate) length: usize,
    /// Mutation counter for sampling debug assertions (debug builds only).
    #[cfg(debug_assertions)]
    debug_mutation_count: u64,
}

impl TextStore {
    /// Creates an empty store. A zero `block_size` or `chapter_size` selects
    /// the default (2048 bytes, 10 blocks per chapter).
    pub fn new(block_size: usize, chapter_size: usize) -> Result<Self> {
        Self::with_config(StoreConfig::with_sizes(block_size, chapter_size))
    }

    /// Creates an empty store from a full configuration.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;

        let chain = BlockChain::new(DataBlock::new(config.block_size)?);
        let chapters = ChapterIndex::new(config.chapter_size, chain.first());

        Ok(Self {
            config,
            chain,
            chapters,
            n_lines: 1,
            length: 0,
            #[cfg(debug_assertions)]
            debug_mutation_count: 0,
        })
    }

    /// Creates a default-sized store holding `text`.
    pub fn from_text(text: impl AsRef<[u8]>) -> Result<Self> {
        let mut store = Self::new(0, 0)?;
        store.set_text(text)?;
        Ok(store)
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn chapter_size(&self) -> usize {
        self.config.chapter_size
    }

    pub fn over_provision_pct(&self) -> u8 {
        self.config.over_provision_pct
    }

    /// Sets the slack left in each block by later loads and splits.
    ///
    /// Must be in `0..=99`.
    pub fn set_over_provision_pct(&mut self, pct: u8) -> Result<()> {
        let config = StoreConfig {
            over_provision_pct: pct,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Total bytes of text, line endings included.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of lines. Always at least 1.
    pub fn line_count(&self) -> usize {
        self.n_lines
    }

    /// Returns true if `line <= line_count()`.
    ///
    /// The bound is inclusive: the line just past the last one is reported
    /// as present.
    pub fn has_line(&self, line: usize) -> bool {
        line <= self.n_lines
    }

    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn chapters_allocated(&self) -> usize {
        self.chapters.allocated()
    }

    /// Per-block counters in chain order.
    pub fn blocks(&self) -> Vec<BlockStats> {
        self.chain
            .iter()
            .map(|(_, block)| BlockStats {
                first_line: block.first_line,
                n_lines: block.n_lines,
                bytes_in_use: block.bytes_in_use(),
                bytes_allocated: block.bytes_allocated(),
            })
            .collect()
    }

    // ==================== Queries ====================

    /// Length of `line` in bytes, excluding its line ending.
    pub fn line_len(&self, line: usize) -> Result<usize> {
        self.check_line(line)?;
        let start = self.line_start(line)?;
        Ok(self.line_bytes_from(start).count())
    }

    /// Copy of `line`, excluding its line ending.
    pub fn line(&self, line: usize) -> Result<Vec<u8>> {
        let len = self.line_len(line)?;
        let start = self.line_start(line)?;
        let mut out = Vec::new();
        out.try_reserve_exact(len)?;
        out.extend(self.line_bytes_from(start));
        Ok(out)
    }

    /// Copy of the text between two positions, line endings included.
    ///
    /// Both positions must be valid. An inverted range yields an empty copy.
    pub fn section(&self, start: impl Into<Position>, end: impl Into<Position>) -> Result<Vec<u8>> {
        let Some((from, to)) = self.section_range(start.into(), end.into())? else {
            return Ok(Vec::new());
        };

        if from.block == to.block {
            let bytes = &self.chain[from.block].bytes()[from.offset..to.offset];
            return Ok(decode(bytes));
        }

        let mut out = Vec::new();
        out.try_reserve_exact(self.count_text_bytes(from, to))?;
        out.extend(self.bytes_between(from, to).filter(|&b| b != SENTINEL));
        Ok(out)
    }

    /// Number of bytes [`section`](Self::section) would return.
    pub fn section_len(&self, start: impl Into<Position>, end: impl Into<Position>) -> Result<usize> {
        match self.section_range(start.into(), end.into())? {
            Some((from, to)) => Ok(self.count_text_bytes(from, to)),
            None => Ok(0),
        }
    }

    /// Copy of the whole document.
    pub fn text(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length);
        for (_, block) in self.chain.iter() {
            out.extend(block.bytes().iter().copied().filter(|&b| b != SENTINEL));
        }
        out
    }

    fn section_range(&self, start: Position, end: Position) -> Result<Option<(Cursor, Cursor)>> {
        let from = self.position_in_line(start.line, start.col)?;
        let to = self.position_in_line(end.line, end.col)?;
        if start >= end {
            return Ok(None);
        }
        Ok(Some((from, to)))
    }

    fn count_text_bytes(&self, from: Cursor, to: Cursor) -> usize {
        self.bytes_between(from, to).filter(|&b| b != SENTINEL).count()
    }

    // ==================== Validation ====================

    /// Recomputes every derived counter from the raw bytes.
    ///
    /// Returns [`StoreError::CorruptedStore`] on the first mismatch.
    pub fn validate(&self) -> Result<()> {
        let mut expected_first = 0;
        let mut length = 0;
        let mut count = 0;
        let mut prev: Option<BlockId> = None;

        for (id, block) in self.chain.iter().take(self.chain.len() + 1) {
            count += 1;
            block.check()?;
            if block.prev != prev {
                return Err(StoreError::corrupted(format!(
                    "block {count} has a broken back link"
                )));
            }
            if block.first_line != expected_first {
                return Err(StoreError::corrupted(format!(
                    "block {count} starts at line {} but follows {expected_first} boundaries",
                    block.first_line
                )));
            }
            if block.is_empty() && self.chain.len() > 1 {
                return Err(StoreError::corrupted(format!("block {count} is empty")));
            }
            expected_first += block.n_lines;
            length += block.bytes_in_use() - block.n_lines;
            prev = Some(id);
        }

        if count != self.chain.len() || prev != Some(self.chain.last()) {
            return Err(StoreError::corrupted(format!(
                "chain walk visited {count} of {} blocks",
                self.chain.len()
            )));
        }
        if expected_first + 1 != self.n_lines {
            return Err(StoreError::corrupted(format!(
                "store claims {} lines but holds {expected_first} boundaries",
                self.n_lines
            )));
        }
        if length != self.length {
            return Err(StoreError::corrupted(format!(
                "store claims {} bytes but holds {length}",
                self.length
            )));
        }

        self.validate_encoding()?;

        let mut expected = self.chapters.clone();
        expected.rebuild(&self.chain);
        if expected.chapters() != self.chapters.chapters() {
            return Err(StoreError::corrupted("chapter index out of step with chain"));
        }
        Ok(())
    }

    /// Every sentinel follows a line ending, every line ending is closed by
    /// a sentinel, and no `\n` ending directly follows a bare `\r` ending.
    fn validate_encoding(&self) -> Result<()> {
        let mut prev: Option<u8> = None;
        let mut after_bare_cr = false;
        for (_, _, byte) in self.chain.bytes_from(self.chain.first(), 0) {
            let ok = match (prev, byte) {
                (Some(b'\n'), b) => b == SENTINEL,
                (Some(b'\r'), b) => b == SENTINEL || b == b'\n',
                (_, SENTINEL) => false,
                _ => true,
            };
            if !ok {
                return Err(StoreError::corrupted("line ending without boundary marker"));
            }
            if after_bare_cr && byte == b'\n' {
                return Err(StoreError::corrupted("\\n line ending directly after a \\r line ending"));
            }
            after_bare_cr = prev == Some(b'\r') && byte == SENTINEL;
            prev = Some(byte);
        }
        match prev {
            Some(b) if is_line_ending_byte(b) => {
                Err(StoreError::corrupted("document ends inside a line ending"))
            }
            _ => Ok(()),
        }
    }

    /// Debug assertion: verifies the store against its raw bytes.
    ///
    /// Uses a mutation counter so the O(n) walk doesn't tank perf in tight
    /// loops; checks every 64th mutation. Compiled out in release builds.
    #[cfg(debug_assertions)]
    fn assert_consistent(&mut self) {
        self.debug_mutation_count += 1;
        if self.debug_mutation_count % 64 != 0 {
            return;
        }
        if let Err(err) = self.validate() {
            panic!(
                "text store drift detected after {} mutations: {err}\n  blocks: {:?}",
                self.debug_mutation_count,
                self.blocks()
            );
        }
    }

    #[cfg(not(debug_assertions))]
    fn assert_consistent(&mut self) {}

    // ==================== Mutations ====================

    /// Replaces the whole document.
    ///
    /// Lines may end in `\n`, `\r` or `\r\n`. Blocks are filled to the
    /// over-provisioned fill level; the chain grows or shrinks to fit.
    pub fn set_text(&mut self, text: impl AsRef<[u8]>) -> Result<()> {
        let encoded = encode(text.as_ref())?;
        self.load_internal(&encoded.bytes)?;
        debug!(
            bytes = self.length,
            lines = self.n_lines,
            blocks = self.chain.len(),
            "loaded text"
        );
        self.assert_consistent();
        Ok(())
    }

    /// Inserts one byte at `(line, col)`.
    ///
    /// A `\n` or `\r` splits the line. A `\n` that would land directly
    /// after a `\r` line ending, or a `\r` directly before a `\n` one, is
    /// rejected with `InvalidArgument`: the text would read the pair as one
    /// `\r\n`.
    pub fn insert_char(&mut self, line: usize, col: usize, ch: u8) -> Result<()> {
        reject_sentinel(ch)?;
        let at = self.position_in_line(line, col)?;
        let encoded = [ch, SENTINEL];
        let bytes = if is_line_ending_byte(ch) { &encoded[..] } else { &encoded[..1] };
        self.check_join(at, at, bytes)?;
        self.splice_in(at, bytes)?;
        self.assert_consistent();
        Ok(())
    }

    /// Inserts `text` at `(line, col)`.
    ///
    /// Returns the position immediately after the inserted text.
    pub fn insert_text(&mut self, line: usize, col: usize, text: impl AsRef<[u8]>) -> Result<Position> {
        let encoded = encode(text.as_ref())?;
        let at = self.position_in_line(line, col)?;
        if encoded.bytes.is_empty() {
            return Ok(Position::new(line, col));
        }
        self.check_join(at, at, &encoded.bytes)?;
        self.splice_in(at, &encoded.bytes)?;
        self.assert_consistent();
        Ok(end_of_insert(line, col, &encoded))
    }

    /// Deletes the byte at `(line, col)`.
    ///
    /// At the end of a line this removes the whole line ending, joining the
    /// next line onto this one.
    pub fn delete_char(&mut self, line: usize, col: usize) -> Result<()> {
        let at = self.position_in_line(line, col)?;
        match self.chain[at.block].byte_at(at.offset) {
            Some(byte) if is_line_ending_byte(byte) => self.merge_lines(line),
            Some(_) => {
                let to = Cursor::new(at.block, at.offset + 1);
                self.check_join(at, to, &[])?;
                self.remove_between(at, to)?;
                self.assert_consistent();
                Ok(())
            }
            None => Err(StoreError::ColumnOutOfBounds {
                line,
                col,
                line_len: col,
            }),
        }
    }

    /// Joins `line + 1` onto the end of `line`. A no-op on the last line.
    pub fn merge_lines(&mut self, line: usize) -> Result<()> {
        self.check_line(line)?;
        if line + 1 == self.n_lines {
            return Ok(());
        }
        let len = self.line_len(line)?;
        let from = self.position_in_line(line, len)?;
        let to = self.line_start(line + 1)?;
        self.check_join(from, to, &[])?;
        self.remove_between(from, to)?;
        self.assert_consistent();
        Ok(())
    }

    /// Deletes the text between two positions. An inverted range is a no-op.
    pub fn delete_section(&mut self, start: impl Into<Position>, end: impl Into<Position>) -> Result<()> {
        let Some((from, to)) = self.section_range(start.into(), end.into())? else {
            return Ok(());
        };
        self.check_join(from, to, &[])?;
        self.remove_between(from, to)?;
        self.assert_consistent();
        Ok(())
    }

    /// Overwrites the byte at `(line, col)`.
    ///
    /// Replacing with `\n` or `\r` splits the line, so the document grows
    /// by a line even though no text byte was added.
    pub fn replace_char(&mut self, line: usize, col: usize, ch: u8) -> Result<()> {
        reject_sentinel(ch)?;
        let len = self.line_len(line)?;
        if col >= len {
            return Err(StoreError::ColumnOutOfBounds {
                line,
                col,
                line_len: len,
            });
        }
        let at = self.position_in_line(line, col)?;
        let after = Cursor::new(at.block, at.offset + 1);
        let encoded = [ch, SENTINEL];
        let bytes = if is_line_ending_byte(ch) { &encoded[..] } else { &encoded[..1] };
        self.check_join(at, after, bytes)?;

        // The sentinel goes in first; the byte at `at` stays put either way.
        if bytes.len() > 1 {
            self.splice_in(after, &[SENTINEL])?;
        }
        self.chain[at.block].overwrite(at.offset, ch)?;
        self.assert_consistent();
        Ok(())
    }

    /// Overwrites bytes from `(line, col)` with `text`, extending the line
    /// when `text` runs past its end.
    ///
    /// Returns the position immediately after the written text.
    pub fn replace_chars(&mut self, line: usize, col: usize, text: impl AsRef<[u8]>) -> Result<Position> {
        let text = text.as_ref();
        let len = self.line_len(line)?;
        if col > len {
            return Err(StoreError::ColumnOutOfBounds {
                line,
                col,
                line_len: len,
            });
        }
        let overwritten = (col + text.len()).min(len);
        self.replace_span(line, col, overwritten, text)
    }

    /// Inserts `text` as a new line before `line`.
    ///
    /// `line == line_count()` appends after the last line. The new line ends
    /// with the configured line ending.
    pub fn insert_line(&mut self, line: usize, text: impl AsRef<[u8]>) -> Result<()> {
        let text = text.as_ref();
        if line > self.n_lines {
            return Err(StoreError::LineOutOfBounds {
                line,
                line_count: self.n_lines,
            });
        }
        let ending = self.config.line_ending.as_bytes();

        if line < self.n_lines {
            let mut bytes = Vec::with_capacity(text.len() + ending.len());
            bytes.extend_from_slice(text);
            bytes.extend_from_slice(ending);
            self.insert_text(line, 0, bytes)?;
        } else {
            let last = self.n_lines - 1;
            let last_len = self.line_len(last)?;
            let mut bytes = Vec::with_capacity(text.len() + ending.len());
            bytes.extend_from_slice(ending);
            bytes.extend_from_slice(text);
            self.insert_text(last, last_len, bytes)?;
        }
        Ok(())
    }

    /// Inserts `text` as a new line after `line`.
    pub fn insert_line_after(&mut self, line: usize, text: impl AsRef<[u8]>) -> Result<()> {
        self.check_line(line)?;
        self.insert_line(line + 1, text)
    }

    /// Removes `line` and its line ending.
    ///
    /// The last line takes the preceding line ending with it. Deleting the
    /// only line leaves it empty.
    pub fn delete_line(&mut self, line: usize) -> Result<()> {
        self.check_line(line)?;
        if self.n_lines == 1 {
            let len = self.line_len(0)?;
            return self.delete_section((0, 0), (0, len));
        }
        if line + 1 < self.n_lines {
            return self.delete_section((line, 0), (line + 1, 0));
        }
        let prev_len = self.line_len(line - 1)?;
        let len = self.line_len(line)?;
        self.delete_section((line - 1, prev_len), (line, len))
    }

    /// Replaces the content of `line`, keeping its line ending.
    pub fn replace_line(&mut self, line: usize, text: impl AsRef<[u8]>) -> Result<()> {
        let len = self.line_len(line)?;
        self.replace_span(line, 0, len, text.as_ref())?;
        Ok(())
    }

    /// Housekeeping after many small edits.
    ///
    /// Level 0 does nothing. Any higher level repacks the chain so every
    /// block sits at the fill level, releasing blocks no longer needed.
    pub fn refactor(&mut self, level: u32) -> Result<()> {
        if level == 0 {
            return Ok(());
        }
        let before = self.chain.len();
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(self.length + self.n_lines)?;
        for (_, block) in self.chain.iter() {
            bytes.extend_from_slice(block.bytes());
        }
        self.load_internal(&bytes)?;
        debug!(before, after = self.chain.len(), "compacted block chain");
        self.assert_consistent();
        Ok(())
    }

    /// Replaces columns `col..end` of `line` with `text`.
    ///
    /// The joined result is checked before anything is removed, so a
    /// rejected replacement leaves the store unchanged.
    fn replace_span(&mut self, line: usize, col: usize, end: usize, text: &[u8]) -> Result<Position> {
        let encoded = encode(text)?;
        let from = self.position_in_line(line, col)?;
        let to = self.position_in_line(line, end)?;
        self.check_join(from, to, &encoded.bytes)?;

        self.remove_between(from, to)?;
        if !encoded.bytes.is_empty() {
            let at = self.position_in_line(line, col)?;
            self.splice_in(at, &encoded.bytes)?;
        }
        self.assert_consistent();
        Ok(end_of_insert(line, col, &encoded))
    }

    // ==================== Block-level helpers ====================

    /// Distributes internal bytes over the chain, reusing blocks in order,
    /// appending blocks as needed and releasing the surplus.
    fn load_internal(&mut self, bytes: &[u8]) -> Result<()> {
        let fill = self.config.fill_level();
        let required = bytes.len().div_ceil(fill).max(1);
        let existing = self.chain.len();

        let mut fresh = Vec::with_capacity(required.saturating_sub(existing));
        for _ in existing..required {
            fresh.push(DataBlock::new(self.config.block_size)?);
        }

        let mut chunks = bytes.chunks(fill);
        let reused: Vec<BlockId> = self.chain.iter().take(required).map(|(id, _)| id).collect();
        for &id in &reused {
            let block = &mut self.chain[id];
            block.clear();
            if let Some(chunk) = chunks.next() {
                block.extend(chunk)?;
            }
        }

        if required < existing {
            if let Some(&last) = reused.last() {
                let released = self.chain.truncate_after(last);
                self.chapters.rebuild(&self.chain);
                debug!(released, "trimmed surplus blocks");
            }
        }

        for mut block in fresh {
            if let Some(chunk) = chunks.next() {
                block.extend(chunk)?;
            }
            let id = self.chain.push_back(block);
            self.chapters.note_appended(id, self.chain.len());
        }

        let first = self.chain.first();
        self.chain.renumber_from(first);
        let boundaries = count_sentinels(bytes);
        self.n_lines = boundaries + 1;
        self.length = bytes.len() - boundaries;
        Ok(())
    }

    /// Inserts internal bytes at a resolved position, splitting the block
    /// when it lacks room.
    fn splice_in(&mut self, at: Cursor, bytes: &[u8]) -> Result<()> {
        let boundaries = count_sentinels(bytes);
        if self.chain[at.block].spare() >= bytes.len() {
            self.chain[at.block].insert_at(at.offset, bytes)?;
        } else {
            self.split_insert(at, bytes)?;
        }
        trace!(offset = at.offset, len = bytes.len(), boundaries, "spliced bytes");

        self.n_lines += boundaries;
        self.length += bytes.len() - boundaries;
        self.chain.renumber_from(at.block);
        Ok(())
    }

    /// Inserts by moving the block's tail plus the new bytes into the block
    /// and as many fresh blocks after it as needed.
    ///
    /// Every allocation happens before the chain is touched.
    fn split_insert(&mut self, at: Cursor, bytes: &[u8]) -> Result<()> {
        let fill = self.config.fill_level();
        let block = &self.chain[at.block];
        let tail = &block.bytes()[at.offset..];

        let mut pending = Vec::new();
        pending.try_reserve_exact(bytes.len() + tail.len())?;
        pending.extend_from_slice(bytes);
        pending.extend_from_slice(tail);

        let head = fill.saturating_sub(at.offset).min(pending.len());
        let mut fresh = Vec::new();
        for chunk in pending[head..].chunks(fill) {
            fresh.push(DataBlock::with_bytes(self.config.block_size, chunk)?);
        }

        let block = &mut self.chain[at.block];
        block.split_off(at.offset);
        block.extend(&pending[..head])?;

        let added = fresh.len();
        let mut after = at.block;
        for block in fresh {
            after = self.chain.insert_after(after, block);
        }
        self.chapters.rebuild(&self.chain);
        debug!(added, blocks = self.chain.len(), "split block on insert");
        Ok(())
    }

    /// Removes the raw bytes in `[from, to)`, releasing any block emptied
    /// or fully covered by the range.
    fn remove_between(&mut self, from: Cursor, to: Cursor) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let anchor = self.chain.prev(from.block);
        let mut released = 0;

        let (len, boundaries) = if from.block == to.block {
            if from.offset > to.offset {
                return Err(StoreError::corrupted("range end precedes its start"));
            }
            let bytes = self.chain[from.block].remove_range(from.offset, to.offset)?;
            (bytes.len(), count_sentinels(&bytes))
        } else {
            // Walk the whole span before changing anything.
            let mut covered = Vec::new();
            let mut cursor = self.chain.next(from.block);
            loop {
                match cursor {
                    Some(id) if id == to.block => break,
                    Some(id) => {
                        covered.push(id);
                        cursor = self.chain.next(id);
                    }
                    None => return Err(StoreError::corrupted("range end precedes its start")),
                }
            }

            let head = self.chain[to.block].remove_range(0, to.offset)?;
            let tail = self.chain[from.block].split_off(from.offset);
            let mut len = tail.len() + head.len();
            let mut boundaries = count_sentinels(&tail) + count_sentinels(&head);
            for &id in &covered {
                let block = self.chain.remove(id)?;
                len += block.bytes_in_use();
                boundaries += block.n_lines;
                released += 1;
            }
            if self.release_if_empty(to.block)? {
                released += 1;
            }
            (len, boundaries)
        };
        if self.release_if_empty(from.block)? {
            released += 1;
        }

        self.n_lines -= boundaries;
        self.length -= len - boundaries;
        if released > 0 {
            self.chapters.rebuild(&self.chain);
            debug!(released, blocks = self.chain.len(), "released blocks on delete");
        }
        let start = anchor.unwrap_or_else(|| self.chain.first());
        self.chain.renumber_from(start);
        Ok(())
    }

    /// Releases `id` if it is empty and not the only block.
    fn release_if_empty(&mut self, id: BlockId) -> Result<bool> {
        if self.chain.len() > 1 && self.chain[id].is_empty() {
            self.chain.remove(id)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Position just past `encoded` once inserted at `(line, col)`.
fn end_of_insert(line: usize, col: usize, encoded: &Encoded) -> Position {
    match encoded.line_endings {
        0 => Position::new(line, col + encoded.tail_len),
        n => Position::new(line + n, encoded.tail_len),
    }
}

fn reject_sentinel(ch: u8) -> Result<()> {
    if ch == SENTINEL {
        return Err(StoreError::InvalidArgument(
            "NUL is reserved as the line boundary marker".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(store: &TextStore) -> Vec<String> {
        (0..store.line_count())
            .map(|i| String::from_utf8(store.line(i).unwrap()).unwrap())
            .collect()
    }

    // ==================== Construction ====================

    #[test]
    fn test_new_is_one_empty_line() {
        let store = TextStore::new(0, 0).unwrap();
        assert_eq!(store.line_count(), 1);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.block_size(), 2048);
        assert_eq!(store.chapter_size(), 10);
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.line(0).unwrap(), b"");
        store.validate().unwrap();
    }

    #[test]
    fn test_with_config_rejects_bad_pct() {
        let config = StoreConfig {
            over_provision_pct: 150,
            ..StoreConfig::default()
        };
        assert!(matches!(
            TextStore::with_config(config),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_over_provision_pct() {
        let mut store = TextStore::new(0, 0).unwrap();
        store.set_over_provision_pct(50).unwrap();
        assert_eq!(store.over_provision_pct(), 50);
        assert!(store.set_over_provision_pct(100).is_err());
        assert_eq!(store.over_provision_pct(), 50);
    }

    // ==================== Loading ====================

    #[test]
    fn test_set_text_counts_mixed_endings() {
        let mut store = TextStore::new(0, 0).unwrap();
        store.set_text("a\r\nb\rc\nd").unwrap();
        assert_eq!(store.line_count(), 4);
        assert_eq!(store.len(), 8);
        assert_eq!(lines(&store), vec!["a", "b", "c", "d"]);
        assert_eq!(store.text(), b"a\r\nb\rc\nd");
    }

    #[test]
    fn test_set_text_rejects_nul() {
        let mut store = TextStore::from_text("keep").unwrap();
        assert!(matches!(
            store.set_text("a\0b"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(store.text(), b"keep");
    }

    #[test]
    fn test_set_text_grows_and_shrinks_chain() {
        let mut store = TextStore::new(8, 2).unwrap();
        store.set_text("x".repeat(70)).unwrap();
        assert_eq!(store.block_count(), 10);
        assert_eq!(store.chapter_count(), 5);

        store.set_text("short").unwrap();
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.chapter_count(), 1);
        assert_eq!(store.text(), b"short");
        store.validate().unwrap();
    }

    #[test]
    fn test_chapters_allocated_covers_chapters() {
        let mut store = TextStore::new(8, 1).unwrap();
        assert_eq!(store.chapter_count(), 1);
        assert!(store.chapters_allocated() >= 20);

        store.set_text("x".repeat(200)).unwrap();
        assert_eq!(store.chapter_count(), 29);
        assert!(store.chapters_allocated() >= store.chapter_count());
    }

    #[test]
    fn test_set_text_respects_fill_level() {
        let mut store = TextStore::new(100, 0).unwrap();
        store.set_over_provision_pct(50).unwrap();
        store.set_text("y".repeat(120)).unwrap();
        let blocks = store.blocks();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.bytes_in_use <= 50));
        assert!(blocks.iter().all(|b| b.bytes_allocated == 100));
    }

    // ==================== Queries ====================

    #[test]
    fn test_has_line_is_inclusive() {
        let store = TextStore::from_text("a\nb").unwrap();
        assert!(store.has_line(0));
        assert!(store.has_line(2));
        assert!(!store.has_line(3));
    }

    #[test]
    fn test_line_len_excludes_endings() {
        let store = TextStore::from_text("abc\r\nde\n").unwrap();
        assert_eq!(store.line_len(0).unwrap(), 3);
        assert_eq!(store.line_len(1).unwrap(), 2);
        assert_eq!(store.line_len(2).unwrap(), 0);
        assert!(store.line_len(3).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn test_section_single_line() {
        let store = TextStore::from_text("hello world").unwrap();
        assert_eq!(store.section((0, 6), (0, 11)).unwrap(), b"world");
        assert_eq!(store.section_len((0, 6), (0, 11)).unwrap(), 5);
    }

    #[test]
    fn test_section_keeps_original_endings() {
        let store = TextStore::from_text("ab\r\ncd\ref").unwrap();
        assert_eq!(store.section((0, 1), (2, 1)).unwrap(), b"b\r\ncd\re");
        assert_eq!(store.section_len((0, 1), (2, 1)).unwrap(), 7);
    }

    #[test]
    fn test_section_inverted_is_empty() {
        let store = TextStore::from_text("abc\ndef").unwrap();
        assert_eq!(store.section((0, 2), (0, 1)).unwrap(), b"");
        assert_eq!(store.section((1, 0), (0, 1)).unwrap(), b"");
        assert_eq!(store.section_len((0, 2), (0, 1)).unwrap(), 0);
    }

    #[test]
    fn test_section_validates_endpoints() {
        let store = TextStore::from_text("abc").unwrap();
        assert!(store.section((0, 0), (0, 9)).unwrap_err().is_out_of_bounds());
        assert!(store.section((4, 0), (0, 1)).unwrap_err().is_out_of_bounds());
    }

    // ==================== Single-block mutations ====================

    #[test]
    fn test_insert_char() {
        let mut store = TextStore::from_text("ac").unwrap();
        store.insert_char(0, 1, b'b').unwrap();
        assert_eq!(store.line(0).unwrap(), b"abc");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_insert_char_newline_splits() {
        let mut store = TextStore::from_text("abcd").unwrap();
        store.insert_char(0, 2, b'\n').unwrap();
        assert_eq!(store.line_count(), 2);
        assert_eq!(lines(&store), vec!["ab", "cd"]);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_insert_char_rejects_nul() {
        let mut store = TextStore::from_text("ab").unwrap();
        assert!(store.insert_char(0, 1, 0).is_err());
        assert_eq!(store.text(), b"ab");
    }

    #[test]
    fn test_insert_char_out_of_bounds_leaves_store() {
        let mut store = TextStore::from_text("ab\ncd").unwrap();
        assert!(store.insert_char(0, 3, b'x').unwrap_err().is_out_of_bounds());
        assert!(store.insert_char(5, 0, b'x').unwrap_err().is_out_of_bounds());
        assert_eq!(store.text(), b"ab\ncd");
    }

    #[test]
    fn test_insert_text_returns_end_position() {
        let mut store = TextStore::from_text("start end").unwrap();
        let end = store.insert_text(0, 6, "one\ntwo\r\nthree ").unwrap();
        assert_eq!(end, Position::new(2, 6));
        assert_eq!(lines(&store), vec!["start one", "two", "three end"]);

        let end = store.insert_text(2, 0, "X").unwrap();
        assert_eq!(end, Position::new(2, 1));
    }

    #[test]
    fn test_insert_empty_text_is_noop() {
        let mut store = TextStore::from_text("abc").unwrap();
        assert_eq!(store.insert_text(0, 2, "").unwrap(), Position::new(0, 2));
        assert_eq!(store.text(), b"abc");
    }

    #[test]
    fn test_delete_char() {
        let mut store = TextStore::from_text("abc").unwrap();
        store.delete_char(0, 1).unwrap();
        assert_eq!(store.text(), b"ac");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_delete_char_at_line_end_joins() {
        let mut store = TextStore::from_text("ab\r\ncd").unwrap();
        store.delete_char(0, 2).unwrap();
        assert_eq!(store.line_count(), 1);
        assert_eq!(store.text(), b"abcd");
    }

    #[test]
    fn test_delete_char_at_document_end_fails() {
        let mut store = TextStore::from_text("ab").unwrap();
        assert!(store.delete_char(0, 2).unwrap_err().is_out_of_bounds());
        assert_eq!(store.text(), b"ab");
    }

    #[test]
    fn test_merge_lines() {
        let mut store = TextStore::from_text("foo\nbar\n").unwrap();
        store.merge_lines(0).unwrap();
        assert_eq!(store.line_count(), 2);
        assert_eq!(store.line(0).unwrap(), b"foobar");
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn test_merge_last_line_is_noop() {
        let mut store = TextStore::from_text("foo\nbar").unwrap();
        store.merge_lines(1).unwrap();
        assert_eq!(store.text(), b"foo\nbar");
        assert!(store.merge_lines(2).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn test_delete_section_single_line() {
        let mut store = TextStore::from_text("hello world").unwrap();
        store.delete_section((0, 5), (0, 11)).unwrap();
        assert_eq!(store.text(), b"hello");
    }

    #[test]
    fn test_delete_section_across_lines() {
        let mut store = TextStore::from_text("one\ntwo\nthree").unwrap();
        store.delete_section((0, 1), (2, 2)).unwrap();
        assert_eq!(store.line_count(), 1);
        assert_eq!(store.text(), b"oree");
    }

    #[test]
    fn test_delete_section_inverted_is_noop() {
        let mut store = TextStore::from_text("abc").unwrap();
        store.delete_section((0, 2), (0, 1)).unwrap();
        assert_eq!(store.text(), b"abc");
    }

    #[test]
    fn test_replace_char() {
        let mut store = TextStore::from_text("abc").unwrap();
        store.replace_char(0, 1, b'X').unwrap();
        assert_eq!(store.text(), b"aXc");
        assert_eq!(store.len(), 3);
        assert_eq!(store.line_count(), 1);
    }

    #[test]
    fn test_replace_char_with_newline_grows_lines() {
        let mut store = TextStore::from_text("abc").unwrap();
        store.replace_char(0, 1, b'\n').unwrap();
        assert_eq!(store.line_count(), 2);
        assert_eq!(store.len(), 3);
        assert_eq!(lines(&store), vec!["a", "c"]);
    }

    #[test]
    fn test_replace_char_with_newline_in_full_block() {
        // "zabcdefg" fills the first block, so the sentinel splits it
        let mut store = TextStore::new(8, 2).unwrap();
        store.set_text("abcdefgh").unwrap();
        store.insert_char(0, 0, b'z').unwrap();
        assert_eq!(store.blocks()[0].bytes_in_use, 8);

        store.replace_char(0, 7, b'\r').unwrap();
        assert_eq!(lines(&store), vec!["zabcdef", "h"]);
        assert_eq!(store.text(), b"zabcdef\rh");
        assert_eq!(store.len(), 9);
        store.validate().unwrap();
    }

    #[test]
    fn test_replace_char_at_line_end_fails() {
        let mut store = TextStore::from_text("ab\ncd").unwrap();
        assert!(store.replace_char(0, 2, b'x').unwrap_err().is_out_of_bounds());
        assert_eq!(store.text(), b"ab\ncd");
    }

    #[test]
    fn test_replace_chars_overwrites_and_extends() {
        let mut store = TextStore::from_text("abcdef\nxyz").unwrap();
        let end = store.replace_chars(0, 2, "XY").unwrap();
        assert_eq!(end, Position::new(0, 4));
        assert_eq!(store.line(0).unwrap(), b"abXYef");

        let end = store.replace_chars(0, 4, "1234").unwrap();
        assert_eq!(end, Position::new(0, 8));
        assert_eq!(lines(&store), vec!["abXY1234", "xyz"]);
    }

    // ==================== Line ending joins ====================

    #[test]
    fn test_insert_lf_after_cr_ending_is_rejected() {
        let mut store = TextStore::from_text("a\rb").unwrap();
        assert!(matches!(
            store.insert_char(1, 0, b'\n'),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.insert_text(1, 0, "\nx"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(store.text(), b"a\rb");
        assert_eq!(store.line_count(), 2);
        store.validate().unwrap();

        store.insert_text(1, 0, "x\n").unwrap();
        assert_eq!(store.text(), b"a\rx\nb");
        assert_eq!(store.line_count(), 3);
    }

    #[test]
    fn test_insert_cr_before_lf_ending_is_rejected() {
        let mut store = TextStore::from_text("ab\ncd").unwrap();
        assert!(matches!(
            store.insert_char(0, 2, b'\r'),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(store.insert_text(0, 2, "x\r").is_err());
        assert_eq!(store.text(), b"ab\ncd");

        store.insert_char(0, 1, b'\r').unwrap();
        assert_eq!(lines(&store), vec!["a", "b", "cd"]);
    }

    #[test]
    fn test_delete_joining_cr_and_lf_is_rejected() {
        let mut store = TextStore::from_text("a\rb\nc").unwrap();
        assert!(matches!(
            store.delete_section((1, 0), (1, 1)),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(store.delete_char(1, 0).is_err());
        assert_eq!(store.text(), b"a\rb\nc");
        assert_eq!(store.line_count(), 3);

        // Removing the whole line takes its ending with it.
        store.delete_line(1).unwrap();
        assert_eq!(store.text(), b"a\rc");
        store.validate().unwrap();
    }

    #[test]
    fn test_merge_joining_cr_and_lf_is_rejected() {
        // lines: "a" \r, "" \r\n, "" \n, "b"
        let mut store = TextStore::from_text("a\r\r\n\nb").unwrap();
        assert_eq!(store.line_count(), 4);
        assert!(matches!(
            store.merge_lines(1),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(store.delete_char(1, 0).is_err());
        assert_eq!(store.text(), b"a\r\r\n\nb");

        store.merge_lines(2).unwrap();
        assert_eq!(store.text(), b"a\r\r\nb");
        store.merge_lines(1).unwrap();
        assert_eq!(store.text(), b"a\rb");
        store.validate().unwrap();
    }

    #[test]
    fn test_replace_char_with_cr_before_lf_is_rejected() {
        let mut store = TextStore::from_text("ab\nc").unwrap();
        assert!(matches!(
            store.replace_char(0, 1, b'\r'),
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(store.text(), b"ab\nc");
        assert_eq!(store.line_count(), 2);

        let mut store = TextStore::from_text("a\rbc").unwrap();
        assert!(store.replace_char(1, 0, b'\n').is_err());
        assert_eq!(store.text(), b"a\rbc");
        store.replace_char(1, 1, b'\n').unwrap();
        assert_eq!(lines(&store), vec!["a", "b", ""]);
        store.validate().unwrap();
    }

    #[test]
    fn test_replace_span_is_checked_before_removal() {
        let mut store = TextStore::from_text("a\rbc\nd").unwrap();
        assert!(store.replace_line(1, "\nz").is_err());
        assert!(store.replace_chars(1, 1, "x\r").is_err());
        assert_eq!(store.text(), b"a\rbc\nd");
        assert_eq!(store.line_count(), 3);

        store.replace_line(1, "q").unwrap();
        assert_eq!(store.text(), b"a\rq\nd");
        store.validate().unwrap();
    }

    #[test]
    fn test_validate_flags_cr_then_lf_boundaries() {
        let mut store = TextStore::new(8, 2).unwrap();
        store.load_internal(b"a\r\0\n\0b").unwrap();
        assert_eq!(store.line_count(), 3);
        assert!(store.validate().unwrap_err().is_fatal());

        store.load_internal(b"a\r\n\0\r\0b").unwrap();
        store.validate().unwrap();
    }

    // ==================== Line helpers ====================

    #[test]
    fn test_insert_line_before_and_append() {
        let mut store = TextStore::from_text("b\nc").unwrap();
        store.insert_line(0, "a").unwrap();
        store.insert_line(3, "d").unwrap();
        assert_eq!(lines(&store), vec!["a", "b", "c", "d"]);
        assert!(store.insert_line(9, "z").unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn test_insert_line_after_uses_configured_ending() {
        let config = StoreConfig {
            line_ending: crate::LineEnding::CrLf,
            ..StoreConfig::default()
        };
        let mut store = TextStore::with_config(config).unwrap();
        store.set_text("a\r\nc").unwrap();
        store.insert_line_after(0, "b").unwrap();
        assert_eq!(store.text(), b"a\r\nb\r\nc");
    }

    #[test]
    fn test_delete_line() {
        let mut store = TextStore::from_text("a\nb\nc").unwrap();
        store.delete_line(1).unwrap();
        assert_eq!(store.text(), b"a\nc");
        store.delete_line(1).unwrap();
        assert_eq!(store.text(), b"a");
        store.delete_line(0).unwrap();
        assert_eq!(store.text(), b"");
        assert_eq!(store.line_count(), 1);
    }

    #[test]
    fn test_replace_line_keeps_ending() {
        let mut store = TextStore::from_text("old\r\nnext").unwrap();
        store.replace_line(0, "brand new").unwrap();
        assert_eq!(store.text(), b"brand new\r\nnext");
    }

    // ==================== Housekeeping ====================

    #[test]
    fn test_refactor_level_zero_is_noop() {
        let mut store = TextStore::new(8, 0).unwrap();
        store.set_text("abcdefghijklmnop").unwrap();
        let before = store.blocks();
        store.refactor(0).unwrap();
        assert_eq!(store.blocks(), before);
    }

    #[test]
    fn test_refactor_compacts_after_splits() {
        let mut store = TextStore::new(8, 2).unwrap();
        store.set_text("abc").unwrap();
        for i in 0..40 {
            store.insert_char(0, i % 3, b'x').unwrap();
        }
        let text = store.text();
        let before = store.block_count();

        store.refactor(1).unwrap();
        assert!(store.block_count() <= before);
        assert_eq!(store.block_count(), 43usize.div_ceil(7));
        assert_eq!(store.text(), text);
        store.validate().unwrap();
    }

    #[test]
    fn test_validate_detects_tampering() {
        let mut store = TextStore::from_text("a\nb").unwrap();
        store.n_lines = 5;
        assert!(store.validate().unwrap_err().is_fatal());
    }
}
