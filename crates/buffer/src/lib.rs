// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain
// Chunk: docs/chunks/store_errors - Typed error taxonomy
// Chunk: docs/chunks/store_config - Persistable store configuration

//! textblock-buffer: a block-structured multi-line text store.
//!
//! This crate provides the storage layer behind an editable multi-line text
//! widget. Text is kept in a chain of fixed-capacity data blocks so that
//! edits only shift bytes within one small block, and a chapter index over
//! the chain keeps line lookup fast in large documents.
//!
//! # Overview
//!
//! The main type is [`TextStore`], which provides:
//! - Bulk load of a whole document with any mix of `\n`, `\r` and `\r\n`
//! - Line and section queries by (line, column) position
//! - Character, text, section and line-level edits
//! - Compaction after many small edits
//!
//! Columns are byte offsets within a line. Line endings are stored exactly as
//! given and are reproduced in extracted sections.
//!
//! # Example
//!
//! ```
//! use textblock_buffer::{Position, TextStore};
//!
//! let mut store = TextStore::new(0, 0)?;
//! store.set_text("Hello\r\nworld")?;
//! assert_eq!(store.line_count(), 2);
//! assert_eq!(store.len(), 12);
//!
//! let end = store.insert_text(1, 5, "!\nbye")?;
//! assert_eq!(end, Position::new(2, 3));
//! assert_eq!(store.line(2)?, b"bye");
//!
//! store.merge_lines(0)?;
//! assert_eq!(store.section((0, 3), (0, 8))?, b"lowor");
//! # Ok::<(), textblock_buffer::StoreError>(())
//! ```
//!
//! # Errors
//!
//! Every fallible operation returns [`Result`]. Out-of-bounds positions and
//! invalid arguments leave the store untouched; see [`StoreError`].

mod block;
mod chain;
mod chapter_index;
mod config;
mod error;
mod line_ending;
mod resolve;
mod text_store;
mod types;

pub use config::{
    StoreConfig, DEFAULT_BLOCK_SIZE, DEFAULT_CHAPTER_SIZE, DEFAULT_OVER_PROVISION_PCT,
    MAX_OVER_PROVISION_PCT,
};
pub use error::{Result, StoreError};
pub use line_ending::{count_line_endings, LineEnding};
pub use text_store::TextStore;
pub use types::{BlockStats, Position};
