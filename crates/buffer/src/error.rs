// Chunk: docs/chunks/store_errors - Typed error taxonomy

//! Error types returned by the text store.
//!
//! Every fallible store operation returns [`Result`]. Errors other than
//! [`StoreError::CorruptedStore`] leave the document unchanged, so a widget
//! can simply drop the edit. A corrupted store should be discarded and
//! reloaded.

use std::collections::TryReserveError;

use thiserror::Error;

/// Errors produced by [`TextStore`](crate::TextStore) operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A required argument was missing or malformed (e.g. text containing the
    /// reserved sentinel byte, or an over-provisioning percentage above 99).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested line does not exist.
    #[error("Line {line} out of bounds (line count {line_count})")]
    LineOutOfBounds { line: usize, line_count: usize },

    /// The requested column lies past the end of the line.
    #[error("Column {col} out of bounds for line {line} (length {line_len})")]
    ColumnOutOfBounds {
        line: usize,
        col: usize,
        line_len: usize,
    },

    /// A block buffer could not be allocated.
    #[error("Allocation failure: {0}")]
    Allocation(#[from] TryReserveError),

    /// An internal invariant was found violated.
    #[error("Corrupted store: {0}")]
    CorruptedStore(String),

    /// The operation path is not available.
    ///
    /// Reserved for wrappers that restrict the store. Every store operation
    /// is implemented across block boundaries, so the store never returns it.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    /// Returns true for errors that invalidate the whole editing session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::CorruptedStore(_))
    }

    /// Returns true for either out-of-bounds variant.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            StoreError::LineOutOfBounds { .. } | StoreError::ColumnOutOfBounds { .. }
        )
    }

    pub(crate) fn corrupted(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "text store invariant violated");
        StoreError::CorruptedStore(msg)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
