// Chunk: docs/chunks/text_store - Line-block text store with chapter-indexed block chain

//! Translation between transport text and the internal block representation.
//!
//! Callers hand the store text whose lines end in `\n`, `\r` or `\r\n`.
//! Inside a data block each of those endings is kept verbatim and followed by
//! a single [`SENTINEL`] byte, which is the actual line boundary marker:
//!
//! ```text
//! transport:  a b c \r \n d e f \n
//! internal:   a b c \r \n 0 d e f \n 0
//! ```
//!
//! Keeping the original ending bytes means the document length and any
//! extracted section reproduce the caller's ending style; the sentinel lets
//! the resolver count lines without caring which style was used.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Internal line boundary marker. Never appears in caller-supplied text.
pub const SENTINEL: u8 = 0;

/// Returns true for a transport line-ending byte (`\n` or `\r`).
#[inline]
pub fn is_line_ending_byte(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// A transport line-ending style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r`
    Cr,
    /// `\r\n`
    CrLf,
}

impl LineEnding {
    /// The transport bytes of this ending.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::Cr => b"\r",
            LineEnding::CrLf => b"\r\n",
        }
    }

    /// Detects the ending that starts at `bytes[0]`, if any.
    pub fn detect(bytes: &[u8]) -> Option<LineEnding> {
        match bytes {
            [b'\r', b'\n', ..] => Some(LineEnding::CrLf),
            [b'\r', ..] => Some(LineEnding::Cr),
            [b'\n', ..] => Some(LineEnding::Lf),
            _ => None,
        }
    }
}

/// Transport text translated into block form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Encoded {
    /// Internal bytes, one sentinel after every line ending.
    pub bytes: Vec<u8>,
    /// Number of line endings (and therefore sentinels) in `bytes`.
    pub line_endings: usize,
    /// Bytes following the last line ending (the whole text if there is none).
    pub tail_len: usize,
}

/// Translates transport text into internal form.
///
/// Fails with [`StoreError::InvalidArgument`] if the text contains the
/// sentinel byte.
pub fn encode(text: &[u8]) -> Result<Encoded> {
    if let Some(pos) = text.iter().position(|&b| b == SENTINEL) {
        return Err(StoreError::InvalidArgument(format!(
            "text contains a NUL byte at offset {pos}"
        )));
    }

    let mut bytes = Vec::with_capacity(text.len() + text.len() / 16 + 1);
    let mut line_endings = 0;
    let mut tail_len = 0;
    let mut i = 0;

    while i < text.len() {
        match LineEnding::detect(&text[i..]) {
            Some(ending) => {
                let ending = ending.as_bytes();
                bytes.extend_from_slice(ending);
                bytes.push(SENTINEL);
                i += ending.len();
                line_endings += 1;
                tail_len = 0;
            }
            None => {
                bytes.push(text[i]);
                i += 1;
                tail_len += 1;
            }
        }
    }

    Ok(Encoded {
        bytes,
        line_endings,
        tail_len,
    })
}

/// Counts `\n`, `\r` and `\r\n` sequences, each counted once.
pub fn count_line_endings(text: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < text.len() {
        match LineEnding::detect(&text[i..]) {
            Some(ending) => {
                count += 1;
                i += ending.as_bytes().len();
            }
            None => i += 1,
        }
    }
    count
}

/// Translates internal bytes back to transport form by dropping sentinels.
pub fn decode(internal: &[u8]) -> Vec<u8> {
    internal.iter().copied().filter(|&b| b != SENTINEL).collect()
}
