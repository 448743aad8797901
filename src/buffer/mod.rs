//! パケットバッファ（正規のHEX文字列）

mod document;

pub use document::{Document, FileFormat};

use thiserror::Error;

use crate::convert::ConvertError;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("range {start}..{end} is outside the buffer ({len} hex digits)")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("malformed buffer: {0}")]
    Malformed(#[from] ConvertError),
    #[error("buffer is read-only")]
    ReadOnly,
}
