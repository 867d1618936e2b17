//! Unified error types for the loquat library.
//!
//! Every table in the binary storage layer surfaces its own low-level error
//! directly to the caller; nothing is wrapped per table.
use crate::common::binary::BinaryError;
use thiserror::Error;

/// Main error type for loquat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// List access outside `[0, len)`
    #[error("Index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Property node built with `start > end`
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: u32, end: u32 },

    /// Fixed-size structure of the wrong width handed to a plex
    #[error("Invalid struct size: expected {expected} bytes, got {actual}")]
    StructSize { expected: usize, actual: usize },

    /// A fixed-layout read ran past the end of its buffer
    #[error("Binary error: {0}")]
    Binary(#[from] BinaryError),

    /// Corrupted or malformed structure
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// Huge PAPX relocation would overflow the data stream
    #[error("Data stream capacity exceeded: {required} bytes required, {available} available")]
    DataStreamCapacity { required: usize, available: usize },

    /// Byte/character translation on a table without pieces
    #[error("Text piece table is empty")]
    EmptyPieceTable,
}

/// Result type for loquat operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for an index check failure.
    #[inline]
    pub(crate) fn index(index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { index, len }
    }
}
