//! GDSII stream format support.
//!
//! [`read_library`] turns a complete stream into a [`gdsview_core::Library`];
//! [`writer::GdsWriter`] goes the other way for the subset of records the
//! reader understands.

pub mod reader;
pub mod records;
pub mod writer;

use thiserror::Error;

pub use reader::read_library;
pub use writer::GdsWriter;

/// Errors produced while reading a GDSII stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GdsError {
    #[error("record at byte {offset} is truncated")]
    Truncated { offset: usize },

    #[error("record at byte {offset} has invalid length {length}")]
    BadRecordLength { offset: usize, length: usize },

    /// A record appeared where the stream grammar does not allow it.
    #[error("unexpected record 0x{kind:02X} at byte {offset}")]
    UnexpectedRecord { offset: usize, kind: u8 },

    #[error("bad data at byte {offset}: {message}")]
    BadData { offset: usize, message: String },

    #[error("not a GDSII stream: first record is not HEADER")]
    NotGds,

    #[error("library has no UNITS record")]
    MissingUnits,

    #[error("stream ends without ENDLIB")]
    MissingEndLib,
}
