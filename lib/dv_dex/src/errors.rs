//! Dex errors definitions.

use std::{fmt, io};
use thiserror::Error;

/// An alias for result that can be a [`DexError`].
pub type DexResult<T> = Result<T, DexError>;

/// The Dex error type.
#[derive(Debug, Error)]
pub enum DexError {
    /// Error that can be returned when doing [std::io](I/O) operations.
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// Error that can be returned when formatting dex parts.
    #[error("Formatting error: {0}")]
    Fmt(#[from] fmt::Error),

    /// Error returned when the JSON form of a dex model is malformed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error that can be returned when decoding bytecode.
    #[error("parsing error ({1:?})")]
    Parsing(Vec<u8>, nom::error::ErrorKind),

    #[error("resource not found in dex tables: {0}")]
    ResNotFound(String),

    #[error("could not convert {} into {}", from, to)]
    Conversion { from: String, to: String },

    #[error("invalid type")]
    InvalidType,

    #[error("truncated instruction at 0x{0:x}")]
    Truncated(usize),

    #[error("argument count {0} exceeds 5")]
    InvalidArgCount(u8),

    #[error("operand {0} does not fit its encoding")]
    OperandOverflow(i64),
}

impl nom::error::ParseError<&[u8]> for DexError {
    fn from_error_kind(input: &[u8], kind: nom::error::ErrorKind) -> Self {
        Self::Parsing(input.to_vec(), kind)
    }

    fn append(_: &[u8], _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl nom::error::ParseError<(&[u8], usize)> for DexError {
    fn from_error_kind(input: (&[u8], usize), kind: nom::error::ErrorKind) -> Self {
        Self::Parsing(input.0.to_vec(), kind)
    }

    fn append(_: (&[u8], usize), _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl nom::ErrorConvert<Self> for DexError {
    fn convert(self) -> Self {
        self
    }
}
