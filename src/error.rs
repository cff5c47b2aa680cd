/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT
*/
use std::io;
use thiserror::Error;

/// The error type shared by every fallible operation in the library.
#[derive(Debug, Error)]
pub enum ShapefileError {
    /// File signature mismatch, impossible header values, or a truncated
    /// or undersized record.
    #[error("malformed file: {0}")]
    MalformedFile(String),

    /// A record or shape index beyond the end of the file.
    #[error("{0}")]
    OutOfRange(String),

    /// Misuse of the field schema, e.g. adding a field after records have
    /// been written, or closing a writer with no fields.
    #[error("schema error: {0}")]
    Schema(String),

    /// A value that cannot be encoded at the declared field width, or a
    /// geometry that cannot be serialized as requested.
    #[error("invalid value: {0}")]
    Value(String),

    /// A byte sequence that cannot be decoded (or a string that cannot be
    /// encoded) under the configured encoding with the strict policy.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An error surfaced from the underlying byte stream.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ShapefileError>;
