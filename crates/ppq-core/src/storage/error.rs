use std::{error::Error, fmt, io, string::FromUtf8Error};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::{Backtrace, prelude::*};

use crate::{error::ErrorKind, schema::SchemaError, table::TableError};

/// Errors produced by the storage backend implementation.
///
/// Only the local filesystem is supported; I/O errors are wrapped here so
/// [`StoreError`] variants can add the path they happened on.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur while reading or writing conversation files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The specified path was not found.
    #[snafu(display("File path \"{path}\" doesn't exist"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The path does not carry the `.parquet` extension.
    #[snafu(display("\"{path}\" is not a parquet file"))]
    NotParquet {
        /// The offending path.
        path: String,
    },

    /// An I/O error occurred on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The file could not be decoded as Parquet.
    #[snafu(display("Failed to read parquet file {path}: {source}"))]
    ParquetRead {
        /// The file being read.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A record batch inside the file could not be decoded.
    #[snafu(display("Failed to decode record batch from {path}: {source}"))]
    ArrowRead {
        /// The file being read.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Encoding the table as Parquet failed.
    #[snafu(display("Failed to encode parquet for {path}: {source}"))]
    ParquetWrite {
        /// The destination file.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A text corpus is not valid UTF-8.
    #[snafu(display("{path} is not valid UTF-8 text: {source}"))]
    NotUtf8 {
        /// The file being read.
        path: String,
        /// Underlying decoding error.
        source: FromUtf8Error,
    },

    /// The file's columns cannot be coerced to the expected schema.
    #[snafu(display("Schema of {path} is incompatible: {source}"))]
    Schema {
        /// The file being read.
        path: String,
        /// The specific incompatibility.
        source: SchemaError,
    },

    /// The decoded data did not form a conversation table.
    #[snafu(display("Invalid conversation table in {path}: {source}"))]
    Table {
        /// The file involved.
        path: String,
        /// Underlying table error.
        source: TableError,
    },

    /// A multi-file operation was given no input files.
    #[snafu(display("No input files given"))]
    NoInputs,
}

impl StoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::NotParquet { .. }
            | StoreError::NotUtf8 { .. }
            | StoreError::ParquetRead { .. }
            | StoreError::ArrowRead { .. }
            | StoreError::Schema { .. }
            | StoreError::Table { .. } => ErrorKind::Format,
            StoreError::OtherIo { .. } | StoreError::ParquetWrite { .. } => ErrorKind::Io,
            StoreError::NoInputs => ErrorKind::Usage,
        }
    }

    /// The path the error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            StoreError::NotFound { path, .. }
            | StoreError::NotParquet { path }
            | StoreError::NotUtf8 { path, .. }
            | StoreError::OtherIo { path, .. }
            | StoreError::ParquetRead { path, .. }
            | StoreError::ArrowRead { path, .. }
            | StoreError::ParquetWrite { path, .. }
            | StoreError::Schema { path, .. }
            | StoreError::Table { path, .. } => Some(path),
            StoreError::NoInputs => None,
        }
    }
}
