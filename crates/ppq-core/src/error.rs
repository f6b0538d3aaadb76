//! Coarse error classification shared by every layer.
//!
//! Each library error type exposes a `kind()` so front-ends can report
//! failures (and pick exit codes) without matching on every variant.

use std::fmt;

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller passed invalid arguments (for example, no inputs at all).
    Usage,
    /// A referenced path does not exist.
    NotFound,
    /// A file has the wrong extension, is not valid Parquet, or its schema
    /// is incompatible with the expected one.
    Format,
    /// Any other read or write failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Usage => "usage error",
            ErrorKind::NotFound => "not found",
            ErrorKind::Format => "format error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(s)
    }
}
