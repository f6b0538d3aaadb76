use arrow::error::ArrowError;
use ppq_core::{ErrorKind, StoreError, TableError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Failed to read table {path}: {source}"))]
    LoadTable {
        path: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Failed to parse text dataset {path}: {source}"))]
    BuildTable {
        path: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display(
        "Failed to write table {path}: {source}. \
         Ensure the destination directory is writable."
    ))]
    StoreTable {
        path: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Failed to append to {path}: {source}"))]
    MergeTables { path: String, source: TableError },

    #[snafu(display(
        "Failed to combine into {output}: {source}. \
         Ensure every input shares the first file's columns."
    ))]
    CombineFiles {
        output: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Failed to read text dataset {path}: {source}"))]
    ReadText {
        path: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("{failed} of {total} files could not be read"))]
    ReadFailures {
        failed: usize,
        total: usize,
        /// Kind of the first failure.
        kind: ErrorKind,
    },

    #[snafu(display("Failed to render preview: {source}"))]
    Arrow { source: ArrowError },

    #[snafu(display("Failed to write output: {source}"))]
    Output { source: std::io::Error },
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::LoadTable { source, .. }
            | CliError::BuildTable { source, .. }
            | CliError::StoreTable { source, .. }
            | CliError::ReadText { source, .. }
            | CliError::CombineFiles { source, .. } => source.kind(),
            CliError::MergeTables { source, .. } => source.kind(),
            CliError::ReadFailures { kind, .. } => *kind,
            CliError::Arrow { .. } => ErrorKind::Format,
            CliError::Output { .. } => ErrorKind::Io,
        }
    }
}
