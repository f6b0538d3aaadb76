//! Core library for `ppq`, a helper for conversation datasets stored as
//! Parquet.
//!
//! The pieces:
//!
//! - A parser for the blank-line separated `Q:`/`T:`/`R:` text format
//!   (`record` module).
//! - [`ConversationTable`], an Arrow-backed table with a fixed
//!   `query`/`terms`/`response`/`topic` schema, and the builder that fills it
//!   from parsed records (`table` module).
//! - Order-preserving merging of tables (`merge` module).
//! - Schema checks and coercion of files written by other tools (`schema`
//!   module).
//! - Parquet load/store/concatenate on the local filesystem (`storage`
//!   module).
//! - A scanner for `# ` heading lines in text corpora (`headings` module).
//!
//! Front-ends such as the `ppq` CLI depend on this crate rather than talking
//! to Arrow or Parquet directly.
#![deny(missing_docs)]
pub mod error;
pub mod headings;
pub mod merge;
pub mod record;
pub mod schema;
pub mod storage;
pub mod table;

pub use error::ErrorKind;
pub use merge::{merge, merge_all};
pub use record::{Record, parse_records};
pub use storage::{Compression, StoreError, StoreResult, WriteOptions};
pub use table::{ConversationTable, TableBuilder, TableError, build};
