//! Parquet persistence for conversation tables.
//!
//! This module is the only place that touches the filesystem. It provides:
//!
//! - [`load`] / [`store`]: read and write a single [`ConversationTable`].
//! - [`concat_files`]: concatenate Parquet files that share the first file's
//!   schema into one new file.
//! - [`build_from_path`] / [`read_text`]: read a text corpus and build a table
//!   from it.
//! - [`row_count`]: the row count from a Parquet footer, reading only the
//!   footer bytes.
//!
//! Path conventions:
//!
//! - Existence is checked before the extension, so a missing `foo.txt` is
//!   reported as missing rather than as "not a parquet file".
//! - Parquet files must carry the `.parquet` extension (case-insensitive),
//!   both for reading and for writing.
//! - Writes go to `<path>.tmp` and are renamed into place, so an existing
//!   file is never left half-written.
//!
//! Apart from [`row_count`], whole files are read into memory and decoded
//! from [`Bytes`].

mod error;

use std::{
    io::{self, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{array::RecordBatch, datatypes::SchemaRef, error::ArrowError};
use bytes::Bytes;
use log::debug;
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::{Compression as ParquetCompression, ZstdLevel},
    errors::ParquetError,
    file::{
        metadata::{ParquetMetaData, ParquetMetaDataReader},
        properties::WriterProperties,
    },
};
use snafu::{Backtrace, prelude::*};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

pub use error::{BackendError, StoreError};
use error::{
    ArrowReadSnafu, NoInputsSnafu, NotFoundSnafu, NotParquetSnafu, NotUtf8Snafu, OtherIoSnafu,
    ParquetReadSnafu, ParquetWriteSnafu, SchemaSnafu, TableSnafu,
};

use crate::{
    merge::concat_batches_checked,
    schema::{MissingColumns, SchemaResult, coerce_batch, coerce_batch_with, conversation_schema},
    table::{self, ConversationTable},
};

/// General result type used by storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Extension every Parquet path must carry.
pub const PARQUET_EXTENSION: &str = "parquet";

/// Compression codec used when writing Parquet files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    None,
    /// Snappy, the pyarrow default.
    #[default]
    Snappy,
    /// Zstandard at its default level.
    Zstd,
}

impl From<Compression> for ParquetCompression {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => ParquetCompression::UNCOMPRESSED,
            Compression::Snappy => ParquetCompression::SNAPPY,
            Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
        }
    }
}

/// Options applied to every Parquet file this module writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Column chunk compression.
    pub compression: Compression,
}

impl WriteOptions {
    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression.into())
            .build()
    }
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

/// Fail with [`StoreError::NotParquet`] unless `path` ends in `.parquet`.
pub fn ensure_parquet_extension(path: &Path) -> StoreResult<()> {
    let is_parquet = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PARQUET_EXTENSION));

    ensure!(
        is_parquet,
        NotParquetSnafu {
            path: path_string(path),
        }
    );
    Ok(())
}

/// Require `path` to name an existing regular file.
async fn ensure_file_exists(path: &Path) -> StoreResult<()> {
    let path_str = path_string(path);

    let meta = match fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BackendError::Local(e)).context(NotFoundSnafu { path: path_str });
        }
        Err(e) => {
            return Err(BackendError::Local(e)).context(OtherIoSnafu { path: path_str });
        }
    };

    // Non-regular file: report as missing.
    if !meta.is_file() {
        let synthetic = io::Error::other("not a regular file");
        return Err(StoreError::NotFound {
            path: path_str,
            source: BackendError::Local(synthetic),
            backtrace: Backtrace::capture(),
        });
    }

    Ok(())
}

async fn read_all_bytes(path: &Path) -> StoreResult<Vec<u8>> {
    let path_str = path_string(path);

    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(BackendError::Local(e)).context(NotFoundSnafu { path: path_str })
        }
        Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu { path: path_str }),
    }
}

/// Read a text corpus, normalizing `\r\n` line endings to `\n`.
///
/// Content that is not UTF-8 is a [`StoreError::NotUtf8`] format error.
pub async fn read_text(path: &Path) -> StoreResult<String> {
    let bytes = read_all_bytes(path).await?;
    let text = String::from_utf8(bytes).context(NotUtf8Snafu {
        path: path_string(path),
    })?;

    if text.contains("\r\n") {
        Ok(text.replace("\r\n", "\n"))
    } else {
        Ok(text)
    }
}

/// Read the text corpus at `path` and build a table from it.
pub async fn build_from_path(path: &Path, topic: Option<&str>) -> StoreResult<ConversationTable> {
    let text = read_text(path).await?;
    let table = table::build(&text, topic).context(TableSnafu {
        path: path_string(path),
    })?;

    debug!("parsed {} records from {}", table.num_rows(), path.display());
    Ok(table)
}

/// Guard that removes a temporary file on drop unless disarmed.
/// Used to ensure cleanup on error paths during atomic writes.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Call after a successful rename.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best effort; the caller is already returning an error.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn create_parent_dir(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: path_string(parent),
            })?;
    }
    Ok(())
}

/// Write `contents` to `path`, replacing any existing file atomically.
///
/// The payload goes to `<path>.tmp`, is synced, and is then renamed over
/// `path`. On failure the temporary file is removed and `path` is untouched.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    create_parent_dir(path).await?;

    let tmp_path = temp_path_for(path);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: path_string(&tmp_path),
            })?;

        file.write_all(contents)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: path_string(&tmp_path),
            })?;

        file.sync_all()
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: path_string(&tmp_path),
            })?;
    }

    fs::rename(&tmp_path, path)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path_string(path),
        })?;

    guard.disarm();
    Ok(())
}

fn decode_parquet(path: &str, bytes: Vec<u8>) -> StoreResult<(SchemaRef, Vec<RecordBatch>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
        .context(ParquetReadSnafu { path })?;

    let schema = Arc::clone(builder.schema());
    let reader = builder.build().context(ParquetReadSnafu { path })?;

    let batches = reader
        .collect::<Result<Vec<_>, ArrowError>>()
        .context(ArrowReadSnafu { path })?;

    Ok((schema, batches))
}

/// Check, read and decode the Parquet file at `path`.
async fn read_parquet_file(path: &Path) -> StoreResult<(SchemaRef, Vec<RecordBatch>)> {
    ensure_file_exists(path).await?;
    ensure_parquet_extension(path)?;

    let bytes = read_all_bytes(path).await?;
    decode_parquet(&path_string(path), bytes)
}

/// Load the conversation table stored at `path`.
///
/// # Errors
///
/// - [`StoreError::NotFound`] if `path` does not exist.
/// - [`StoreError::NotParquet`] if `path` lacks the `.parquet` extension.
/// - [`StoreError::ParquetRead`] / [`StoreError::ArrowRead`] if the bytes are
///   not valid Parquet.
/// - [`StoreError::Schema`] if the columns cannot be coerced to the
///   conversation schema.
pub async fn load(path: &Path) -> StoreResult<ConversationTable> {
    let (_, batches) = read_parquet_file(path).await?;
    let path_str = path_string(path);

    let target = conversation_schema();
    let coerced = batches
        .iter()
        .map(|batch| coerce_batch(batch, &target))
        .collect::<SchemaResult<Vec<_>>>()
        .context(SchemaSnafu { path: &path_str })?;

    let merged =
        concat_batches_checked(&target, &coerced).context(SchemaSnafu { path: &path_str })?;
    let table =
        ConversationTable::try_from_batch(merged).context(TableSnafu { path: &path_str })?;

    debug!("loaded {} rows from {path_str}", table.num_rows());
    Ok(table)
}

fn encode_parquet(path: &str, batch: &RecordBatch, options: &WriteOptions) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    let props = options.writer_properties();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
        .context(ParquetWriteSnafu { path })?;

    writer.write(batch).context(ParquetWriteSnafu { path })?;
    writer.close().context(ParquetWriteSnafu { path })?;

    Ok(buf)
}

/// Write `table` to `path`, overwriting any existing file.
pub async fn store(
    table: &ConversationTable,
    path: &Path,
    options: &WriteOptions,
) -> StoreResult<()> {
    ensure_parquet_extension(path)?;

    let bytes = encode_parquet(&path_string(path), table.batch(), options)?;
    write_atomic(path, &bytes).await?;

    debug!(
        "stored {} rows ({} bytes) to {}",
        table.num_rows(),
        bytes.len(),
        path.display()
    );
    Ok(())
}

fn write_coerced<W: Write + Send>(
    writer: &mut ArrowWriter<W>,
    input: &Path,
    batches: &[RecordBatch],
    schema: &SchemaRef,
    output: &str,
) -> StoreResult<u64> {
    let mut rows = 0u64;
    for batch in batches {
        let batch = coerce_batch_with(batch, schema, MissingColumns::FillNulls).context(
            SchemaSnafu {
                path: path_string(input),
            },
        )?;
        writer.write(&batch).context(ParquetWriteSnafu { path: output })?;
        rows += batch.num_rows() as u64;
    }
    Ok(rows)
}

/// Concatenate `inputs`, in order, into a new Parquet file at `output`.
///
/// The output schema is the Arrow schema of the first input; every file
/// (the first included) is coerced to it by column name. A later file that
/// lacks a nullable column of that schema contributes nulls for it; a missing
/// non-nullable column is an error. All inputs are read before `output` is
/// replaced, so `output` may also appear among `inputs`.
///
/// Returns the number of rows written.
pub async fn concat_files(
    inputs: &[PathBuf],
    output: &Path,
    options: &WriteOptions,
) -> StoreResult<u64> {
    let (first, rest) = inputs.split_first().context(NoInputsSnafu)?;
    ensure_parquet_extension(output)?;

    let output_str = path_string(output);
    let (schema, first_batches) = read_parquet_file(first).await?;

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(
        &mut buf,
        Arc::clone(&schema),
        Some(options.writer_properties()),
    )
    .context(ParquetWriteSnafu { path: &output_str })?;

    let mut total = write_coerced(&mut writer, first, &first_batches, &schema, &output_str)?;
    debug!("combined {total} rows from {}", first.display());

    for input in rest {
        let (_, batches) = read_parquet_file(input).await?;
        let rows = write_coerced(&mut writer, input, &batches, &schema, &output_str)?;
        debug!("combined {rows} rows from {}", input.display());
        total += rows;
    }

    writer
        .close()
        .context(ParquetWriteSnafu { path: &output_str })?;
    write_atomic(output, &buf).await?;

    Ok(total)
}

const PARQUET_MAGIC: &[u8; 4] = b"PAR1";
/// Metadata length (little-endian u32) followed by the magic.
const FOOTER_TAIL_LEN: u64 = 8;

fn corrupt_footer(path: &str, detail: String) -> StoreError {
    StoreError::ParquetRead {
        path: path.to_string(),
        source: ParquetError::General(detail),
        backtrace: Backtrace::capture(),
    }
}

/// Read and decode only the footer metadata of the Parquet file at `path`.
async fn read_footer_metadata(path: &Path) -> StoreResult<ParquetMetaData> {
    let path_str = path_string(path);

    let mut file = fs::File::open(path)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: &path_str })?;
    let len = file
        .metadata()
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: &path_str })?
        .len();

    // Leading magic plus footer tail.
    if len < PARQUET_MAGIC.len() as u64 + FOOTER_TAIL_LEN {
        return Err(corrupt_footer(&path_str, format!("file is only {len} bytes")));
    }

    let mut tail = [0u8; FOOTER_TAIL_LEN as usize];
    file.seek(SeekFrom::End(-(FOOTER_TAIL_LEN as i64)))
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: &path_str })?;
    file.read_exact(&mut tail)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: &path_str })?;

    if &tail[4..] != PARQUET_MAGIC {
        return Err(corrupt_footer(&path_str, "missing trailing PAR1 magic".to_string()));
    }

    let metadata_len = u64::from(u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]));
    if metadata_len + FOOTER_TAIL_LEN + PARQUET_MAGIC.len() as u64 > len {
        return Err(corrupt_footer(
            &path_str,
            format!("footer claims {metadata_len} metadata bytes in a {len} byte file"),
        ));
    }

    let mut metadata = vec![0u8; metadata_len as usize];
    file.seek(SeekFrom::End(-((metadata_len + FOOTER_TAIL_LEN) as i64)))
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: &path_str })?;
    file.read_exact(&mut metadata)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: &path_str })?;

    ParquetMetaDataReader::decode_metadata(&metadata).context(ParquetReadSnafu { path: &path_str })
}

/// Row count recorded in the Parquet footer of `path`.
///
/// Only the footer is read. A negative count is reported as
/// [`StoreError::ParquetRead`].
pub async fn row_count(path: &Path) -> StoreResult<u64> {
    ensure_file_exists(path).await?;
    ensure_parquet_extension(path)?;

    let metadata = read_footer_metadata(path).await?;
    let rows = metadata.file_metadata().num_rows();
    u64::try_from(rows).map_err(|_| {
        corrupt_footer(&path_string(path), format!("negative row count {rows}"))
    })
}
