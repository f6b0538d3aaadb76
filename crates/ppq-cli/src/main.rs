//! CLI tool for turning conversation text corpora into Parquet tables.

mod error;
mod preview;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};
use ppq_core::{
    ConversationTable, merge,
    headings::distinct_headings,
    storage::{self, Compression, WriteOptions},
};
use snafu::ResultExt;
use tracing_subscriber::EnvFilter;

use crate::{
    error::{
        BuildTableSnafu, CliError, CliResult, CombineFilesSnafu, LoadTableSnafu,
        MergeTablesSnafu, OutputSnafu, ReadTextSnafu, StoreTableSnafu,
    },
    preview::{preview_batch, write_preview},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Snappy,
    Zstd,
}

impl From<CompressionArg> for Compression {
    fn from(v: CompressionArg) -> Self {
        match v {
            CompressionArg::None => Compression::None,
            CompressionArg::Snappy => Compression::Snappy,
            CompressionArg::Zstd => Compression::Zstd,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct WriteArgs {
    /// Parquet compression codec
    #[arg(long, value_enum, default_value_t = CompressionArg::Snappy)]
    compression: CompressionArg,
}

impl WriteArgs {
    fn options(&self) -> WriteOptions {
        WriteOptions {
            compression: self.compression.into(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Preview one or more Parquet files
    Read {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Build a Parquet file from a text corpus
    Create {
        input: PathBuf,

        output: PathBuf,

        /// Label stored in the topic column of every row
        topic: Option<String>,

        #[command(flatten)]
        write: WriteArgs,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Append the records of a text corpus to an existing Parquet file
    Append {
        base: PathBuf,

        input: PathBuf,

        /// Label stored in the topic column of the new rows
        topic: Option<String>,

        #[command(flatten)]
        write: WriteArgs,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Concatenate Parquet files sharing the first file's columns
    Combine {
        output: PathBuf,

        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// List the distinct "# " headings of a text corpus
    Check { input: PathBuf },
}

#[derive(Debug, Parser)]
#[command(name = "ppq", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

async fn load_table(path: &Path) -> CliResult<ConversationTable> {
    storage::load(path).await.context(LoadTableSnafu {
        path: display(path),
    })
}

fn print_table(label: &str, table: &ConversationTable, max_rows: usize) -> CliResult<()> {
    let preview = preview_batch(table.batch(), max_rows)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_preview(label, &preview, &mut out)
}

async fn cmd_read(files: &[PathBuf], max_rows: usize) -> CliResult<()> {
    let mut first_failure = None;
    let mut failed = 0usize;

    for file in files {
        let outcome = load_table(file)
            .await
            .and_then(|table| print_table(&display(file), &table, max_rows));

        if let Err(e) = outcome {
            eprintln!("{e}");
            failed += 1;
            first_failure.get_or_insert(e.kind());
        }
    }

    match first_failure {
        None => Ok(()),
        Some(kind) => Err(CliError::ReadFailures {
            failed,
            total: files.len(),
            kind,
        }),
    }
}

async fn cmd_create(
    input: &Path,
    output: &Path,
    topic: Option<&str>,
    options: &WriteOptions,
    max_rows: usize,
) -> CliResult<()> {
    let table = storage::build_from_path(input, topic)
        .await
        .context(BuildTableSnafu {
            path: display(input),
        })?;
    info!("parsed {} records from {}", table.num_rows(), input.display());

    storage::store(&table, output, options)
        .await
        .context(StoreTableSnafu {
            path: display(output),
        })?;

    println!("Generated successfully!");
    let written = load_table(output).await?;
    print_table(&display(output), &written, max_rows)
}

async fn cmd_append(
    base: &Path,
    input: &Path,
    topic: Option<&str>,
    options: &WriteOptions,
    max_rows: usize,
) -> CliResult<()> {
    let addition = storage::build_from_path(input, topic)
        .await
        .context(BuildTableSnafu {
            path: display(input),
        })?;
    let existing = load_table(base).await?;

    let merged = merge(&existing, &addition).context(MergeTablesSnafu {
        path: display(base),
    })?;

    storage::store(&merged, base, options)
        .await
        .context(StoreTableSnafu {
            path: display(base),
        })?;

    println!("Generated successfully!");
    println!("From {:?} to {:?}", existing.shape(), merged.shape());
    print_table(&display(base), &merged, max_rows)
}

async fn cmd_combine(output: &Path, inputs: &[PathBuf], options: &WriteOptions) -> CliResult<()> {
    let total = storage::concat_files(inputs, output, options)
        .await
        .context(CombineFilesSnafu {
            output: display(output),
        })?;

    println!(
        "Combined {} files into {} ({total} rows)",
        inputs.len(),
        output.display()
    );

    // Footer reads only; the data was decoded once by `concat_files`.
    for input in inputs.iter().filter(|input| input.as_path() != output) {
        let rows = storage::row_count(input)
            .await
            .context(LoadTableSnafu {
                path: display(input),
            })?;
        println!("  {}: {rows} rows", input.display());
    }
    Ok(())
}

async fn cmd_check(input: &Path) -> CliResult<()> {
    let text = storage::read_text(input).await.context(ReadTextSnafu {
        path: display(input),
    })?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for heading in distinct_headings(&text) {
        writeln!(out, "{heading}").context(OutputSnafu)?;
    }
    Ok(())
}

/// Install the stderr subscriber; `log` records from `ppq-core` are forwarded to it.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second install fails harmlessly; only the first subscriber is kept.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Read { files, max_rows } => cmd_read(&files, max_rows).await,

        Command::Create {
            input,
            output,
            topic,
            write,
            max_rows,
        } => cmd_create(&input, &output, topic.as_deref(), &write.options(), max_rows).await,

        Command::Append {
            base,
            input,
            topic,
            write,
            max_rows,
        } => cmd_append(&base, &input, topic.as_deref(), &write.options(), max_rows).await,

        Command::Combine {
            output,
            inputs,
            write,
        } => cmd_combine(&output, &inputs, &write.options()).await,

        Command::Check { input } => cmd_check(&input).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        debug!("command failed ({})", e.kind());
        eprintln!("{e}");
        std::process::exit(1);
    }
}
