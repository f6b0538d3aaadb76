use std::io::Write;

use arrow::{
    array::RecordBatch,
    error::ArrowError,
    util::display::{ArrayFormatter, FormatOptions},
};
use snafu::ResultExt;
use tabled::{
    builder::Builder,
    settings::{Style, object::Rows, style::LineText, width::MinWidth},
};

use crate::error::{ArrowSnafu, CliResult, OutputSnafu};

/// Shown for null cells, matching how the datasets were previewed before.
const NULL_DISPLAY: &str = "null";

#[derive(Debug, Clone)]
pub struct TablePreview {
    /// Header row; the first entry is the (unnamed) row index column.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub total_columns: usize,
}

/// Format the first `max_rows` rows of `batch`. Cell text is never truncated.
pub fn preview_batch(batch: &RecordBatch, max_rows: usize) -> CliResult<TablePreview> {
    let options = FormatOptions::default().with_null(NULL_DISPLAY);
    let formatters = batch
        .columns()
        .iter()
        .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
        .collect::<Result<Vec<_>, ArrowError>>()
        .context(ArrowSnafu)?;

    let rows_to_take = max_rows.min(batch.num_rows());
    let mut rows = Vec::with_capacity(rows_to_take);
    for row_idx in 0..rows_to_take {
        let mut row = Vec::with_capacity(formatters.len() + 1);
        row.push(row_idx.to_string());
        for formatter in &formatters {
            row.push(
                formatter
                    .value(row_idx)
                    .try_to_string()
                    .context(ArrowSnafu)?,
            );
        }
        rows.push(row);
    }

    let mut columns = vec![String::new()];
    columns.extend(batch.schema().fields().iter().map(|f| f.name().to_string()));

    Ok(TablePreview {
        columns,
        rows,
        total_rows: batch.num_rows(),
        total_columns: batch.num_columns(),
    })
}

fn render_table(label: &str, columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    const LABEL_OFFSET: usize = 2;
    let min_width = LABEL_OFFSET + label.chars().count() + 4;

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();

    table.with(Style::rounded());
    table.with(MinWidth::new(min_width));
    table.with(LineText::new(label, Rows::first()).offset(LABEL_OFFSET));
    // The label line resets widths; enforce the minimum again.
    table.with(MinWidth::new(min_width));
    table.to_string()
}

fn preview_message(preview: &TablePreview) -> Option<String> {
    if preview.total_rows == 0 {
        return Some("(no rows)".to_string());
    }

    let hidden = preview.total_rows - preview.rows.len();
    if hidden > 0 {
        return Some(format!("... {hidden} more rows (use --max-rows to show more)"));
    }

    None
}

/// Write the rendered table, an optional note about hidden rows, and the
/// table dimensions.
pub fn write_preview<W: Write>(label: &str, preview: &TablePreview, out: &mut W) -> CliResult<()> {
    let rendered = render_table(label, &preview.columns, &preview.rows);
    if !rendered.is_empty() {
        writeln!(out, "{rendered}").context(OutputSnafu)?;
    }

    if let Some(message) = preview_message(preview) {
        writeln!(out, "{message}").context(OutputSnafu)?;
    }

    writeln!(
        out,
        "[{} rows x {} columns]",
        preview.total_rows, preview.total_columns
    )
    .context(OutputSnafu)?;
    Ok(())
}
