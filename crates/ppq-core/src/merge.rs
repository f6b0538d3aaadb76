//! Row-order preserving concatenation of tables.

use arrow::{array::RecordBatch, compute::concat_batches, datatypes::SchemaRef};
use snafu::prelude::*;

use crate::{
    schema::{BatchSnafu, SchemaResult, ensure_schema_exact_match},
    table::{ConversationTable, SchemaMismatchSnafu, TableResult},
};

/// Concatenate `batches` in order after checking that each one has exactly
/// `schema`.
///
/// The result always has `schema`, even when `batches` is empty.
pub fn concat_batches_checked<'a, I>(schema: &SchemaRef, batches: I) -> SchemaResult<RecordBatch>
where
    I: IntoIterator<Item = &'a RecordBatch>,
{
    let batches: Vec<&RecordBatch> = batches.into_iter().collect();
    for batch in &batches {
        ensure_schema_exact_match(schema, &batch.schema())?;
    }

    concat_batches(schema, batches).context(BatchSnafu)
}

/// Merge `base` and `addition` into a new table: every row of `base`, in
/// order, followed by every row of `addition`, in order.
///
/// Neither input is modified. Fails with [`crate::table::TableError::SchemaMismatch`]
/// if the two schemas are not identical.
pub fn merge(
    base: &ConversationTable,
    addition: &ConversationTable,
) -> TableResult<ConversationTable> {
    merge_all([base, addition])
}

/// Merge any number of tables in order. An empty input gives an empty table.
pub fn merge_all<'a, I>(tables: I) -> TableResult<ConversationTable>
where
    I: IntoIterator<Item = &'a ConversationTable>,
{
    let tables: Vec<&ConversationTable> = tables.into_iter().collect();
    let Some(first) = tables.first() else {
        return Ok(ConversationTable::empty());
    };

    let schema = first.schema();
    let merged = concat_batches_checked(&schema, tables.iter().map(|t| t.batch()))
        .context(SchemaMismatchSnafu)?;

    ConversationTable::try_from_batch(merged)
}
