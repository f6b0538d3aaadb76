//! The conversation table schema and schema compatibility helpers.
//!
//! Every conversation table uses the same four columns:
//!
//! | column     | type         | nullable |
//! |------------|--------------|----------|
//! | `query`    | `Utf8`       | no       |
//! | `terms`    | `List<Utf8>` | no       |
//! | `response` | `Utf8`       | no       |
//! | `topic`    | `Utf8`       | yes      |
//!
//! Two operations live here:
//! - [`ensure_schema_exact_match`]: no schema evolution. Used before
//!   concatenating batches, where column order, types and nullability must
//!   agree exactly.
//! - [`coerce_batch`]: project a batch read from disk onto a target schema by
//!   column name, casting where the physical type differs. This is what lets
//!   files written by other tools (with an extra index column, `LargeUtf8`
//!   strings, or an all-null `topic` stored as the `Null` type) load cleanly.
//!   [`MissingColumns`] decides whether an absent column is an error or, for
//!   nullable target fields, a column of nulls.

use std::{collections::HashMap, sync::Arc};

use arrow::{
    array::{ArrayRef, RecordBatch, new_null_array},
    compute::{CastOptions, cast_with_options},
    datatypes::{DataType, Field, FieldRef, Schema, SchemaRef},
    error::ArrowError,
};
use log::debug;
use snafu::prelude::*;

use crate::error::ErrorKind;

/// Name of the query column.
pub const QUERY_COLUMN: &str = "query";
/// Name of the terms column.
pub const TERMS_COLUMN: &str = "terms";
/// Name of the response column.
pub const RESPONSE_COLUMN: &str = "response";
/// Name of the topic column.
pub const TOPIC_COLUMN: &str = "topic";

/// Item field of the `terms` list column.
pub fn terms_item_field() -> FieldRef {
    Arc::new(Field::new_list_field(DataType::Utf8, true))
}

/// The canonical conversation table schema.
pub fn conversation_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(QUERY_COLUMN, DataType::Utf8, false),
        Field::new(TERMS_COLUMN, DataType::List(terms_item_field()), false),
        Field::new(RESPONSE_COLUMN, DataType::Utf8, false),
        Field::new(TOPIC_COLUMN, DataType::Utf8, true),
    ]))
}

/// Errors raised when a schema or a batch does not fit the expected schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// A column of the expected schema is absent.
    #[snafu(display("Schema is missing required column {column}"))]
    MissingColumn {
        /// The name of the missing column.
        column: String,
    },

    /// A column is present that the expected schema does not have.
    #[snafu(display("Schema has extra column {column} not present in expected schema"))]
    ExtraColumn {
        /// The name of the extra column.
        column: String,
    },

    /// Same column set, different order.
    #[snafu(display("Column order differs: expected {expected:?}, found {actual:?}"))]
    ColumnOrder {
        /// Expected column names, in order.
        expected: Vec<String>,
        /// Actual column names, in order.
        actual: Vec<String>,
    },

    /// Column exists in both schemas, but the data types differ.
    #[snafu(display("Type mismatch for column {column}: expected {expected}, found {actual}"))]
    TypeMismatch {
        /// The name of the column with mismatched type.
        column: String,
        /// The type in the expected schema.
        expected: DataType,
        /// The type actually found.
        actual: DataType,
    },

    /// Column exists in both schemas, but nullability differs.
    #[snafu(display(
        "Nullability mismatch for column {column}: expected nullable={expected}, \
         found nullable={actual}"
    ))]
    NullabilityMismatch {
        /// The name of the column.
        column: String,
        /// Nullability in the expected schema.
        expected: bool,
        /// Nullability actually found.
        actual: bool,
    },

    /// A column could not be cast to the expected type.
    #[snafu(display("Cannot coerce column {column} from {from} to {to}: {source}"))]
    Coerce {
        /// The name of the column.
        column: String,
        /// The type found on disk.
        from: DataType,
        /// The type required.
        to: DataType,
        /// Underlying Arrow cast error.
        source: ArrowError,
    },

    /// The coerced or concatenated columns did not form a valid batch
    /// (for example, nulls in a non-nullable column).
    #[snafu(display("Cannot assemble batch for expected schema: {source}"))]
    Batch {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

impl SchemaError {
    /// Schema problems are always format errors.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Format
    }
}

/// A convenience type alias for results of schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

fn fields_by_name(schema: &Schema) -> HashMap<&str, &Field> {
    schema
        .fields()
        .iter()
        .map(|f| (f.name().as_str(), f.as_ref()))
        .collect()
}

fn column_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

/// Require `actual` to equal `expected`, column for column.
///
/// - Every expected column must appear in `actual`, with no extras.
/// - Data type and nullability must match exactly.
/// - Column order must match (batches are concatenated positionally).
///
/// Schema-level metadata is ignored.
pub fn ensure_schema_exact_match(expected: &Schema, actual: &Schema) -> SchemaResult<()> {
    let expected_cols = fields_by_name(expected);
    let actual_cols = fields_by_name(actual);

    for field in expected.fields() {
        let name = field.name().as_str();
        let found = actual_cols
            .get(name)
            .context(MissingColumnSnafu { column: name })?;

        ensure!(
            field.data_type() == found.data_type(),
            TypeMismatchSnafu {
                column: name,
                expected: field.data_type().clone(),
                actual: found.data_type().clone(),
            }
        );

        ensure!(
            field.is_nullable() == found.is_nullable(),
            NullabilityMismatchSnafu {
                column: name,
                expected: field.is_nullable(),
                actual: found.is_nullable(),
            }
        );
    }

    for field in actual.fields() {
        ensure!(
            expected_cols.contains_key(field.name().as_str()),
            ExtraColumnSnafu {
                column: field.name().as_str(),
            }
        );
    }

    let expected_order = column_names(expected);
    let actual_order = column_names(actual);
    ensure!(
        expected_order == actual_order,
        ColumnOrderSnafu {
            expected: expected_order,
            actual: actual_order,
        }
    );

    Ok(())
}

/// What [`coerce_batch_with`] does when `batch` lacks a target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingColumns {
    /// Fail with [`SchemaError::MissingColumn`].
    #[default]
    Reject,
    /// Substitute an all-null column when the target field is nullable.
    /// Non-nullable fields are still rejected.
    FillNulls,
}

/// Project `batch` onto `target` by column name, casting columns whose type
/// differs. Columns not in `target` are dropped; a missing column is an error.
///
/// Casts are strict: a value that cannot be represented in the target type
/// is an error rather than a silent null.
pub fn coerce_batch(batch: &RecordBatch, target: &SchemaRef) -> SchemaResult<RecordBatch> {
    coerce_batch_with(batch, target, MissingColumns::Reject)
}

/// Like [`coerce_batch`], with `missing` deciding how absent columns are
/// handled.
pub fn coerce_batch_with(
    batch: &RecordBatch,
    target: &SchemaRef,
    missing: MissingColumns,
) -> SchemaResult<RecordBatch> {
    let source_schema = batch.schema();

    let cast_options = CastOptions {
        safe: false,
        ..Default::default()
    };

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(target.fields().len());
    for field in target.fields() {
        let name = field.name().as_str();
        let Ok(idx) = source_schema.index_of(name) else {
            ensure!(
                missing == MissingColumns::FillNulls && field.is_nullable(),
                MissingColumnSnafu { column: name }
            );
            debug!("filling absent column {name} with nulls");
            columns.push(new_null_array(field.data_type(), batch.num_rows()));
            continue;
        };

        let column = batch.column(idx);
        if column.data_type() == field.data_type() {
            columns.push(Arc::clone(column));
        } else {
            let cast = cast_with_options(column.as_ref(), field.data_type(), &cast_options)
                .context(CoerceSnafu {
                    column: name,
                    from: column.data_type().clone(),
                    to: field.data_type().clone(),
                })?;
            columns.push(cast);
        }
    }

    for field in source_schema.fields() {
        if target.field_with_name(field.name()).is_err() {
            debug!("dropping column {} not present in target schema", field.name());
        }
    }

    RecordBatch::try_new(Arc::clone(target), columns).context(BatchSnafu)
}
