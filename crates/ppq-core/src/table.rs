//! In-memory conversation tables.
//!
//! A [`ConversationTable`] wraps a single Arrow [`RecordBatch`] whose schema is
//! exactly [`conversation_schema`]. The check happens once, at construction,
//! so every table handed out by this crate is known to have four equal-length
//! columns of the right types. Tables are immutable; merging produces a new
//! table (see [`crate::merge`]).
//!
//! Rows carry no stored index: a row's index is its position.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray, ListBuilder, RecordBatch, StringBuilder},
    datatypes::SchemaRef,
    error::ArrowError,
};
use snafu::prelude::*;

use crate::{
    error::ErrorKind,
    record::{Record, parse_records},
    schema::{SchemaError, conversation_schema, ensure_schema_exact_match, terms_item_field},
};

/// Errors raised while assembling or combining tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// Arrow refused the assembled columns.
    #[snafu(display("Failed to assemble conversation table: {source}"))]
    Assemble {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The batch does not have the conversation schema, or two tables being
    /// merged disagree on their schema.
    #[snafu(display("Schema mismatch: {source}"))]
    SchemaMismatch {
        /// The specific incompatibility.
        source: SchemaError,
    },
}

impl TableError {
    /// Both variants mean the data does not have the expected shape.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Format
    }
}

/// A convenience type alias for table results.
pub type TableResult<T> = Result<T, TableError>;

/// A column-oriented collection of [`Record`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTable {
    batch: RecordBatch,
}

impl ConversationTable {
    /// A table with zero rows.
    pub fn empty() -> Self {
        Self {
            batch: RecordBatch::new_empty(conversation_schema()),
        }
    }

    /// Wrap `batch`, requiring its schema to be exactly the conversation
    /// schema.
    pub fn try_from_batch(batch: RecordBatch) -> TableResult<Self> {
        ensure_schema_exact_match(&conversation_schema(), &batch.schema())
            .context(SchemaMismatchSnafu)?;
        Ok(Self { batch })
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of columns (always four).
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    /// `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// The table schema.
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Borrow the underlying batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consume the table, returning the underlying batch.
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// Materialize row `row` as a [`Record`], or `None` if out of range.
    pub fn record(&self, row: usize) -> Option<Record> {
        if row >= self.num_rows() {
            return None;
        }

        let query = self.batch.column(0).as_string_opt::<i32>()?;
        let terms = self.batch.column(1).as_list_opt::<i32>()?;
        let response = self.batch.column(2).as_string_opt::<i32>()?;
        let topic = self.batch.column(3).as_string_opt::<i32>()?;

        let term_values = terms.value(row);
        let term_values = term_values.as_string_opt::<i32>()?;

        Some(Record {
            query: query.value(row).to_string(),
            terms: term_values.iter().flatten().map(str::to_string).collect(),
            response: response.value(row).to_string(),
            topic: (!topic.is_null(row)).then(|| topic.value(row).to_string()),
        })
    }

    /// Iterate over all rows as [`Record`]s, in order.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.num_rows()).filter_map(|row| self.record(row))
    }
}

impl Default for ConversationTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Accumulates records into four parallel column builders.
#[derive(Debug)]
pub struct TableBuilder {
    query: StringBuilder,
    terms: ListBuilder<StringBuilder>,
    response: StringBuilder,
    topic: StringBuilder,
    rows: usize,
}

impl TableBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self {
            query: StringBuilder::new(),
            terms: ListBuilder::new(StringBuilder::new()).with_field(terms_item_field()),
            response: StringBuilder::new(),
            topic: StringBuilder::new(),
            rows: 0,
        }
    }

    /// Append one record as the next row.
    pub fn push(&mut self, record: &Record) {
        self.query.append_value(&record.query);
        for term in &record.terms {
            self.terms.values().append_value(term);
        }
        self.terms.append(true);
        self.response.append_value(&record.response);
        self.topic.append_option(record.topic.as_deref());
        self.rows += 1;
    }

    /// Rows appended so far.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// `true` if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Finish the columns and assemble the table.
    pub fn finish(mut self) -> TableResult<ConversationTable> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.query.finish()),
            Arc::new(self.terms.finish()),
            Arc::new(self.response.finish()),
            Arc::new(self.topic.finish()),
        ];

        let batch = RecordBatch::try_new(conversation_schema(), columns).context(AssembleSnafu)?;
        Ok(ConversationTable { batch })
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<Record> for TableBuilder {
    fn extend<I: IntoIterator<Item = Record>>(&mut self, iter: I) {
        for record in iter {
            self.push(&record);
        }
    }
}

/// Parse `source_text` and build a table from every valid block, tagging each
/// row with `topic`.
pub fn build(source_text: &str, topic: Option<&str>) -> TableResult<ConversationTable> {
    let mut builder = TableBuilder::new();
    builder.extend(parse_records(source_text, topic));
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn build_two_records_with_topic() -> TestResult {
        let table = build("Q: A\nT: b\nR: C\n\nQ: D\nT: e\nR: F", Some("letters"))?;

        assert_eq!(table.shape(), (2, 4));

        let rows: Vec<Record> = table.records().collect();
        assert_eq!(rows[0].query, " A");
        assert_eq!(rows[0].terms, vec![" b".to_string()]);
        assert_eq!(rows[0].response, " C");
        assert_eq!(rows[1].query, " D");
        assert_eq!(rows[1].terms, vec![" e".to_string()]);
        assert_eq!(rows[1].response, " F");
        assert!(rows.iter().all(|r| r.topic.as_deref() == Some("letters")));
        Ok(())
    }

    #[test]
    fn build_without_topic_stores_nulls() -> TestResult {
        let table = build("Q:x\nT:y\nR:z", None)?;

        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.batch().column(3).null_count(), 1);
        assert_eq!(table.record(0).and_then(|r| r.topic), None);
        Ok(())
    }

    #[test]
    fn build_empty_text_yields_empty_table() -> TestResult {
        let table = build("", Some("unused"))?;

        assert!(table.is_empty());
        assert_eq!(table.shape(), (0, 4));
        assert_eq!(table.schema(), conversation_schema());
        for column in table.batch().columns() {
            assert_eq!(column.len(), 0);
        }
        Ok(())
    }

    #[test]
    fn skipped_blocks_leave_no_gaps() -> TestResult {
        let text = "\n\nQ:1\nT:a\nR:one\n\nbroken\n\nQ:2\nT:b\nR:two\n\n\n\nQ:3\nT:c\nR:three\n";
        let table = build(text, None)?;

        let queries: Vec<String> = table.records().map(|r| r.query).collect();
        assert_eq!(queries, vec!["1", "2", "3"]);
        assert!(table.record(3).is_none());
        Ok(())
    }

    #[test]
    fn builder_matches_schema_exactly() -> TestResult {
        let mut builder = TableBuilder::new();
        builder.push(&Record {
            query: "q".to_string(),
            terms: vec!["a".to_string(), "b".to_string()],
            response: "r".to_string(),
            topic: None,
        });
        assert_eq!(builder.len(), 1);

        let table = builder.finish()?;
        ensure_schema_exact_match(&conversation_schema(), &table.schema())?;
        assert_eq!(
            table.record(0).map(|r| r.terms),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        Ok(())
    }

    #[test]
    fn try_from_batch_rejects_foreign_schema() -> TestResult {
        let schema = Arc::new(Schema::new(vec![Field::new("query", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["q"])) as ArrayRef],
        )?;

        let err = ConversationTable::try_from_batch(batch).unwrap_err();
        assert!(matches!(err, TableError::SchemaMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Format);
        Ok(())
    }

    #[test]
    fn try_from_batch_accepts_built_table() -> TestResult {
        let table = build("Q:x\nT:y\nR:z", Some("t"))?;
        let rebuilt = ConversationTable::try_from_batch(table.batch().clone())?;
        assert_eq!(rebuilt, table);
        Ok(())
    }
}
