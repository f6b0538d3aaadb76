//! Integration tests for Parquet persistence of conversation tables.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, LargeStringArray, ListBuilder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use ppq_core::{
    ConversationTable, ErrorKind, Record, StoreError, WriteOptions, build, merge,
    storage::{self, Compression},
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const CORPUS: &str = "Q: What is the capital of France?\n\
T: geography\n\
R: Paris is the capital of France.\n\
\n\
Q: Who wrote Hamlet?\n\
T: literature\n\
R: William Shakespeare.\n";

/// Write a file shaped like a pandas export: LargeUtf8 strings, nullable
/// columns, and an index column the conversation schema does not have.
fn write_legacy_parquet(path: &Path, rows: &[(&str, &str, &str)]) -> TestResult {
    let mut terms = ListBuilder::new(StringBuilder::new());
    for (_, term, _) in rows {
        terms.values().append_value(term);
        terms.append(true);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("query", DataType::LargeUtf8, true),
        Field::new(
            "terms",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        ),
        Field::new("response", DataType::LargeUtf8, true),
        Field::new("topic", DataType::Utf8, true),
        Field::new("__index_level_0__", DataType::Int64, true),
    ]));

    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            Arc::new(LargeStringArray::from_iter_values(rows.iter().map(|r| r.0))) as ArrayRef,
            Arc::new(terms.finish()),
            Arc::new(LargeStringArray::from_iter_values(rows.iter().map(|r| r.2))),
            Arc::new(arrow::array::StringArray::from(vec![Some("legacy"); rows.len()])),
            Arc::new(Int64Array::from_iter_values(0..rows.len() as i64)),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[tokio::test]
async fn store_then_load_round_trips() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("conv.parquet");
    let table = build(CORPUS, Some("trivia"))?;

    storage::store(&table, &path, &WriteOptions::default()).await?;
    let loaded = storage::load(&path).await?;

    assert_eq!(loaded.num_rows(), 2);
    assert_eq!(loaded.schema(), table.schema());
    assert_eq!(
        loaded.records().collect::<Vec<_>>(),
        table.records().collect::<Vec<_>>()
    );
    assert_eq!(storage::row_count(&path).await?, 2);
    Ok(())
}

#[tokio::test]
async fn round_trip_with_every_codec_and_null_topic() -> TestResult {
    let tmp = TempDir::new()?;
    let table = build(CORPUS, None)?;

    for (name, compression) in [
        ("none.parquet", Compression::None),
        ("snappy.parquet", Compression::Snappy),
        ("zstd.parquet", Compression::Zstd),
    ] {
        let path = tmp.path().join(name);
        storage::store(&table, &path, &WriteOptions { compression }).await?;

        let loaded = storage::load(&path).await?;
        assert_eq!(loaded, table, "{name}");
        assert!(loaded.records().all(|r| r.topic.is_none()));
    }
    Ok(())
}

#[tokio::test]
async fn empty_table_round_trips() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("empty.parquet");

    storage::store(&build("", None)?, &path, &WriteOptions::default()).await?;
    let loaded = storage::load(&path).await?;

    assert!(loaded.is_empty());
    assert_eq!(loaded.shape(), (0, 4));
    Ok(())
}

#[tokio::test]
async fn append_flow_merges_and_overwrites_base() -> TestResult {
    let tmp = TempDir::new()?;
    let base_path = tmp.path().join("base.parquet");
    let text_path = tmp.path().join("new.txt");

    let base = build(CORPUS, Some("trivia"))?;
    storage::store(&base, &base_path, &WriteOptions::default()).await?;
    tokio::fs::write(&text_path, "Q: 2+2?\nT: math\nR: 4\n").await?;

    let addition = storage::build_from_path(&text_path, Some("math")).await?;
    let loaded = storage::load(&base_path).await?;
    assert_eq!(loaded, base);
    let merged = merge(&loaded, &addition)?;
    storage::store(&merged, &base_path, &WriteOptions::default()).await?;

    let reloaded = storage::load(&base_path).await?;
    let topics: Vec<Option<String>> = reloaded.records().map(|r| r.topic).collect();
    assert_eq!(reloaded.num_rows(), 3);
    assert_eq!(
        topics,
        vec![
            Some("trivia".to_string()),
            Some("trivia".to_string()),
            Some("math".to_string())
        ]
    );
    Ok(())
}

#[tokio::test]
async fn legacy_layout_is_coerced_on_load() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("legacy.parquet");
    write_legacy_parquet(&path, &[("q0", "t0", "r0"), ("q1", "t1", "r1")])?;

    let table = storage::load(&path).await?;

    assert_eq!(table.shape(), (2, 4));
    assert_eq!(
        table.record(1),
        Some(Record {
            query: "q1".to_string(),
            terms: vec!["t1".to_string()],
            response: "r1".to_string(),
            topic: Some("legacy".to_string()),
        })
    );
    Ok(())
}

#[tokio::test]
async fn file_without_conversation_columns_is_format_error() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("other.parquet");

    let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef],
    )?;
    let file = std::fs::File::create(&path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    let err = storage::load(&path).await.unwrap_err();
    assert!(matches!(err, StoreError::Schema { .. }));
    assert_eq!(err.kind(), ErrorKind::Format);
    Ok(())
}

#[tokio::test]
async fn concat_files_sums_rows_in_listed_order() -> TestResult {
    let tmp = TempDir::new()?;
    let a = tmp.path().join("a.parquet");
    let b = tmp.path().join("b.parquet");
    let c = tmp.path().join("c.parquet");
    let out = tmp.path().join("out.parquet");

    let first = build("Q:a1\nT:-\nR:-\n\nQ:a2\nT:-\nR:-", None)?;
    storage::store(&first, &a, &WriteOptions::default()).await?;
    storage::store(&build("Q:b1\nT:-\nR:-", None)?, &b, &WriteOptions::default()).await?;
    write_legacy_parquet(&c, &[("c1", "-", "-")])?;

    let rows = storage::concat_files(&[a, b, c], &out, &WriteOptions::default()).await?;
    assert_eq!(rows, 4);
    assert_eq!(storage::row_count(&out).await?, 4);

    let combined = storage::load(&out).await?;
    let queries: Vec<String> = combined.records().map(|r| r.query).collect();
    assert_eq!(queries, vec!["a1", "a2", "b1", "c1"]);
    Ok(())
}

#[tokio::test]
async fn concat_files_with_legacy_first_fills_its_index_column() -> TestResult {
    let tmp = TempDir::new()?;
    let legacy = tmp.path().join("legacy.parquet");
    let fresh = tmp.path().join("fresh.parquet");
    let out = tmp.path().join("out.parquet");

    write_legacy_parquet(&legacy, &[("l0", "-", "-"), ("l1", "-", "-")])?;
    storage::store(&build("Q:f0\nT:-\nR:-", Some("new"))?, &fresh, &WriteOptions::default())
        .await?;

    let rows = storage::concat_files(&[legacy, fresh], &out, &WriteOptions::default()).await?;
    assert_eq!(rows, 3);

    let file = std::fs::File::open(&out)?;
    let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)?;
    assert!(reader.schema().field_with_name("__index_level_0__").is_ok());
    let batches = reader.build()?.collect::<Result<Vec<_>, _>>()?;
    let index_nulls: usize = batches
        .iter()
        .map(|b| b.column_by_name("__index_level_0__").map_or(0, |c| c.null_count()))
        .sum();
    assert_eq!(index_nulls, 1);

    let combined = storage::load(&out).await?;
    let queries: Vec<String> = combined.records().map(|r| r.query).collect();
    assert_eq!(queries, vec!["l0", "l1", "f0"]);
    Ok(())
}

#[tokio::test]
async fn concat_files_rejects_incompatible_file() -> TestResult {
    let tmp = TempDir::new()?;
    let a = tmp.path().join("a.parquet");
    let other = tmp.path().join("other.parquet");
    let out = tmp.path().join("out.parquet");

    storage::store(&build(CORPUS, None)?, &a, &WriteOptions::default()).await?;

    let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![Arc::new(Int64Array::from(vec![1])) as ArrayRef],
    )?;
    let file = std::fs::File::create(&other)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    let err = storage::concat_files(&[a, other], &out, &WriteOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Schema { .. }));
    assert!(!out.exists());
    Ok(())
}

#[tokio::test]
async fn concat_files_may_overwrite_one_of_its_inputs() -> TestResult {
    let tmp = TempDir::new()?;
    let a = tmp.path().join("a.parquet");
    let b = tmp.path().join("b.parquet");

    storage::store(&build("Q:a\nT:-\nR:-", None)?, &a, &WriteOptions::default()).await?;
    storage::store(&build("Q:b\nT:-\nR:-", None)?, &b, &WriteOptions::default()).await?;

    let rows = storage::concat_files(&[a.clone(), b], &a, &WriteOptions::default()).await?;
    assert_eq!(rows, 2);

    let table: ConversationTable = storage::load(&a).await?;
    assert_eq!(table.num_rows(), 2);
    Ok(())
}
