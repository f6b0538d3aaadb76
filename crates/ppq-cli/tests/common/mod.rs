#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, LargeStringArray, ListBuilder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const GEOGRAPHY: &str = "Q: What is the capital of France?\n\
T: geography\n\
R: Paris is the capital of France.\n\
\n\
Q: Which river flows through Cairo?\n\
T: geography\n\
R: The Nile.\n";

pub const MATH: &str = "Q: What is 2+2?\nT: arithmetic\nR: Four.\n";

/// Write `count` numbered records in the conversation text format.
pub fn corpus(count: usize) -> String {
    (0..count)
        .map(|i| format!("Q: question {i}\nT: term {i}\nR: answer {i}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn write_text(dir: &Path, name: &str, contents: &str) -> TestResult<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, contents)?;
    Ok(path)
}

/// Write a Parquet file laid out the way pandas exports a DataFrame:
/// large strings and a trailing index column.
pub fn write_pandas_parquet(path: &Path, queries: &[&str]) -> TestResult {
    let mut terms = ListBuilder::new(StringBuilder::new())
        .with_field(Arc::new(Field::new("element", DataType::Utf8, true)));
    for _ in queries {
        terms.values().append_value("legacy");
        terms.append(true);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("query", DataType::LargeUtf8, true),
        Field::new(
            "terms",
            DataType::List(Arc::new(Field::new("element", DataType::Utf8, true))),
            true,
        ),
        Field::new("response", DataType::LargeUtf8, true),
        Field::new("topic", DataType::LargeUtf8, true),
        Field::new("__index_level_0__", DataType::Int64, true),
    ]));

    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            Arc::new(LargeStringArray::from_iter_values(queries.iter().copied())) as ArrayRef,
            Arc::new(terms.finish()),
            Arc::new(LargeStringArray::from_iter_values(queries.iter().map(|_| "ok"))),
            Arc::new(LargeStringArray::from(vec![None::<&str>; queries.len()])),
            Arc::new(Int64Array::from_iter_values(0..queries.len() as i64)),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
