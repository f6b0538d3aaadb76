//! Parser for the blank-line separated conversation text format.
//!
//! A corpus is a sequence of blocks separated by one blank line. Each block
//! carries three positional lines, each starting with a two-character marker:
//!
//! ```text
//! Q: What is the capital of France?
//! T: geography
//! R: Paris is the capital of France.
//!
//! Q: ...
//! ```
//!
//! The marker is never inspected; it is cut off by position. Blocks with
//! fewer than three lines are skipped, which absorbs trailing blank content
//! at the end of a file.

use std::{iter::FusedIterator, str::Split};

/// Separator between two blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Number of leading characters removed from every field line.
pub const LINE_PREFIX_LEN: usize = 2;

/// Blocks with fewer lines than this are skipped.
pub const MIN_BLOCK_LINES: usize = 3;

/// One conversational exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The user-facing input string.
    pub query: String,
    /// Keywords related to the query. Parsed records always carry exactly one.
    pub terms: Vec<String>,
    /// The reply associated with the query.
    pub response: String,
    /// Optional label shared by every record from one source.
    pub topic: Option<String>,
}

/// Lazy iterator over the records of a text corpus.
///
/// Created by [`parse_records`].
#[derive(Debug, Clone)]
pub struct Records<'a> {
    blocks: Split<'a, &'static str>,
    topic: Option<&'a str>,
}

/// Parse `text` into records, tagging every record with `topic`.
pub fn parse_records<'a>(text: &'a str, topic: Option<&'a str>) -> Records<'a> {
    Records {
        blocks: text.split(BLOCK_SEPARATOR),
        topic,
    }
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let topic = self.topic;
        self.blocks
            .by_ref()
            .find_map(|block| parse_block(block, topic))
    }
}

impl FusedIterator for Records<'_> {}

/// Drop the first [`LINE_PREFIX_LEN`] characters of `line`.
///
/// Counts characters, not bytes; a line shorter than the prefix yields "".
fn strip_marker(line: &str) -> &str {
    match line.char_indices().nth(LINE_PREFIX_LEN) {
        Some((idx, _)) => &line[idx..],
        None => "",
    }
}

fn parse_block(block: &str, topic: Option<&str>) -> Option<Record> {
    let lines: Vec<&str> = block.split('\n').take(MIN_BLOCK_LINES).collect();
    if lines.len() < MIN_BLOCK_LINES {
        return None;
    }

    Some(Record {
        query: strip_marker(lines[0]).to_string(),
        terms: vec![strip_marker(lines[1]).to_string()],
        response: strip_marker(lines[2]).to_string(),
        topic: topic.map(str::to_string),
    })
}
