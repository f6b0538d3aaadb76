//! Distinct section headings of a text corpus.
//!
//! Corpora are often assembled from several sources, each introduced by a
//! `# ` heading line. Two headings are considered the same when their first
//! eighteen characters after the marker agree. The line's newline counts
//! toward those characters, so a short final heading without a trailing
//! newline is distinct from the same heading earlier in the file.

use std::collections::HashSet;

/// Prefix that marks a heading line.
pub const HEADING_MARKER: &str = "# ";

const KEY_START: usize = 2;
const KEY_END: usize = 20;

fn heading_key(line: &str) -> String {
    line.chars().skip(KEY_START).take(KEY_END - KEY_START).collect()
}

/// Every heading line of `text` whose key has not been seen before, in order.
pub fn distinct_headings(text: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    text.split_inclusive('\n')
        .filter(|line| line.starts_with(HEADING_MARKER))
        .filter(|line| seen.insert(heading_key(line)))
        .map(|line| line.strip_suffix('\n').unwrap_or(line))
        .collect()
}
