//! Keyword list parsing.

use std::collections::HashSet;

/// Split a comma- or newline-delimited keyword list.
///
/// Entries are trimmed, blanks dropped, and repeats removed keeping the first
/// occurrence, so the result is usable directly as an item set.
pub fn parse_keyword_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}
