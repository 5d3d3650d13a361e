//! Metric token scanner.
//!
//! A metric token is the substring from a `{` up to the next `}` (both
//! inclusive). Tokens cannot nest: a `{` found inside an open token is plain
//! text. A `{` that is never closed produces no token; the bracket check in
//! `validate` reports it later.
//!
//! All positions are char indices, not byte offsets.

use serde::Serialize;

pub const TOKEN_OPEN: char = '{';
pub const TOKEN_CLOSE: char = '}';

/// Char range of one metric token. `start` is the index of `{`, `end` the
/// index of `}`; both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MetricToken {
    pub start: usize,
    pub end: usize,
}

impl MetricToken {
    /// True if `pos` is strictly inside the token, i.e. an edit at `pos`
    /// would split it. `start` and `end + 1` are boundaries, not inside.
    pub fn contains(&self, pos: usize) -> bool {
        pos > self.start && pos <= self.end
    }

    /// The boundary position right after the closing delimiter.
    pub fn after(&self) -> usize {
        self.end + 1
    }

    /// Number of chars covered, delimiters included.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Token text, delimiters included.
    pub fn text(&self, formula: &str) -> String {
        formula.chars().skip(self.start).take(self.len()).collect()
    }

    /// Token text with delimiters and surrounding whitespace removed.
    pub fn body(&self, formula: &str) -> String {
        let text = self.text(formula);
        text.trim_start_matches(TOKEN_OPEN)
            .trim_end_matches(TOKEN_CLOSE)
            .trim()
            .to_string()
    }
}

/// Scan `formula` left to right and return every metric token in order.
/// Runs in a single pass; returned tokens never overlap.
pub fn scan(formula: &str) -> Vec<MetricToken> {
    let mut tokens = Vec::new();
    let mut open: Option<usize> = None;

    for (i, ch) in formula.chars().enumerate() {
        match (ch, open) {
            (TOKEN_OPEN, None) => open = Some(i),
            (TOKEN_CLOSE, Some(start)) => {
                tokens.push(MetricToken { start, end: i });
                open = None;
            }
            _ => {}
        }
    }

    tokens
}

/// The token that strictly contains `pos`, if any.
pub fn token_containing(tokens: &[MetricToken], pos: usize) -> Option<&MetricToken> {
    tokens.iter().find(|t| t.contains(pos))
}

/// The token whose closing delimiter sits right before `pos`.
pub fn token_ending_at(tokens: &[MetricToken], pos: usize) -> Option<&MetricToken> {
    tokens.iter().find(|t| t.after() == pos)
}

/// The token whose opening delimiter sits at `pos`.
pub fn token_starting_at(tokens: &[MetricToken], pos: usize) -> Option<&MetricToken> {
    tokens.iter().find(|t| t.start == pos)
}
