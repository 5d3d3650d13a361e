//! Atomic formula editing.
//!
//! [`AtomicEditController`] owns the formula text, the cursor and the current
//! metric token set. Metric tokens behave as single units: nothing can be
//! typed inside one, and deleting at either edge removes the whole token.
//!
//! Every operation returns an [`EditOutcome`]. A rejected operation leaves
//! text, cursor and tokens untouched. All positions are char indices.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formula::scanner::{self, MetricToken, TOKEN_CLOSE, TOKEN_OPEN};
use crate::formula::syntax::is_identifier;
use crate::formula::tree::AggregateKind;

const OPERATOR_CHARS: [char; 5] = ['+', '-', '*', '/', '.'];

fn is_operator_char(ch: char) -> bool {
    OPERATOR_CHARS.contains(&ch)
}

/// Convert a char index into a byte offset. Indices past the end map to
/// `text.len()`.
fn byte_index(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Behavior switches for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorOptions {
    /// Surround inserted metric tokens with a single space where needed.
    pub pad_tokens: bool,
    /// Refuse an operator typed right next to another operator.
    pub reject_adjacent_operators: bool,
    /// Accept `.` as a typed character.
    pub allow_decimal_point: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            pad_tokens: true,
            reject_adjacent_operators: true,
            allow_decimal_point: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Position is past the end of the formula.
    OutOfBounds,
    /// Position is strictly inside a metric token.
    InsideToken,
    DisallowedCharacter,
    AdjacentOperator,
    NothingToDelete,
    InvalidMetricId,
    /// An unclosed `{` before the position would swallow the new token.
    UnclosedToken,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "position is outside the formula"),
            Self::InsideToken => write!(f, "position is inside a metric token"),
            Self::DisallowedCharacter => write!(f, "character is not allowed"),
            Self::AdjacentOperator => write!(f, "operator next to another operator"),
            Self::NothingToDelete => write!(f, "nothing to delete"),
            Self::InvalidMetricId => write!(f, "invalid metric id"),
            Self::UnclosedToken => write!(f, "an unclosed token precedes the position"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Rejected(RejectReason),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied)
    }
}

/// A serializable edit request, as read from a JSONL stream.
///
/// `position` defaults to the current cursor when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    InsertChar {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
        #[serde(rename = "char")]
        ch: char,
    },
    DeleteBackward {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    DeleteForward {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    InsertMetric {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
        metric_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aggregate: Option<AggregateKind>,
    },
    MoveCursor {
        position: usize,
    },
    MoveLeft,
    MoveRight,
    Clear,
}

/// Formula text, cursor and token set for one editing session.
#[derive(Debug, Clone, Default)]
pub struct AtomicEditController {
    text: String,
    cursor: usize,
    tokens: Vec<MetricToken>,
    options: EditorOptions,
}

impl AtomicEditController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EditorOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Start from existing formula text, cursor at the end.
    pub fn from_text(text: &str, options: EditorOptions) -> Self {
        let mut controller = Self::with_options(options);
        controller.set_text(text);
        controller
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn tokens(&self) -> &[MetricToken] {
        &self.tokens
    }

    pub fn options(&self) -> EditorOptions {
        self.options
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Replace the whole formula. Cursor moves to the end.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.rescan();
        self.cursor = self.len();
    }

    fn rescan(&mut self) {
        self.tokens = scanner::scan(&self.text);
    }

    fn char_at(&self, pos: usize) -> Option<char> {
        self.text.chars().nth(pos)
    }

    fn reject(&self, op: &str, position: usize, reason: RejectReason) -> EditOutcome {
        log::debug!("rejected {} at {}: {}", op, position, reason);
        EditOutcome::Rejected(reason)
    }

    /// True unless `position` is strictly inside a token or past the end.
    pub fn can_insert_at(&self, position: usize) -> bool {
        position <= self.len() && scanner::token_containing(&self.tokens, position).is_none()
    }

    fn check_position(&self, position: usize) -> Result<(), RejectReason> {
        if position > self.len() {
            Err(RejectReason::OutOfBounds)
        } else if scanner::token_containing(&self.tokens, position).is_some() {
            Err(RejectReason::InsideToken)
        } else {
            Ok(())
        }
    }

    fn char_allowed(&self, ch: char) -> bool {
        match ch {
            '0'..='9' | '+' | '-' | '*' | '/' | '(' | ')' | ' ' => true,
            '.' => self.options.allow_decimal_point,
            _ => false,
        }
    }

    pub fn insert_char(&mut self, position: usize, ch: char) -> EditOutcome {
        if let Err(reason) = self.check_position(position) {
            return self.reject("insert_char", position, reason);
        }
        if !self.char_allowed(ch) {
            return self.reject("insert_char", position, RejectReason::DisallowedCharacter);
        }
        if self.options.reject_adjacent_operators && is_operator_char(ch) {
            let before = position.checked_sub(1).and_then(|p| self.char_at(p));
            let after = self.char_at(position);
            if before.is_some_and(is_operator_char) || after.is_some_and(is_operator_char) {
                return self.reject("insert_char", position, RejectReason::AdjacentOperator);
            }
        }

        let at = byte_index(&self.text, position);
        self.text.insert(at, ch);
        self.rescan();
        self.cursor = position + 1;
        EditOutcome::Applied
    }

    /// Backspace. At the end of a token the whole token goes.
    pub fn delete_backward(&mut self, position: usize) -> EditOutcome {
        if position > self.len() {
            return self.reject("delete_backward", position, RejectReason::OutOfBounds);
        }
        if position == 0 {
            return self.reject("delete_backward", position, RejectReason::NothingToDelete);
        }

        if let Some(token) = scanner::token_ending_at(&self.tokens, position).copied() {
            self.remove_chars(token.start, token.after());
            self.cursor = token.start;
            return EditOutcome::Applied;
        }
        if scanner::token_containing(&self.tokens, position).is_some() {
            return self.reject("delete_backward", position, RejectReason::InsideToken);
        }

        self.remove_chars(position - 1, position);
        self.cursor = position - 1;
        EditOutcome::Applied
    }

    /// Delete key. At the start of a token the whole token goes.
    pub fn delete_forward(&mut self, position: usize) -> EditOutcome {
        let len = self.len();
        if position > len {
            return self.reject("delete_forward", position, RejectReason::OutOfBounds);
        }
        if scanner::token_containing(&self.tokens, position).is_some() {
            return self.reject("delete_forward", position, RejectReason::InsideToken);
        }
        if position == len {
            return self.reject("delete_forward", position, RejectReason::NothingToDelete);
        }

        let end = match scanner::token_starting_at(&self.tokens, position) {
            Some(token) => token.after(),
            None => position + 1,
        };
        self.remove_chars(position, end);
        self.cursor = position;
        EditOutcome::Applied
    }

    fn remove_chars(&mut self, from: usize, to: usize) {
        let start = byte_index(&self.text, from);
        let end = byte_index(&self.text, to);
        self.text.replace_range(start..end, "");
        self.rescan();
    }

    /// Insert `{ metric_id }`.
    pub fn insert_metric_token(&mut self, position: usize, metric_id: &str) -> EditOutcome {
        if !Self::metric_id_valid(metric_id) {
            return self.reject("insert_metric", position, RejectReason::InvalidMetricId);
        }
        self.insert_token(position, metric_id)
    }

    /// Insert `{ Sum(metric_id) }` and friends.
    pub fn insert_aggregate_token(
        &mut self,
        position: usize,
        kind: AggregateKind,
        metric_id: &str,
    ) -> EditOutcome {
        if !Self::metric_id_valid(metric_id) {
            return self.reject("insert_metric", position, RejectReason::InvalidMetricId);
        }
        let body = format!("{}({})", kind.function_name(), metric_id);
        self.insert_token(position, &body)
    }

    fn metric_id_valid(metric_id: &str) -> bool {
        !metric_id.is_empty()
            && !metric_id.contains(|c| c == TOKEN_OPEN || c == TOKEN_CLOSE)
            && is_identifier(metric_id)
    }

    fn insert_token(&mut self, position: usize, body: &str) -> EditOutcome {
        if let Err(reason) = self.check_position(position) {
            return self.reject("insert_metric", position, reason);
        }

        let mut inserted = String::new();
        if self.options.pad_tokens {
            let before = position.checked_sub(1).and_then(|p| self.char_at(p));
            if before.is_some_and(|c| !c.is_whitespace()) {
                inserted.push(' ');
            }
        }
        let token_start = position + inserted.chars().count();
        inserted.push(TOKEN_OPEN);
        inserted.push(' ');
        inserted.push_str(body);
        inserted.push(' ');
        inserted.push(TOKEN_CLOSE);
        if self.options.pad_tokens && !self.char_at(position).is_some_and(char::is_whitespace) {
            inserted.push(' ');
        }

        let token_end = token_start + body.chars().count() + 3;

        let mut text = self.text.clone();
        text.insert_str(byte_index(&text, position), &inserted);
        let tokens = scanner::scan(&text);
        if !tokens.iter().any(|t| t.start == token_start && t.end == token_end) {
            return self.reject("insert_metric", position, RejectReason::UnclosedToken);
        }

        self.text = text;
        self.tokens = tokens;
        self.cursor = position + inserted.chars().count();
        EditOutcome::Applied
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.tokens.clear();
        self.cursor = 0;
    }

    /// Move the cursor, clamped to the formula. A position strictly inside
    /// a token snaps to the nearer token edge (ties go to the start).
    pub fn set_cursor(&mut self, position: usize) {
        let position = position.min(self.len());
        self.cursor = match scanner::token_containing(&self.tokens, position) {
            Some(token) if position - token.start <= token.after() - position => token.start,
            Some(token) => token.after(),
            None => position,
        };
    }

    pub fn move_left(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor = match scanner::token_ending_at(&self.tokens, self.cursor) {
            Some(token) => token.start,
            None => self.cursor - 1,
        };
    }

    pub fn move_right(&mut self) {
        if self.cursor >= self.len() {
            return;
        }
        self.cursor = match scanner::token_starting_at(&self.tokens, self.cursor) {
            Some(token) => token.after(),
            None => self.cursor + 1,
        };
    }

    /// Run a serialized edit operation.
    pub fn apply(&mut self, op: &EditOp) -> EditOutcome {
        let cursor = self.cursor;
        match op {
            EditOp::InsertChar { position, ch } => self.insert_char(position.unwrap_or(cursor), *ch),
            EditOp::DeleteBackward { position } => self.delete_backward(position.unwrap_or(cursor)),
            EditOp::DeleteForward { position } => self.delete_forward(position.unwrap_or(cursor)),
            EditOp::InsertMetric {
                position,
                metric_id,
                aggregate,
            } => {
                let position = position.unwrap_or(cursor);
                match aggregate {
                    Some(kind) => self.insert_aggregate_token(position, *kind, metric_id),
                    None => self.insert_metric_token(position, metric_id),
                }
            }
            EditOp::MoveCursor { position } => {
                self.set_cursor(*position);
                EditOutcome::Applied
            }
            EditOp::MoveLeft => {
                self.move_left();
                EditOutcome::Applied
            }
            EditOp::MoveRight => {
                self.move_right();
                EditOutcome::Applied
            }
            EditOp::Clear => {
                self.clear();
                EditOutcome::Applied
            }
        }
    }
}
