//! Editing session: an edit controller plus a parse of the formula after
//! every accepted change.
//!
//! Parsing is eager and synchronous. A session never fails because the
//! formula is incomplete; the latest parse failure is kept as a value for
//! the host to show.

use serde::Serialize;

use crate::editor::{AtomicEditController, EditOp, EditOutcome, EditorOptions};
use crate::formula::parser::{ExpressionParser, ParseFailure, ParseResult};
use crate::formula::scanner::MetricToken;
use crate::formula::tree::{BuildError, CalculationNode, TreeBuilder, UnknownFunctionPolicy};
use crate::formula::validate::{FormulaValidator, ValidationResult};

/// Point-in-time view of a session, as emitted by `kpiform edit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub formula: String,
    pub cursor: usize,
    pub tokens: Vec<MetricToken>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<CalculationNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EditSession {
    controller: AtomicEditController,
    parser: ExpressionParser,
    builder: TreeBuilder,
    parsed: ParseResult,
    tree: Option<Result<CalculationNode, BuildError>>,
}

impl EditSession {
    pub fn new(options: EditorOptions, policy: UnknownFunctionPolicy) -> Self {
        Self::from_controller(AtomicEditController::with_options(options), policy)
    }

    /// Resume editing an existing formula.
    pub fn with_formula(formula: &str, options: EditorOptions, policy: UnknownFunctionPolicy) -> Self {
        Self::from_controller(AtomicEditController::from_text(formula, options), policy)
    }

    fn from_controller(controller: AtomicEditController, policy: UnknownFunctionPolicy) -> Self {
        let mut session = Self {
            controller,
            parser: ExpressionParser::new(),
            builder: TreeBuilder::with_policy(policy),
            parsed: Err(ParseFailure::Empty),
            tree: None,
        };
        session.reparse();
        session
    }

    pub fn controller(&self) -> &AtomicEditController {
        &self.controller
    }

    pub fn formula(&self) -> &str {
        self.controller.text()
    }

    /// Apply one edit; the formula is re-parsed if the text changed.
    pub fn apply(&mut self, op: &EditOp) -> EditOutcome {
        let before = self.controller.text().to_string();
        let outcome = self.controller.apply(op);
        if outcome.is_applied() && self.controller.text() != before {
            self.reparse();
        }
        outcome
    }

    fn reparse(&mut self) {
        self.parsed = self.parser.parse(self.controller.text());
        self.tree = self.parsed.as_ref().ok().map(|syntax| self.builder.build(syntax));
    }

    /// Result of the latest parse.
    pub fn parse_result(&self) -> &ParseResult {
        &self.parsed
    }

    /// Calculation tree of the current formula, if it parses and builds.
    pub fn tree(&self) -> Option<&CalculationNode> {
        match &self.tree {
            Some(Ok(tree)) => Some(tree),
            _ => None,
        }
    }

    /// Human-readable reason the current formula has no tree.
    pub fn error(&self) -> Option<String> {
        match (&self.parsed, &self.tree) {
            (Err(ParseFailure::Empty), _) => None,
            (Err(failure), _) => Some(failure.to_string()),
            (Ok(_), Some(Err(e))) => Some(e.to_string()),
            _ => None,
        }
    }

    /// Full submission check of the current formula.
    pub fn validate(&self) -> ValidationResult {
        FormulaValidator::with_policy(self.builder.policy()).validate(self.controller.text())
    }

    pub fn state(&self, outcome: EditOutcome) -> SessionState {
        SessionState {
            formula: self.controller.text().to_string(),
            cursor: self.controller.cursor(),
            tokens: self.controller.tokens().to_vec(),
            applied: outcome.is_applied(),
            rejected: match outcome {
                EditOutcome::Rejected(reason) => Some(reason.to_string()),
                EditOutcome::Applied => None,
            },
            tree: self.tree().cloned(),
            error: self.error(),
        }
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(EditorOptions::default(), UnknownFunctionPolicy::default())
    }
}
