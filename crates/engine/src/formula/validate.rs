//! Submission-time formula validation.
//!
//! Rules run in a fixed order and the first failure wins:
//!
//! 1. Bracket balance for `()`, `{}` and `[]`
//! 2. The token-stripped formula parses
//! 3. At least one metric is referenced
//! 4. Every function maps to the calculation tree (only with
//!    [`UnknownFunctionPolicy::Reject`])
//!
//! An empty or absent formula is always invalid. Validation is a pure
//! function of the formula text.

use std::fmt;

use super::parser::{ExpressionParser, ParseResult};
use super::syntax::SyntaxNode;
use super::tree::{BuildError, CalculationNode, TreeBuilder, UnknownFunctionPolicy};

const BRACKET_PAIRS: [(char, char); 3] = [('(', ')'), ('{', '}'), ('[', ']')];

pub type ValidationResult = Result<(), ValidationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty, whitespace-only or absent formula.
    Required,
    MissingBrackets,
    NotValid,
    NoMetric,
    UnsupportedFunction(BuildError),
}

impl ValidationError {
    /// Stable machine-readable code for the failing rule.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::MissingBrackets => "missing_brackets",
            Self::NotValid => "not_valid",
            Self::NoMetric => "no_metric",
            Self::UnsupportedFunction(_) => "unsupported_function",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "Formula is required"),
            Self::MissingBrackets => write!(f, "The formula has missing brackets"),
            Self::NotValid => write!(f, "The formula is not valid"),
            Self::NoMetric => write!(f, "The formula must use at least one metric"),
            Self::UnsupportedFunction(BuildError::UnknownFunction { name, .. }) => {
                write!(f, "The formula uses an unsupported function: {name}")
            }
            Self::UnsupportedFunction(BuildError::AggregateArgument { function }) => {
                write!(f, "The formula must pass a single metric to {function}()")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check that every closing delimiter has an opening one before it and the
/// counts match, for each bracket pair independently.
pub fn brackets_balanced(formula: &str) -> bool {
    BRACKET_PAIRS.iter().all(|&(open, close)| {
        let opens = formula.char_indices().filter(|&(_, c)| c == open).map(|(i, _)| i);
        let closes: Vec<usize> = formula
            .char_indices()
            .filter(|&(_, c)| c == close)
            .map(|(i, _)| i)
            .collect();

        let mut matched = 0;
        for open_at in opens {
            match closes.get(matched) {
                Some(&close_at) if close_at > open_at => matched += 1,
                _ => return false,
            }
        }
        matched == closes.len()
    })
}

/// Number of bare identifiers (metric references) in a syntax tree.
/// Function names are not counted, their arguments are.
pub fn count_metric_symbols(node: &SyntaxNode) -> usize {
    let mut count = 0;
    node.walk(&mut |n| {
        if let SyntaxNode::Symbol(_) = n {
            count += 1;
        }
    });
    count
}

#[derive(Debug, Clone, Default)]
pub struct FormulaValidator {
    parser: ExpressionParser,
    builder: TreeBuilder,
}

impl FormulaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: UnknownFunctionPolicy) -> Self {
        Self {
            parser: ExpressionParser::new(),
            builder: TreeBuilder::with_policy(policy),
        }
    }

    pub fn builder(&self) -> &TreeBuilder {
        &self.builder
    }

    pub fn validate(&self, formula: &str) -> ValidationResult {
        self.check(formula).map(|_| ())
    }

    /// Validate a form field that may be absent.
    pub fn validate_field(&self, formula: Option<&str>) -> ValidationResult {
        match formula {
            Some(formula) => self.validate(formula),
            None => Err(ValidationError::Required),
        }
    }

    /// Validate and build the calculation tree for submission.
    pub fn compile(&self, formula: &str) -> Result<CalculationNode, ValidationError> {
        self.check(formula)
    }

    fn check(&self, formula: &str) -> Result<CalculationNode, ValidationError> {
        if formula.trim().is_empty() {
            return Err(ValidationError::Required);
        }

        if !brackets_balanced(formula) {
            return Err(ValidationError::MissingBrackets);
        }

        let parsed: ParseResult = self.parser.parse(formula);
        let Ok(syntax) = parsed else {
            return Err(ValidationError::NotValid);
        };

        if count_metric_symbols(&syntax) < 1 {
            return Err(ValidationError::NoMetric);
        }

        self.builder.build(&syntax).map_err(ValidationError::UnsupportedFunction)
    }
}

/// Validate with the default rules.
pub fn validate(formula: &str) -> ValidationResult {
    FormulaValidator::new().validate(formula)
}
