//! Expression parser front end.
//!
//! Strips metric token delimiters and hands the remaining plain arithmetic to
//! an [`ArithmeticParser`]. Failures are returned as values; nothing panics
//! and nothing here is fatal to an editing session.

use std::fmt;

use super::scanner::{TOKEN_CLOSE, TOKEN_OPEN};
use super::syntax::{ArithmeticParser, StandardParser, SyntaxError, SyntaxNode};

/// Outcome of parsing a formula: the generic syntax tree or a failure marker.
pub type ParseResult = Result<SyntaxNode, ParseFailure>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Nothing left to parse after trimming and stripping delimiters.
    Empty,
    /// The arithmetic parser rejected the text.
    Syntax(SyntaxError),
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty formula"),
            Self::Syntax(e) => write!(f, "syntax error: {e}"),
        }
    }
}

impl std::error::Error for ParseFailure {}

/// Remove every `{` and `}` so metric tokens reach the arithmetic parser as
/// bare identifiers or calls. Surrounding whitespace is trimmed.
pub fn strip_token_delimiters(formula: &str) -> String {
    formula
        .trim()
        .chars()
        .filter(|&c| c != TOKEN_OPEN && c != TOKEN_CLOSE)
        .collect()
}

/// Formula parser wrapping an arithmetic parser implementation.
#[derive(Debug, Clone, Default)]
pub struct ExpressionParser<P = StandardParser> {
    inner: P,
}

impl ExpressionParser<StandardParser> {
    pub fn new() -> Self {
        Self { inner: StandardParser }
    }
}

impl<P: ArithmeticParser> ExpressionParser<P> {
    /// Use a different arithmetic parser behind the same front end.
    pub fn with_parser(inner: P) -> Self {
        Self { inner }
    }

    pub fn parse(&self, formula: &str) -> ParseResult {
        let clean = strip_token_delimiters(formula);
        if clean.trim().is_empty() {
            return Err(ParseFailure::Empty);
        }

        self.inner.parse(&clean).map_err(|e| {
            log::debug!("formula parse failed: {} (input: {:?})", e, clean);
            ParseFailure::Syntax(e)
        })
    }
}

/// Parse with the built-in arithmetic parser.
pub fn parse(formula: &str) -> ParseResult {
    ExpressionParser::new().parse(formula)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_token_delimiters() {
        assert_eq!(strip_token_delimiters("  { Sum(a) } + 1 "), " Sum(a)  + 1");
        assert_eq!(strip_token_delimiters("{x}"), "x");
    }

    #[test]
    fn test_parse_token_formula() {
        let node = parse("{ Sum(revenue) } / { Count(calls) }").unwrap();
        assert!(matches!(node, SyntaxNode::Operator { .. }));
    }

    #[test]
    fn test_parse_bare_token_is_symbol() {
        assert_eq!(parse("{ orders }").unwrap(), SyntaxNode::Symbol("orders".to_string()));
    }

    #[test]
    fn test_parse_empty_is_failure() {
        assert_eq!(parse(""), Err(ParseFailure::Empty));
        assert_eq!(parse("  {} "), Err(ParseFailure::Empty));
    }

    #[test]
    fn test_parse_syntax_failure() {
        assert!(matches!(parse("{ a } +"), Err(ParseFailure::Syntax(_))));
    }

    struct AlwaysFails;

    impl ArithmeticParser for AlwaysFails {
        fn parse(&self, _source: &str) -> Result<SyntaxNode, SyntaxError> {
            Err(SyntaxError { message: "nope".to_string() })
        }
    }

    #[test]
    fn test_custom_arithmetic_parser() {
        let parser = ExpressionParser::with_parser(AlwaysFails);
        let err = parser.parse("1 + 1").unwrap_err();
        assert_eq!(err.to_string(), "syntax error: nope");
    }
}
