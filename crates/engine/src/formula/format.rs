// Formula printing - converts a calculation tree back into editor formula text
// Output uses the same token shape the editor inserts: `{ Sum(id) }`, `{ id }`

use super::scanner::{TOKEN_CLOSE, TOKEN_OPEN};
use super::tree::{BinaryKind, CalculationNode};

/// Format a calculation tree as formula text.
///
/// Parentheses are added only where precedence or associativity requires
/// them, so parsing and building the result gives back an equal tree.
/// `multiply(-1, x)` prints as `-x`, the form unary minus builds.
/// The grammar has no negative literal, so any other negative constant
/// comes back as `multiply(-1, n)`.
/// A tree containing `Empty` placeholders has no text form; they print as
/// nothing and the result will not parse.
pub fn format_formula(node: &CalculationNode) -> String {
    match node {
        CalculationNode::Empty => String::new(),
        CalculationNode::Constant(value) => format_number(*value),
        CalculationNode::MetricReference(id) => format!("{} {} {}", TOKEN_OPEN, id, TOKEN_CLOSE),
        CalculationNode::Aggregate { kind, metric_id } => {
            format!("{} {}({}) {}", TOKEN_OPEN, kind.function_name(), metric_id, TOKEN_CLOSE)
        }
        CalculationNode::BinaryOp { kind, left, right } => {
            if let Some(operand) = negated(node) {
                return format!("-{}", format_operand(operand, |_| true));
            }
            let left_str = format_operand(left, |p| p < kind.precedence());
            let right_str = format_operand(right, |p| p <= kind.precedence());
            format!("{} {} {}", left_str, kind.symbol(), right_str)
        }
    }
}

/// Operand of `multiply(-1, x)`.
fn negated(node: &CalculationNode) -> Option<&CalculationNode> {
    match node {
        CalculationNode::BinaryOp { kind: BinaryKind::Multiply, left, right } => match left.as_ref() {
            CalculationNode::Constant(c) if *c == -1.0 => Some(right.as_ref()),
            _ => None,
        },
        _ => None,
    }
}

fn format_operand(node: &CalculationNode, needs_parens: impl Fn(u8) -> bool) -> String {
    let text = format_formula(node);
    match node {
        CalculationNode::BinaryOp { kind, .. } if needs_parens(kind.precedence()) => format!("({})", text),
        _ => text,
    }
}

/// Integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
