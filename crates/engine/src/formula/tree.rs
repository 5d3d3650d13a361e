//! Calculation tree - the normalized form handed to the aggregation engine.
//!
//! ## Wire format
//!
//! Each node serializes as a single-key JSON object:
//!
//! | Node                         | JSON                                  |
//! |------------------------------|---------------------------------------|
//! | `Aggregate(Sum, id)`         | `{"sum": "id"}`                       |
//! | `Aggregate(Count, id)`       | `{"count": "id"}`                     |
//! | `Aggregate(Average, id)`     | `{"avg": "id"}`                       |
//! | `MetricReference(id)`        | `{"sum": "id"}` (bare metrics are summed) |
//! | `BinaryOp(Add, l, r)`        | `{"add": [l, r]}` (same for `subtract`, `multiply`, `divide`) |
//! | `Constant(n)`                | `{"constant": n}`                     |
//! | `Empty`                      | `{}`                                  |
//!
//! The key vocabulary is a contract with the downstream consumer and must not
//! change. Integral constants are written as JSON integers.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::syntax::{Operator, SyntaxNode};

/// Largest integer an f64 represents exactly; integral constants up to this
/// magnitude are written without a fractional part.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Sum,
    Count,
    #[serde(rename = "avg")]
    Average,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 3] = [AggregateKind::Sum, AggregateKind::Count, AggregateKind::Average];

    pub fn wire_key(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Count => "count",
            AggregateKind::Average => "avg",
        }
    }

    /// Function name used inside formula text, e.g. `Sum(revenue)`.
    pub fn function_name(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "Sum",
            AggregateKind::Count => "Count",
            AggregateKind::Average => "Avg",
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.function_name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryKind {
    pub const ALL: [BinaryKind; 4] = [BinaryKind::Add, BinaryKind::Subtract, BinaryKind::Multiply, BinaryKind::Divide];

    /// Wire key, also the function name of the 2-ary call form (`add(a, b)`).
    pub fn wire_key(&self) -> &'static str {
        match self {
            BinaryKind::Add => "add",
            BinaryKind::Subtract => "subtract",
            BinaryKind::Multiply => "multiply",
            BinaryKind::Divide => "divide",
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            BinaryKind::Add => '+',
            BinaryKind::Subtract => '-',
            BinaryKind::Multiply => '*',
            BinaryKind::Divide => '/',
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            BinaryKind::Add | BinaryKind::Subtract => 1,
            BinaryKind::Multiply | BinaryKind::Divide => 2,
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_key() == name)
    }

    fn from_operator(op: Operator) -> Option<Self> {
        match op {
            Operator::Add => Some(BinaryKind::Add),
            Operator::Subtract => Some(BinaryKind::Subtract),
            Operator::Multiply => Some(BinaryKind::Multiply),
            Operator::Divide => Some(BinaryKind::Divide),
            Operator::Negate => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalculationNode {
    Constant(f64),
    MetricReference(String),
    Aggregate {
        kind: AggregateKind,
        metric_id: String,
    },
    BinaryOp {
        kind: BinaryKind,
        left: Box<CalculationNode>,
        right: Box<CalculationNode>,
    },
    /// Placeholder for an unmapped function under `UnknownFunctionPolicy::Placeholder`
    Empty,
}

impl CalculationNode {
    pub fn aggregate(kind: AggregateKind, metric_id: impl Into<String>) -> Self {
        CalculationNode::Aggregate { kind, metric_id: metric_id.into() }
    }

    pub fn binary(kind: BinaryKind, left: CalculationNode, right: CalculationNode) -> Self {
        CalculationNode::BinaryOp { kind, left: Box::new(left), right: Box::new(right) }
    }

    /// Metric ids referenced anywhere in the tree, left to right, duplicates kept.
    pub fn metric_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_metric_ids(&mut ids);
        ids
    }

    fn collect_metric_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        match self {
            CalculationNode::Constant(_) | CalculationNode::Empty => {}
            CalculationNode::MetricReference(id) | CalculationNode::Aggregate { metric_id: id, .. } => {
                ids.push(id);
            }
            CalculationNode::BinaryOp { left, right, .. } => {
                left.collect_metric_ids(ids);
                right.collect_metric_ids(ids);
            }
        }
    }

    /// True if a placeholder node appears anywhere in the tree.
    pub fn has_placeholder(&self) -> bool {
        match self {
            CalculationNode::Empty => true,
            CalculationNode::BinaryOp { left, right, .. } => left.has_placeholder() || right.has_placeholder(),
            _ => false,
        }
    }
}

// =============================================================================
// Serialization
// =============================================================================

#[derive(Serialize)]
#[serde(untagged)]
enum WireNumber {
    Int(i64),
    Float(f64),
}

fn wire_number(value: f64) -> Option<WireNumber> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INT {
        Some(WireNumber::Int(value as i64))
    } else {
        Some(WireNumber::Float(value))
    }
}

impl Serialize for CalculationNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = if matches!(self, CalculationNode::Empty) { 0 } else { 1 };
        let mut map = serializer.serialize_map(Some(entries))?;
        match self {
            CalculationNode::Constant(value) => {
                let number = wire_number(*value).ok_or_else(|| {
                    <S::Error as ser::Error>::custom(format!("non-finite constant: {value}"))
                })?;
                map.serialize_entry("constant", &number)?;
            }
            CalculationNode::MetricReference(id) => {
                map.serialize_entry(AggregateKind::Sum.wire_key(), id)?;
            }
            CalculationNode::Aggregate { kind, metric_id } => {
                map.serialize_entry(kind.wire_key(), metric_id)?;
            }
            CalculationNode::BinaryOp { kind, left, right } => {
                map.serialize_entry(kind.wire_key(), &[left.as_ref(), right.as_ref()])?;
            }
            CalculationNode::Empty => {}
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireNode {
    Sum(String),
    Count(String),
    Avg(String),
    Add(Box<CalculationNode>, Box<CalculationNode>),
    Subtract(Box<CalculationNode>, Box<CalculationNode>),
    Multiply(Box<CalculationNode>, Box<CalculationNode>),
    Divide(Box<CalculationNode>, Box<CalculationNode>),
    Constant(f64),
}

impl From<WireNode> for CalculationNode {
    fn from(node: WireNode) -> Self {
        let binary = |kind, left, right| CalculationNode::BinaryOp { kind, left, right };
        match node {
            WireNode::Sum(id) => CalculationNode::aggregate(AggregateKind::Sum, id),
            WireNode::Count(id) => CalculationNode::aggregate(AggregateKind::Count, id),
            WireNode::Avg(id) => CalculationNode::aggregate(AggregateKind::Average, id),
            WireNode::Add(l, r) => binary(BinaryKind::Add, l, r),
            WireNode::Subtract(l, r) => binary(BinaryKind::Subtract, l, r),
            WireNode::Multiply(l, r) => binary(BinaryKind::Multiply, l, r),
            WireNode::Divide(l, r) => binary(BinaryKind::Divide, l, r),
            WireNode::Constant(value) => CalculationNode::Constant(value),
        }
    }
}

impl<'de> Deserialize<'de> for CalculationNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireNode::deserialize(deserializer)
            .map(CalculationNode::from)
            .map_err(|e| de::Error::custom(format!("invalid calculation node: {e}")))
    }
}

// =============================================================================
// Tree building
// =============================================================================

/// What to do with a function call the tree builder cannot map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFunctionPolicy {
    /// Fail the build; the validator reports the formula as unsupported.
    #[default]
    Reject,
    /// Substitute `CalculationNode::Empty` and keep going.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Function name/arity with no aggregate or arithmetic mapping.
    UnknownFunction { name: String, arity: usize },
    /// Aggregate called on something other than a bare metric identifier.
    AggregateArgument { function: String },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFunction { name, arity } => {
                write!(f, "unsupported function {name} with {arity} argument(s)")
            }
            Self::AggregateArgument { function } => {
                write!(f, "{function}() expects a single metric")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Converts a generic syntax tree into a [`CalculationNode`] tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuilder {
    policy: UnknownFunctionPolicy,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: UnknownFunctionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnknownFunctionPolicy {
        self.policy
    }

    pub fn build(&self, node: &SyntaxNode) -> Result<CalculationNode, BuildError> {
        match node {
            SyntaxNode::Constant(value) => Ok(CalculationNode::Constant(*value)),
            SyntaxNode::Symbol(name) => Ok(CalculationNode::MetricReference(name.clone())),
            SyntaxNode::Parenthesis(inner) => self.build(inner),
            SyntaxNode::Function { name, args } => match args.as_slice() {
                [left, right] => match BinaryKind::from_function_name(name) {
                    Some(kind) => self.build_binary(kind, left, right),
                    None => self.unmapped(BuildError::UnknownFunction { name: name.clone(), arity: 2 }),
                },
                [arg] => self.build_aggregate(name, arg),
                _ => self.unmapped(BuildError::UnknownFunction { name: name.clone(), arity: args.len() }),
            },
            SyntaxNode::Operator { op, args } => match (BinaryKind::from_operator(*op), args.as_slice()) {
                (Some(kind), [left, right]) => self.build_binary(kind, left, right),
                (None, [operand]) => self.negate(operand),
                _ => self.unmapped(BuildError::UnknownFunction {
                    name: op.name().to_string(),
                    arity: args.len(),
                }),
            },
        }
    }

    fn build_binary(&self, kind: BinaryKind, left: &SyntaxNode, right: &SyntaxNode) -> Result<CalculationNode, BuildError> {
        let left = self.build(left)?;
        let right = self.build(right)?;
        Ok(CalculationNode::binary(kind, left, right))
    }

    fn build_aggregate(&self, name: &str, arg: &SyntaxNode) -> Result<CalculationNode, BuildError> {
        let Some(kind) = AggregateKind::from_function_name(name) else {
            return self.unmapped(BuildError::UnknownFunction { name: name.to_string(), arity: 1 });
        };
        match arg {
            SyntaxNode::Symbol(metric_id) => Ok(CalculationNode::aggregate(kind, metric_id.clone())),
            _ => self.unmapped(BuildError::AggregateArgument { function: name.to_string() }),
        }
    }

    // -x  =>  multiply(-1, x), literals included
    fn negate(&self, operand: &SyntaxNode) -> Result<CalculationNode, BuildError> {
        let operand = self.build(operand)?;
        Ok(CalculationNode::binary(BinaryKind::Multiply, CalculationNode::Constant(-1.0), operand))
    }

    fn unmapped(&self, err: BuildError) -> Result<CalculationNode, BuildError> {
        match self.policy {
            UnknownFunctionPolicy::Reject => Err(err),
            UnknownFunctionPolicy::Placeholder => {
                log::debug!("substituting empty node: {}", err);
                Ok(CalculationNode::Empty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;
    use serde_json::json;

    fn build(formula: &str) -> Result<CalculationNode, BuildError> {
        TreeBuilder::new().build(&parse(formula).unwrap())
    }

    fn sum(id: &str) -> CalculationNode {
        CalculationNode::aggregate(AggregateKind::Sum, id)
    }

    #[test]
    fn test_divide_sum_by_count() {
        let tree = build("{ Sum(revenue) } / { Count(calls) }").unwrap();
        assert_eq!(tree, CalculationNode::binary(
            BinaryKind::Divide,
            sum("revenue"),
            CalculationNode::aggregate(AggregateKind::Count, "calls"),
        ));
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"divide": [{"sum": "revenue"}, {"count": "calls"}]})
        );
    }

    #[test]
    fn test_average_wire_key() {
        let tree = build("{ Avg(handle_time) }").unwrap();
        assert_eq!(tree, CalculationNode::aggregate(AggregateKind::Average, "handle_time"));
        assert_eq!(serde_json::to_value(&tree).unwrap(), json!({"avg": "handle_time"}));
    }

    #[test]
    fn test_bare_metric_is_reference_serialized_as_sum() {
        let tree = build("{ orders } * 2").unwrap();
        assert_eq!(tree, CalculationNode::binary(
            BinaryKind::Multiply,
            CalculationNode::MetricReference("orders".to_string()),
            CalculationNode::Constant(2.0),
        ));
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"multiply": [{"sum": "orders"}, {"constant": 2}]})
        );
    }

    #[test]
    fn test_function_call_binary_form() {
        let tree = build("subtract(Sum(a), 1)").unwrap();
        assert_eq!(tree, CalculationNode::binary(BinaryKind::Subtract, sum("a"), CalculationNode::Constant(1.0)));
    }

    #[test]
    fn test_parenthesis_is_transparent() {
        let tree = build("({ Sum(a) } + 1) * 3").unwrap();
        assert_eq!(tree, CalculationNode::binary(
            BinaryKind::Multiply,
            CalculationNode::binary(BinaryKind::Add, sum("a"), CalculationNode::Constant(1.0)),
            CalculationNode::Constant(3.0),
        ));
        assert_eq!(build("({ Sum(a) })").unwrap(), sum("a"));
    }

    #[test]
    fn test_unary_minus_normalized() {
        let tree = build("-{ Sum(a) }").unwrap();
        assert_eq!(tree, CalculationNode::binary(
            BinaryKind::Multiply,
            CalculationNode::Constant(-1.0),
            sum("a"),
        ));
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"multiply": [{"constant": -1}, {"sum": "a"}]})
        );
    }

    #[test]
    fn test_negated_literal_multiplies_by_minus_one() {
        let minus = |v: f64| CalculationNode::binary(
            BinaryKind::Multiply,
            CalculationNode::Constant(-1.0),
            CalculationNode::Constant(v),
        );
        assert_eq!(build("-2.5").unwrap(), minus(2.5));
        assert_eq!(build("-(2)").unwrap(), minus(2.0));

        let tree = build("{ Sum(a) } * -5").unwrap();
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"multiply": [{"sum": "a"}, {"multiply": [{"constant": -1}, {"constant": 5}]}]})
        );
    }

    #[test]
    fn test_unknown_function_rejected_by_default() {
        assert_eq!(
            build("{ Max(a) }"),
            Err(BuildError::UnknownFunction { name: "Max".to_string(), arity: 1 })
        );
        assert_eq!(
            build("pow(a, 2)"),
            Err(BuildError::UnknownFunction { name: "pow".to_string(), arity: 2 })
        );
        assert_eq!(
            build("Sum(a, b, c)"),
            Err(BuildError::UnknownFunction { name: "Sum".to_string(), arity: 3 })
        );
        assert_eq!(
            build("Sum(1)"),
            Err(BuildError::AggregateArgument { function: "Sum".to_string() })
        );
    }

    #[test]
    fn test_unknown_function_placeholder_policy() {
        let builder = TreeBuilder::with_policy(UnknownFunctionPolicy::Placeholder);
        let tree = builder.build(&parse("{ Max(a) } + { Sum(b) }").unwrap()).unwrap();
        assert_eq!(tree, CalculationNode::binary(BinaryKind::Add, CalculationNode::Empty, sum("b")));
        assert!(tree.has_placeholder());
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({"add": [{}, {"sum": "b"}]})
        );
    }

    #[test]
    fn test_constant_serialization() {
        let to_json = |v: f64| serde_json::to_value(CalculationNode::Constant(v)).unwrap();
        assert_eq!(to_json(3.0), json!({"constant": 3}));
        assert_eq!(to_json(0.25), json!({"constant": 0.25}));
        assert!(serde_json::to_value(CalculationNode::Constant(f64::NAN)).is_err());
    }

    #[test]
    fn test_deserialize_wire_format() {
        let tree: CalculationNode = serde_json::from_value(json!(
            {"add": [{"avg": "x"}, {"multiply": [{"constant": 2}, {"count": "y"}]}]}
        )).unwrap();
        assert_eq!(tree, CalculationNode::binary(
            BinaryKind::Add,
            CalculationNode::aggregate(AggregateKind::Average, "x"),
            CalculationNode::binary(
                BinaryKind::Multiply,
                CalculationNode::Constant(2.0),
                CalculationNode::aggregate(AggregateKind::Count, "y"),
            ),
        ));
    }

    #[test]
    fn test_deserialize_rejects_unknown_key() {
        let result: Result<CalculationNode, _> = serde_json::from_value(json!({"max": "x"}));
        assert!(result.is_err());
        let result: Result<CalculationNode, _> = serde_json::from_value(json!({"add": [{"sum": "x"}]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_metric_ids() {
        let tree = build("{ Sum(a) } / ({ b } - { Count(a) })").unwrap();
        assert_eq!(tree.metric_ids(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_aggregate_name_lookup() {
        assert_eq!(AggregateKind::from_function_name("Avg"), Some(AggregateKind::Average));
        assert_eq!(AggregateKind::from_function_name("sum"), None);
        assert_eq!(BinaryKind::from_function_name("divide"), Some(BinaryKind::Divide));
    }
}
