// Round trip: tree -> wire JSON -> tree -> formula text -> parse -> tree.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;

use kpiform_engine::formula::format::format_formula;
use kpiform_engine::formula::parser::parse;
use kpiform_engine::formula::tree::{AggregateKind, BinaryKind, CalculationNode, TreeBuilder};
use kpiform_engine::formula::validate::validate;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

// Formula text has no negative literal; negative values come from `negate`.
fn arb_constant() -> impl Strategy<Value = CalculationNode> {
    prop_oneof![
        3 => (0i64..1000).prop_map(|n| CalculationNode::Constant(n as f64)),
        1 => (0i64..400).prop_map(|n| CalculationNode::Constant(n as f64 / 4.0)),
    ]
}

/// The tree unary minus builds: multiply(-1, x).
fn negate(node: CalculationNode) -> CalculationNode {
    CalculationNode::binary(BinaryKind::Multiply, CalculationNode::Constant(-1.0), node)
}

fn arb_aggregate() -> impl Strategy<Value = CalculationNode> {
    (
        prop::sample::select(AggregateKind::ALL.to_vec()),
        r"[a-z][a-z0-9_]{0,8}",
    )
        .prop_map(|(kind, id)| CalculationNode::aggregate(kind, id))
}

fn arb_binary_kind() -> impl Strategy<Value = BinaryKind> {
    prop::sample::select(vec![
        BinaryKind::Add,
        BinaryKind::Subtract,
        BinaryKind::Multiply,
        BinaryKind::Divide,
    ])
}

fn arb_tree() -> impl Strategy<Value = CalculationNode> {
    let leaf = prop_oneof![1 => arb_constant(), 2 => arb_aggregate()];
    leaf.prop_recursive(5, 32, 2, |inner| {
        prop_oneof![
            3 => (arb_binary_kind(), inner.clone(), inner.clone())
                .prop_map(|(kind, left, right)| CalculationNode::binary(kind, left, right)),
            1 => inner.prop_map(negate),
        ]
    })
}

fn rebuild(text: &str) -> CalculationNode {
    let syntax = parse(text).unwrap_or_else(|e| panic!("{text:?} did not parse: {e}"));
    TreeBuilder::new()
        .build(&syntax)
        .unwrap_or_else(|e| panic!("{text:?} did not build: {e}"))
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn tree_survives_wire_and_text(tree in arb_tree()) {
        let json = serde_json::to_string(&tree).unwrap();
        let decoded: CalculationNode = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&decoded, &tree);

        let text = format_formula(&decoded);
        let rebuilt = rebuild(&text);
        prop_assert_eq!(&rebuilt, &tree, "formula text {:?}", text);
    }

    #[test]
    fn formatted_trees_with_metrics_validate(tree in arb_tree()) {
        prop_assume!(!tree.metric_ids().is_empty());
        let text = format_formula(&tree);
        prop_assert_eq!(validate(&text), Ok(()), "formula text {:?}", text);
    }

    #[test]
    fn negation_wire_shape(tree in arb_tree()) {
        let text = format!("-({})", format_formula(&tree));
        let json = serde_json::to_value(rebuild(&text)).unwrap();
        prop_assert_eq!(&json["multiply"][0], &serde_json::json!({"constant": -1}));
        prop_assert_eq!(&json["multiply"][1], &serde_json::to_value(&tree).unwrap());
    }

    /// A bare metric reference goes out as a sum.
    #[test]
    fn bare_reference_serializes_as_sum(id in r"[a-z][a-z0-9_]{0,8}") {
        let tree = CalculationNode::MetricReference(id.clone());
        let decoded: CalculationNode = serde_json::from_value(serde_json::to_value(&tree).unwrap()).unwrap();
        prop_assert_eq!(decoded, CalculationNode::aggregate(AggregateKind::Sum, id));
    }
}
