//! Tests for predicate lowering.

use serde_json::{json, Value};

use super::*;
use crate::evaluator::Evaluator;
use crate::schema::{Condition, Group};

fn cond(field: &str, op: Operator, value: Option<Value>, cs: bool) -> Node {
    Node::Condition(Condition::new(field, op, value, cs).unwrap())
}

fn single(node: Node) -> Predicate {
    let out = QueryCompiler::default().compile(&node);
    assert!(out.is_complete(), "unexpected drops: {:?}", out.dropped);
    out.predicate.expect("predicate")
}

fn col(name: &str) -> FieldRef {
    FieldRef::Column(name.into())
}

#[test]
fn column_equality_keeps_literal_type() {
    let p = single(cond("status", Operator::Eq, Some(json!("open")), true));
    assert_eq!(
        p,
        Predicate::Compare {
            field: col("status"),
            op: CompareOp::Eq,
            value: json!("open"),
            cast: Cast::None,
            case_insensitive: false,
        }
    );
}

#[test]
fn document_equality_is_cast_by_literal() {
    let text = single(cond("payload.user.role", Operator::Eq, Some(json!("Admin")), false));
    assert!(matches!(
        text,
        Predicate::Compare { cast: Cast::Text, case_insensitive: true, .. }
    ));

    let numeric = single(cond("payload.status_code", Operator::Ne, Some(json!(404)), true));
    assert!(matches!(
        numeric,
        Predicate::Compare { op: CompareOp::Ne, cast: Cast::Numeric, .. }
    ));

    let boolean = single(cond("payload.mfa", Operator::Eq, Some(json!(true)), true));
    match boolean {
        Predicate::Compare { value, cast, .. } => {
            assert_eq!(value, json!("true"));
            assert_eq!(cast, Cast::Text);
        }
        other => panic!("unexpected predicate: {other:?}"),
    }
}

#[test]
fn ordering_is_numeric_and_non_numbers_never_match() {
    let p = single(cond("payload.latency", Operator::Gte, Some(json!("250")), true));
    assert!(matches!(
        p,
        Predicate::Compare { op: CompareOp::Gte, cast: Cast::Numeric, ref value, .. } if value.as_f64() == Some(250.0)
    ));

    assert_eq!(
        single(cond("payload.latency", Operator::Lt, Some(json!("fast")), true)),
        Predicate::always(false)
    );
}

#[test]
fn sets_fold_case_and_stringify_for_documents() {
    let p = single(cond("severity", Operator::In, Some(json!(["High", "CRITICAL"])), false));
    assert_eq!(
        p,
        Predicate::InSet {
            field: col("severity"),
            values: vec![json!("high"), json!("critical")],
            cast: Cast::Text,
            case_insensitive: true,
            negated: false,
        }
    );

    let p = single(cond("payload.code", Operator::NotIn, Some(json!([500, "busy"])), true));
    match p {
        Predicate::InSet { values, cast, negated, .. } => {
            assert_eq!(values, vec![json!("500"), json!("busy")]);
            assert_eq!(cast, Cast::Text);
            assert!(negated);
        }
        other => panic!("unexpected predicate: {other:?}"),
    }
}

#[test]
fn numeric_sets_on_documents_compare_numerically() {
    let node = cond("payload.code", Operator::In, Some(json!([404.0, 410])), true);
    let record = json!({"payload": {"code": 404}});
    assert!(Evaluator::default().evaluate(&node, &record));

    match single(node) {
        Predicate::InSet { values, cast, .. } => {
            assert_eq!(values, vec![json!(404.0), json!(410)]);
            assert_eq!(cast, Cast::Numeric);
        }
        other => panic!("unexpected predicate: {other:?}"),
    }
    let sql = postgres::render(&single(cond("payload.code", Operator::In, Some(json!([404.0])), true)));
    assert!(sql.clause.contains("::double precision END) = ANY($2)"));
    assert_eq!(sql.params[1], postgres::SqlParam::FloatArray(vec![404.0]));
}

#[test]
fn column_sets_keep_homogeneous_literals() {
    match single(cond("severity", Operator::In, Some(json!(["high", "low"])), true)) {
        Predicate::InSet { values, cast, .. } => {
            assert_eq!(values, vec![json!("high"), json!("low")]);
            assert_eq!(cast, Cast::None);
        }
        other => panic!("unexpected predicate: {other:?}"),
    }
    match single(cond("severity", Operator::In, Some(json!(["high", 3, true])), true)) {
        Predicate::InSet { values, cast, .. } => {
            assert_eq!(values, vec![json!("high"), json!("3"), json!("true")]);
            assert_eq!(cast, Cast::Text);
        }
        other => panic!("unexpected predicate: {other:?}"),
    }
}

#[test]
fn empty_sets_are_constant() {
    assert_eq!(single(cond("severity", Operator::In, Some(json!([])), true)), Predicate::always(false));
    assert_eq!(single(cond("severity", Operator::NotIn, Some(json!([])), true)), Predicate::always(true));
}

#[test]
fn scalar_in_degrades_to_equality() {
    let p = single(cond("status", Operator::NotIn, Some(json!("closed")), true));
    assert!(matches!(p, Predicate::Compare { op: CompareOp::Ne, .. }));
}

#[test]
fn substring_operators_escape_wildcards() {
    let p = single(cond("title", Operator::Contains, Some(json!("100%_done")), false));
    assert_eq!(
        p,
        Predicate::Like {
            field: col("title"),
            pattern: r"%100\%\_done%".into(),
            case_insensitive: true,
            negated: false,
        }
    );

    let starts = single(cond("title", Operator::StartsWith, Some(json!("disk")), true));
    assert!(matches!(starts, Predicate::Like { ref pattern, .. } if pattern == "disk%"));
    let ends = single(cond("title", Operator::EndsWith, Some(json!("full")), true));
    assert!(matches!(ends, Predicate::Like { ref pattern, .. } if pattern == "%full"));
    let not = single(cond("title", Operator::NotContains, Some(json!("test")), true));
    assert!(matches!(not, Predicate::Like { negated: true, .. }));

    assert_eq!(
        single(cond("title", Operator::Contains, Some(json!(5)), true)),
        Predicate::always(false)
    );
}

#[test]
fn regex_is_validated_like_the_evaluator() {
    let p = single(cond("title", Operator::Regex, Some(json!("^disk\\d+")), false));
    assert!(matches!(p, Predicate::Regex { case_insensitive: true, .. }));

    assert_eq!(
        single(cond("title", Operator::Regex, Some(json!("(")), true)),
        Predicate::always(false)
    );
}

#[test]
fn null_checks() {
    assert_eq!(
        single(cond("payload.owner", Operator::IsNotNull, None, true)),
        Predicate::IsNull {
            field: FieldRef::Document {
                column: "payload".into(),
                path: vec!["owner".into()],
            },
            negated: true,
        }
    );
}

#[test]
fn unknown_field_is_dropped_and_rest_compiles() {
    let node = Node::Group(
        Group::all(vec![
            cond("hostname", Operator::Eq, Some(json!("web-1")), true),
            cond("status", Operator::Eq, Some(json!("open")), true),
        ])
        .unwrap(),
    );
    let out = QueryCompiler::default().compile(&node);
    assert!(!out.is_complete());
    assert_eq!(out.dropped.len(), 1);
    assert_eq!(out.dropped[0].field, "hostname");
    // one survivor collapses to the bare comparison
    assert!(matches!(out.predicate, Some(Predicate::Compare { .. })));
}

#[test]
fn regex_dropped_without_engine_support() {
    let node = Node::Group(
        Group::any(vec![
            cond("title", Operator::Regex, Some(json!("oom")), true),
            cond("severity", Operator::Eq, Some(json!("high")), true),
            cond("source", Operator::Eq, Some(json!("k8s")), true),
        ])
        .unwrap(),
    );
    let out = QueryCompiler::default().without_regex().compile(&node);
    assert_eq!(out.dropped.len(), 1);
    assert_eq!(out.dropped[0].operator, Operator::Regex);
    match out.predicate {
        Some(Predicate::Or { items }) => assert_eq!(items.len(), 2),
        other => panic!("unexpected predicate: {other:?}"),
    }
}

#[test]
fn fully_dropped_tree_is_unconstrained() {
    let node = Node::Group(
        Group::all(vec![
            cond("hostname", Operator::Eq, Some(json!("a")), true),
            cond("payload.tags", Operator::Eq, Some(json!(["x"])), true),
        ])
        .unwrap(),
    );
    let out = QueryCompiler::default().compile(&node);
    assert!(out.predicate.is_none());
    assert_eq!(out.dropped.len(), 2);
}

#[test]
fn compile_filter_groups_and_rejects_malformed() {
    let filter = DynamicFilter::from_json(
        r#"{
            "filters": [{"field": "status", "operator": "eq", "value": "open"}],
            "filter_groups": [{
                "operator": "OR",
                "filters": [
                    {"field": "severity", "operator": "eq", "value": "high"},
                    {"field": "payload.score", "operator": "gt", "value": 7}
                ]
            }]
        }"#,
    )
    .unwrap();
    let out = QueryCompiler::default().compile_filter(&filter).unwrap();
    assert_eq!(out.predicate.as_ref().map(Predicate::leaf_count), Some(3));
    match out.predicate {
        Some(Predicate::And { items }) => {
            assert_eq!(items.len(), 2);
            assert!(matches!(items[1], Predicate::Or { .. }));
        }
        other => panic!("unexpected predicate: {other:?}"),
    }

    let empty = DynamicFilter::from_json("{}").unwrap();
    assert_eq!(QueryCompiler::default().compile_filter(&empty).unwrap(), CompiledFilter::default());

    let bad = DynamicFilter::from_json(r#"{"filters": [{"field": "status", "operator": "like", "value": 1}]}"#)
        .unwrap();
    assert!(matches!(
        QueryCompiler::default().compile_filter(&bad),
        Err(RuleError::UnknownOperator(_))
    ));
}
