//! Per-operator comparison semantics for in-memory evaluation.

use serde_json::Value;

use super::pattern::PatternCache;
use crate::error::EvalError;
use crate::schema::{Condition, Operator};

/// Apply `condition` to an already-resolved field value (`None` = absent).
pub(super) fn apply(
    condition: &Condition,
    field: Option<&Value>,
    patterns: &PatternCache,
) -> Result<bool, EvalError> {
    let cs = condition.case_sensitive();
    let value = condition.value();

    let outcome = match (condition.operator(), value) {
        (Operator::IsNull, _) => field.is_none(),
        (Operator::IsNotNull, _) => field.is_some(),
        // Construction guarantees a value for every other operator.
        (_, None) => false,
        (Operator::Eq, Some(v)) => equals(field, v, cs),
        (Operator::Ne, Some(v)) => !equals(field, v, cs),
        (Operator::Gt, Some(v)) => numeric(field, v, |a, b| a > b),
        (Operator::Gte, Some(v)) => numeric(field, v, |a, b| a >= b),
        (Operator::Lt, Some(v)) => numeric(field, v, |a, b| a < b),
        (Operator::Lte, Some(v)) => numeric(field, v, |a, b| a <= b),
        (Operator::In, Some(v)) => member(field, v, cs),
        (Operator::NotIn, Some(v)) => !member(field, v, cs),
        (Operator::Contains, Some(v)) => text(field, v, cs, |h, n| h.contains(n)),
        (Operator::NotContains, Some(v)) => text(field, v, cs, |h, n| !h.contains(n)),
        (Operator::StartsWith, Some(v)) => text(field, v, cs, |h, n| h.starts_with(n)),
        (Operator::EndsWith, Some(v)) => text(field, v, cs, |h, n| h.ends_with(n)),
        (Operator::Regex, Some(v)) => match (field.and_then(Value::as_str), v.as_str()) {
            (Some(haystack), Some(pat)) => patterns.get(pat, cs)?.is_match(haystack),
            _ => false,
        },
    };
    Ok(outcome)
}

/// Equality. An absent field never equals anything.
pub(crate) fn equals(field: Option<&Value>, v: &Value, cs: bool) -> bool {
    let Some(f) = field else {
        return false;
    };
    match (f, v) {
        (Value::String(a), Value::String(b)) if !cs => a.to_lowercase() == b.to_lowercase(),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => f == v,
    }
}

/// List membership; a non-list `v` degrades to equality.
///
/// Case-insensitive membership stringifies the field and every element, so
/// `404` and `404.0` do not match each other in that mode.
fn member(field: Option<&Value>, v: &Value, cs: bool) -> bool {
    let Value::Array(items) = v else {
        return equals(field, v, cs);
    };
    let Some(f) = field else {
        return false;
    };
    if cs {
        items.iter().any(|item| equals(Some(f), item, true))
    } else {
        let needle = stringify(f).to_lowercase();
        items.iter().any(|item| stringify(item).to_lowercase() == needle)
    }
}

pub(crate) fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce to f64: numbers and numeric strings. Anything else fails.
pub(crate) fn to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn numeric(field: Option<&Value>, v: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (field.and_then(to_f64), to_f64(v)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// String-only operators: both sides must be strings.
fn text(field: Option<&Value>, v: &Value, cs: bool, test: impl Fn(&str, &str) -> bool) -> bool {
    match (field.and_then(Value::as_str), v.as_str()) {
        (Some(haystack), Some(needle)) if cs => test(haystack, needle),
        (Some(haystack), Some(needle)) => test(&haystack.to_lowercase(), &needle.to_lowercase()),
        _ => false,
    }
}
