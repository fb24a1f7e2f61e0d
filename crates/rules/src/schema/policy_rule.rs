//! Policy rule wire format.
//!
//! ```json
//! {"rule_type": "simple", "field": "status", "operator": "eq", "value": "failed"}
//! {"rule_type": "compound", "group_operator": "OR", "conditions": [ ... ]}
//! ```
//!
//! Compound rules are single-level: every entry of `conditions` is a simple
//! condition. A policy may also carry a plain list of rules combined by its
//! `match_all` flag.

use serde_json::{Map, Value};

use super::condition::{Condition, Group, Node};
use super::operator::GroupOperator;
use crate::error::{Result, RuleError};

/// Parse one policy rule into the shared AST.
///
/// A missing `rule_type` is read as `simple`.
pub fn parse_policy_rule(raw: &Value) -> Result<Node> {
    let obj = raw
        .as_object()
        .ok_or_else(|| RuleError::validation("rule", "rule must be an object"))?;

    match rule_type(obj)? {
        "simple" => Condition::from_value(raw).map(Node::Condition),
        "compound" => parse_compound(obj).map(Node::Group),
        other => Err(RuleError::UnknownRuleType(other.to_string())),
    }
}

/// Parse a policy's `rules` field: either a single rule object or a list
/// of rules combined with AND (`match_all`) or OR.
pub fn parse_policy_rules(rules: &Value, match_all: bool) -> Result<Node> {
    match rules {
        Value::Array(list) => {
            let items = list
                .iter()
                .enumerate()
                .map(|(i, r)| parse_policy_rule(r).map_err(|e| e.at(&format!("rules[{i}]"))))
                .collect::<Result<Vec<_>>>()?;
            let operator = if match_all { GroupOperator::And } else { GroupOperator::Or };
            Group::new(operator, items)
                .map(Node::Group)
                .map_err(|e| e.at("rules"))
        }
        Value::Object(_) => parse_policy_rule(rules),
        _ => Err(RuleError::validation("rules", "rules must be an object or a list")),
    }
}

/// Encode an AST back into the policy rule wire format.
///
/// Only shapes the format can express are accepted: a single condition, or
/// a group whose items are all conditions.
pub fn to_policy_rule(node: &Node) -> Result<Value> {
    match node {
        Node::Condition(c) => {
            let mut value = c.to_value();
            if let Value::Object(obj) = &mut value {
                obj.insert("rule_type".into(), Value::String("simple".into()));
            }
            Ok(value)
        }
        Node::Group(g) => {
            let conditions = g
                .items()
                .iter()
                .map(|item| match item {
                    Node::Condition(c) => Ok(c.to_value()),
                    Node::Group(_) => Err(RuleError::validation(
                        "conditions",
                        "compound rules cannot contain nested groups",
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            let mut obj = Map::new();
            obj.insert("rule_type".into(), Value::String("compound".into()));
            obj.insert("group_operator".into(), Value::String(g.operator().as_str().into()));
            obj.insert("conditions".into(), Value::Array(conditions));
            Ok(Value::Object(obj))
        }
    }
}

fn rule_type(obj: &Map<String, Value>) -> Result<&str> {
    match obj.get("rule_type") {
        None | Some(Value::Null) => Ok("simple"),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(RuleError::UnknownRuleType(other.to_string())),
    }
}

fn parse_compound(obj: &Map<String, Value>) -> Result<Group> {
    let operator = match obj.get("group_operator") {
        None | Some(Value::Null) => GroupOperator::And,
        Some(Value::String(s)) => s.parse().map_err(|e: RuleError| match e {
            RuleError::Validation { message, .. } => RuleError::validation("group_operator", message),
            other => other,
        })?,
        Some(_) => {
            return Err(RuleError::validation("group_operator", "group_operator must be a string"))
        }
    };
    let raw_conditions = obj
        .get("conditions")
        .and_then(Value::as_array)
        .ok_or_else(|| RuleError::validation("conditions", "conditions must be a list"))?;
    if raw_conditions.is_empty() {
        return Err(RuleError::validation(
            "conditions",
            "compound rule must contain at least one condition",
        ));
    }

    let items = raw_conditions
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let path = format!("conditions[{i}]");
            let nested = raw.as_object().map(rule_type).transpose()?;
            match nested {
                Some("compound") => {
                    return Err(RuleError::validation(path, "compound rules cannot be nested"))
                }
                Some("simple") | None => {}
                Some(other) => return Err(RuleError::UnknownRuleType(other.to_string())),
            }
            if raw.get("conditions").is_some() {
                return Err(RuleError::validation(path, "compound rules cannot be nested"));
            }
            Condition::from_value(raw)
                .map(Node::Condition)
                .map_err(|e| e.at(&path))
        })
        .collect::<Result<Vec<_>>>()?;

    Group::new(operator, items)
}
