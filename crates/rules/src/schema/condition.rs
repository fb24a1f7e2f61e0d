//! The condition AST: leaf conditions and AND/OR groups.
//!
//! Both front-ends (policy rules and dynamic filters) produce these types,
//! and both the evaluator and the query compiler consume them. Values are
//! validated on construction and immutable afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::operator::{GroupOperator, Operator};
use crate::error::{Result, RuleError};

/// A single `field operator value` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Condition {
    field: String,
    operator: Operator,
    value: Option<Value>,
    case_sensitive: bool,
}

impl Condition {
    /// Build a validated condition.
    ///
    /// A JSON `null` value counts as "no value".
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: Option<Value>,
        case_sensitive: bool,
    ) -> Result<Self> {
        let field = field.into();
        if field.trim().is_empty() {
            return Err(RuleError::validation("field", "field must not be empty"));
        }
        let value = value.filter(|v| !v.is_null());
        match (operator.takes_value(), &value) {
            (true, None) => {
                return Err(RuleError::validation(
                    "value",
                    format!("operator '{operator}' requires a value"),
                ))
            }
            (false, Some(_)) => {
                return Err(RuleError::validation(
                    "value",
                    format!("operator '{operator}' does not accept a value"),
                ))
            }
            _ => {}
        }
        Ok(Self {
            field,
            operator,
            value,
            case_sensitive,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The rule value; always `Some` unless the operator is a nullity test.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Parse the `{field, operator, value, case_sensitive}` wire object.
    pub fn from_value(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| RuleError::validation("condition", "condition must be an object"))?;

        let field = obj
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::validation("field", "field must be a string"))?;
        let operator: Operator = obj
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::validation("operator", "operator must be a string"))?
            .parse()?;
        let case_sensitive = match obj.get("case_sensitive") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(RuleError::validation(
                    "case_sensitive",
                    "case_sensitive must be a boolean",
                ))
            }
        };

        Self::new(field, operator, obj.get("value").cloned(), case_sensitive)
    }

    /// Encode back to the wire object.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("field".into(), Value::String(self.field.clone()));
        obj.insert("operator".into(), Value::String(self.operator.as_str().into()));
        if let Some(v) = &self.value {
            obj.insert("value".into(), v.clone());
        }
        obj.insert("case_sensitive".into(), Value::Bool(self.case_sensitive));
        Value::Object(obj)
    }
}

impl TryFrom<Value> for Condition {
    type Error = RuleError;

    fn try_from(raw: Value) -> Result<Self> {
        Self::from_value(&raw)
    }
}

impl From<Condition> for Value {
    fn from(c: Condition) -> Self {
        c.to_value()
    }
}

/// An AND/OR combination of conditions and nested groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Group {
    operator: GroupOperator,
    items: Vec<Node>,
}

impl Group {
    pub fn new(operator: GroupOperator, items: Vec<Node>) -> Result<Self> {
        if items.is_empty() {
            return Err(RuleError::validation("items", "group must contain at least one item"));
        }
        Ok(Self { operator, items })
    }

    pub fn all(items: Vec<Node>) -> Result<Self> {
        Self::new(GroupOperator::And, items)
    }

    pub fn any(items: Vec<Node>) -> Result<Self> {
        Self::new(GroupOperator::Or, items)
    }

    pub fn operator(&self) -> GroupOperator {
        self.operator
    }

    pub fn items(&self) -> &[Node] {
        &self.items
    }

    /// Parse `{operator: "AND"|"OR", items: [...]}`. A missing operator means AND.
    pub fn from_value(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| RuleError::validation("group", "group must be an object"))?;

        let operator = match obj.get("operator") {
            None | Some(Value::Null) => GroupOperator::And,
            Some(Value::String(s)) => s.parse()?,
            Some(_) => return Err(RuleError::validation("operator", "operator must be a string")),
        };
        let raw_items = obj
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| RuleError::validation("items", "items must be a list"))?;

        let items = raw_items
            .iter()
            .enumerate()
            .map(|(i, item)| Node::from_value(item).map_err(|e| e.at(&format!("items[{i}]"))))
            .collect::<Result<Vec<_>>>()?;

        Self::new(operator, items)
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("operator".into(), Value::String(self.operator.as_str().into()));
        obj.insert(
            "items".into(),
            Value::Array(self.items.iter().map(Node::to_value).collect()),
        );
        Value::Object(obj)
    }
}

impl TryFrom<Value> for Group {
    type Error = RuleError;

    fn try_from(raw: Value) -> Result<Self> {
        Self::from_value(&raw)
    }
}

impl From<Group> for Value {
    fn from(g: Group) -> Self {
        g.to_value()
    }
}

/// Either a leaf condition or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Node {
    Condition(Condition),
    Group(Group),
}

impl Node {
    /// Objects carrying `items` are groups; everything else is a condition.
    pub fn from_value(raw: &Value) -> Result<Self> {
        if raw.get("items").is_some() {
            Group::from_value(raw).map(Node::Group)
        } else {
            Condition::from_value(raw).map(Node::Condition)
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Node::Condition(c) => c.to_value(),
            Node::Group(g) => g.to_value(),
        }
    }

    /// Visit every leaf condition, depth-first.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        collect_conditions(self, &mut out);
        out
    }
}

fn collect_conditions<'a>(node: &'a Node, out: &mut Vec<&'a Condition>) {
    match node {
        Node::Condition(c) => out.push(c),
        Node::Group(g) => g.items.iter().for_each(|n| collect_conditions(n, out)),
    }
}

impl From<Condition> for Node {
    fn from(c: Condition) -> Self {
        Node::Condition(c)
    }
}

impl From<Group> for Node {
    fn from(g: Group) -> Self {
        Node::Group(g)
    }
}

impl TryFrom<Value> for Node {
    type Error = RuleError;

    fn try_from(raw: Value) -> Result<Self> {
        Self::from_value(&raw)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        n.to_value()
    }
}
