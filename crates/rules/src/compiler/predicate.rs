//! Backend-neutral predicate tree handed to the storage layer.

use serde::Serialize;
use serde_json::Value;

/// Reference to a stored field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRef {
    /// A plain column.
    Column(String),
    /// A key path extracted from a document column.
    Document { column: String, path: Vec<String> },
}

impl FieldRef {
    pub fn is_document(&self) -> bool {
        matches!(self, FieldRef::Document { .. })
    }
}

/// How the field is cast before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Cast {
    #[default]
    None,
    /// Compare as text (document extractions, stringified literals).
    Text,
    /// Compare as a number; values that do not parse compare as NULL.
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    /// Null-safe: an absent field is "not equal" to any literal.
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    And {
        items: Vec<Predicate>,
    },
    Or {
        items: Vec<Predicate>,
    },
    Compare {
        field: FieldRef,
        op: CompareOp,
        value: Value,
        cast: Cast,
        case_insensitive: bool,
    },
    /// SQL-style `LIKE` pattern with `%`/`_` wildcards and `\` escapes.
    Like {
        field: FieldRef,
        pattern: String,
        case_insensitive: bool,
        negated: bool,
    },
    /// Set membership. A negated set also admits absent fields.
    InSet {
        field: FieldRef,
        values: Vec<Value>,
        cast: Cast,
        case_insensitive: bool,
        negated: bool,
    },
    Regex {
        field: FieldRef,
        pattern: String,
        case_insensitive: bool,
    },
    IsNull {
        field: FieldRef,
        negated: bool,
    },
    Const {
        value: bool,
    },
}

impl Predicate {
    pub fn always(value: bool) -> Self {
        Predicate::Const { value }
    }

    /// Number of leaf predicates in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Predicate::And { items } | Predicate::Or { items } => {
                items.iter().map(Predicate::leaf_count).sum()
            }
            _ => 1,
        }
    }
}

/// Escape `%`, `_` and `\` so `literal` matches itself inside a LIKE pattern.
pub fn escape_like(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
