//! Lowers condition trees into storage [`Predicate`]s.
//!
//! The lowering mirrors the evaluator's operator semantics as closely as a
//! SQL-style engine allows. Conditions that cannot be lowered (unknown
//! field, unsupported operator or operand) are dropped with a warning
//! instead of failing the whole compilation, and reported in
//! [`CompiledFilter::dropped`].

pub mod postgres;
mod predicate;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, RuleError};
use crate::evaluator::pattern;
use crate::evaluator::{stringify, to_f64};
use crate::resolver::FieldCatalog;
use crate::schema::{Condition, DynamicFilter, GroupOperator, Node, Operator};

pub use predicate::{escape_like, Cast, CompareOp, FieldRef, Predicate};

/// A condition left out of the compiled predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedCondition {
    pub field: String,
    pub operator: Operator,
    pub reason: String,
}

/// Compilation output. `predicate` is `None` when nothing constrains the
/// search (no conditions, or every condition was dropped).
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CompiledFilter {
    pub predicate: Option<Predicate>,
    pub dropped: Vec<DroppedCondition>,
}

impl CompiledFilter {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Compiles condition trees for a storage engine described by its catalog
/// and capabilities.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    catalog: FieldCatalog,
    supports_regex: bool,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(FieldCatalog::default())
    }
}

impl QueryCompiler {
    pub fn new(catalog: FieldCatalog) -> Self {
        Self {
            catalog,
            supports_regex: true,
        }
    }

    /// Target engine has no native regex operator; regex conditions are dropped.
    pub fn without_regex(mut self) -> Self {
        self.supports_regex = false;
        self
    }

    /// Compile a condition tree. Never fails.
    pub fn compile(&self, node: &Node) -> CompiledFilter {
        let mut dropped = Vec::new();
        let predicate = self.lower_node(node, &mut dropped);
        CompiledFilter { predicate, dropped }
    }

    /// Parse and compile a search request filter. Malformed filters are
    /// validation errors; only lowering problems are dropped.
    pub fn compile_filter(&self, filter: &DynamicFilter) -> Result<CompiledFilter> {
        Ok(match filter.to_node()? {
            Some(node) => self.compile(&node),
            None => CompiledFilter::default(),
        })
    }

    fn lower_node(&self, node: &Node, dropped: &mut Vec<DroppedCondition>) -> Option<Predicate> {
        match node {
            Node::Condition(c) => match self.lower_condition(c) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(
                        field = c.field(),
                        operator = %c.operator(),
                        error = %e,
                        "dropping condition from compiled predicate"
                    );
                    dropped.push(DroppedCondition {
                        field: c.field().to_string(),
                        operator: c.operator(),
                        reason: e.to_string(),
                    });
                    None
                }
            },
            Node::Group(g) => {
                let mut items: Vec<Predicate> = g
                    .items()
                    .iter()
                    .filter_map(|item| self.lower_node(item, dropped))
                    .collect();
                match items.len() {
                    0 => None,
                    1 => items.pop(),
                    _ => Some(match g.operator() {
                        GroupOperator::And => Predicate::And { items },
                        GroupOperator::Or => Predicate::Or { items },
                    }),
                }
            }
        }
    }

    fn lower_condition(&self, c: &Condition) -> Result<Predicate> {
        let field = self.catalog.field_ref(c.field())?;
        let cs = c.case_sensitive();

        let need = || {
            c.value().ok_or_else(|| {
                RuleError::validation("value", format!("operator '{}' requires a value", c.operator()))
            })
        };

        match c.operator() {
            Operator::IsNull => Ok(Predicate::IsNull { field, negated: false }),
            Operator::IsNotNull => Ok(Predicate::IsNull { field, negated: true }),
            Operator::Eq => lower_equality(c, field, need()?, CompareOp::Eq),
            Operator::Ne => lower_equality(c, field, need()?, CompareOp::Ne),
            Operator::Gt => Ok(lower_ordering(field, need()?, CompareOp::Gt)),
            Operator::Gte => Ok(lower_ordering(field, need()?, CompareOp::Gte)),
            Operator::Lt => Ok(lower_ordering(field, need()?, CompareOp::Lt)),
            Operator::Lte => Ok(lower_ordering(field, need()?, CompareOp::Lte)),
            Operator::In | Operator::NotIn => {
                let negated = c.operator() == Operator::NotIn;
                match need()? {
                    Value::Array(items) => Ok(lower_set(field, items, cs, negated)),
                    scalar => {
                        let op = if negated { CompareOp::Ne } else { CompareOp::Eq };
                        lower_equality(c, field, scalar, op)
                    }
                }
            }
            Operator::Contains => Ok(lower_like(field, need()?, cs, false, |s| format!("%{s}%"))),
            Operator::NotContains => Ok(lower_like(field, need()?, cs, true, |s| format!("%{s}%"))),
            Operator::StartsWith => Ok(lower_like(field, need()?, cs, false, |s| format!("{s}%"))),
            Operator::EndsWith => Ok(lower_like(field, need()?, cs, false, |s| format!("%{s}"))),
            Operator::Regex => self.lower_regex(c, field, need()?),
        }
    }

    fn lower_regex(&self, c: &Condition, field: FieldRef, value: &Value) -> Result<Predicate> {
        if !self.supports_regex {
            return Err(unsupported(c, "target engine has no regex operator"));
        }
        let Some(pat) = value.as_str() else {
            return Ok(Predicate::always(false));
        };
        // Patterns the evaluator rejects never match there; keep that here.
        if pattern::compile(pat, c.case_sensitive()).is_err() {
            return Ok(Predicate::always(false));
        }
        Ok(Predicate::Regex {
            field,
            pattern: pat.to_string(),
            case_insensitive: !c.case_sensitive(),
        })
    }
}

fn unsupported(c: &Condition, reason: &str) -> RuleError {
    RuleError::Unsupported {
        field: c.field().to_string(),
        operator: c.operator().to_string(),
        reason: reason.to_string(),
    }
}

/// Equality on strings, numbers, and booleans. Document extractions are
/// compared as text against string literals.
fn lower_equality(c: &Condition, field: FieldRef, value: &Value, op: CompareOp) -> Result<Predicate> {
    let doc = field.is_document();
    let (value, cast, case_insensitive) = match value {
        Value::String(_) => (value.clone(), if doc { Cast::Text } else { Cast::None }, !c.case_sensitive()),
        Value::Number(_) => (value.clone(), if doc { Cast::Numeric } else { Cast::None }, false),
        Value::Bool(b) if doc => (Value::String(b.to_string()), Cast::Text, false),
        Value::Bool(_) => (value.clone(), Cast::None, false),
        _ => return Err(unsupported(c, "equality needs a string, number, or boolean literal")),
    };
    Ok(Predicate::Compare {
        field,
        op,
        value,
        cast,
        case_insensitive,
    })
}

/// Ordering comparisons are numeric on both sides; a literal that is not a
/// number can never match.
fn lower_ordering(field: FieldRef, value: &Value, op: CompareOp) -> Predicate {
    match to_f64(value).and_then(serde_json::Number::from_f64) {
        Some(n) => Predicate::Compare {
            field,
            op,
            value: Value::Number(n),
            cast: Cast::Numeric,
            case_insensitive: false,
        },
        None => Predicate::always(false),
    }
}

/// Set membership. Case-insensitive sets compare folded text. Otherwise a
/// list of numbers compares numerically, plain columns keep a list of
/// strings as-is, and anything else falls back to text.
fn lower_set(field: FieldRef, items: &[Value], cs: bool, negated: bool) -> Predicate {
    if items.is_empty() {
        return Predicate::always(negated);
    }
    let (values, cast) = if !cs {
        let folded = items
            .iter()
            .map(|v| Value::String(stringify(v).to_lowercase()))
            .collect();
        (folded, Cast::Text)
    } else if items.iter().all(Value::is_number) {
        let cast = if field.is_document() { Cast::Numeric } else { Cast::None };
        (items.to_vec(), cast)
    } else if !field.is_document() && items.iter().all(Value::is_string) {
        (items.to_vec(), Cast::None)
    } else {
        let text = items.iter().map(|v| Value::String(stringify(v))).collect();
        (text, Cast::Text)
    };
    Predicate::InSet {
        field,
        values,
        cast,
        case_insensitive: !cs,
        negated,
    }
}

fn lower_like(
    field: FieldRef,
    value: &Value,
    cs: bool,
    negated: bool,
    shape: impl Fn(&str) -> String,
) -> Predicate {
    match value.as_str() {
        Some(s) => Predicate::Like {
            field,
            pattern: shape(&escape_like(s)),
            case_insensitive: !cs,
            negated,
        },
        None => Predicate::always(false),
    }
}

#[cfg(test)]
mod tests;
