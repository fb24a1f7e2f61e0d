//! In-memory condition evaluation against a single record.
//!
//! Evaluation is pure and synchronous. Every outcome is a [`Verdict`]; the
//! caller decides what an error means, and [`Evaluator::evaluate`] treats
//! errors as a non-match so that internal faults never produce a match.

mod operators;
pub(crate) mod pattern;

use serde_json::Value;
use tracing::{debug, warn};
use watchpost_core::Record;

use crate::error::EvalError;
use crate::resolver::FieldCatalog;
use crate::schema::{parse_policy_rule, Condition, Group, GroupOperator, Node};

pub use pattern::{MAX_PATTERN_LEN, PATTERN_CACHE_SIZE};
use pattern::PatternCache;

/// Outcome of evaluating a condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Match,
    NoMatch,
    Error(EvalError),
}

impl Verdict {
    /// Only an explicit match counts; errors are non-matches.
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }

    fn from_bool(b: bool) -> Self {
        if b {
            Verdict::Match
        } else {
            Verdict::NoMatch
        }
    }
}

/// Evaluates condition trees against records described by a [`FieldCatalog`].
///
/// Regex conditions are compiled once per distinct pattern and shared by
/// clones of the evaluator.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    catalog: FieldCatalog,
    patterns: PatternCache,
}

impl Evaluator {
    pub fn new(catalog: FieldCatalog) -> Self {
        Self {
            catalog,
            patterns: PatternCache::default(),
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Evaluate and collapse to a boolean, logging any error.
    pub fn evaluate<R>(&self, node: &Node, record: &R) -> bool
    where
        R: Record + ?Sized,
    {
        match self.evaluate_node(node, record) {
            Verdict::Match => true,
            Verdict::NoMatch => false,
            Verdict::Error(e) => {
                warn!(error = %e, "condition evaluation failed, treating as no match");
                false
            }
        }
    }

    /// Evaluate a node, keeping errors distinct from non-matches.
    ///
    /// AND stops at the first non-match; an error in an AND group yields
    /// an error unless some other item is a definite non-match. OR matches
    /// if any item matches, erroring items notwithstanding.
    pub fn evaluate_node<R>(&self, node: &Node, record: &R) -> Verdict
    where
        R: Record + ?Sized,
    {
        match node {
            Node::Condition(c) => self.evaluate_condition(c, record),
            Node::Group(g) => self.evaluate_group(g, record),
        }
    }

    /// Parse a raw policy rule and evaluate it. Unknown `rule_type`s and
    /// malformed rules come back as [`Verdict::Error`].
    pub fn evaluate_policy_rule<R>(&self, raw: &Value, record: &R) -> Verdict
    where
        R: Record + ?Sized,
    {
        match parse_policy_rule(raw) {
            Ok(node) => self.evaluate_node(&node, record),
            Err(e) => {
                debug!(error = %e, "policy rule rejected");
                Verdict::Error(e.into())
            }
        }
    }

    fn evaluate_group<R>(&self, group: &Group, record: &R) -> Verdict
    where
        R: Record + ?Sized,
    {
        let mut first_error = None;
        for item in group.items() {
            match (group.operator(), self.evaluate_node(item, record)) {
                (GroupOperator::And, Verdict::NoMatch) => return Verdict::NoMatch,
                (GroupOperator::Or, Verdict::Match) => return Verdict::Match,
                (_, Verdict::Error(e)) => {
                    first_error.get_or_insert(e);
                }
                _ => {}
            }
        }
        match (first_error, group.operator()) {
            (Some(e), _) => Verdict::Error(e),
            (None, GroupOperator::And) => Verdict::Match,
            (None, GroupOperator::Or) => Verdict::NoMatch,
        }
    }

    fn evaluate_condition<R>(&self, condition: &Condition, record: &R) -> Verdict
    where
        R: Record + ?Sized,
    {
        let resolved = self.catalog.resolve(record, condition.field());
        match operators::apply(condition, resolved.as_deref(), &self.patterns) {
            Ok(b) => Verdict::from_bool(b),
            Err(e) => {
                debug!(
                    field = condition.field(),
                    operator = %condition.operator(),
                    error = %e,
                    "condition raised during evaluation"
                );
                Verdict::Error(e)
            }
        }
    }
}

pub(crate) use operators::{stringify, to_f64};
