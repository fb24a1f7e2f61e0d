//! Condition AST and its wire-format front-ends.
//!
//! - `Condition` / `Group` / `Node`: the shared, validated AST
//! - `policy_rule`: `simple` / `compound` rules attached to alert policies
//! - `dynamic_filter`: flat filters and filter groups from search requests
//!
//! Both front-ends converge on the same AST before any evaluation or
//! compilation happens.

mod condition;
pub mod dynamic_filter;
mod operator;
pub mod policy_rule;

pub use condition::*;
pub use dynamic_filter::{DynamicFilter, FilterGroup};
pub use operator::*;
pub use policy_rule::{parse_policy_rule, parse_policy_rules, to_policy_rule};
