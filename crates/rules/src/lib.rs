//! Condition engine shared by alert policies and event search.
//!
//! This crate provides:
//! - A single condition AST (`Condition`, `Group`, `Node`) with two wire
//!   front-ends: policy rules (`simple`/`compound`) and dynamic filters
//! - Dot-path field resolution over scalar and document attributes
//! - A fail-closed in-memory `Evaluator`
//! - A `QueryCompiler` lowering the same AST to a storage `Predicate`,
//!   plus a PostgreSQL renderer

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod resolver;
pub mod schema;

pub use compiler::{CompiledFilter, DroppedCondition, Predicate, QueryCompiler};
pub use error::{EvalError, Result, RuleError};
pub use evaluator::{Evaluator, Verdict};
pub use resolver::{AttributeKind, FieldCatalog};
pub use schema::{Condition, Group, GroupOperator, Node, Operator};
