//! Dynamic search filter wire format.
//!
//! A search request carries a flat `filters` list (AND-combined) and/or a
//! list of `filter_groups`, each `{filters: [...], operator: "AND"|"OR"}`.
//! Groups are AND-combined with each other and with the flat filters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::condition::{Condition, Group, Node};
use super::operator::GroupOperator;
use crate::error::{Result, RuleError};

/// Filter section of a search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DynamicFilter {
    #[serde(default)]
    pub filters: Vec<Value>,
    #[serde(default)]
    pub filter_groups: Vec<FilterGroup>,
}

/// One `{filters, operator}` group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterGroup {
    #[serde(default)]
    pub filters: Vec<Value>,
    #[serde(default = "default_group_operator")]
    pub operator: String,
}

fn default_group_operator() -> String {
    "AND".to_string()
}

impl DynamicFilter {
    /// Parse from a JSON request fragment.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Lower to the shared AST. `None` means "no filtering requested".
    ///
    /// Filter groups with no filters are skipped. A lone group is returned
    /// as-is rather than wrapped in a single-item AND.
    pub fn to_node(&self) -> Result<Option<Node>> {
        let mut items = self
            .filters
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                Condition::from_value(raw)
                    .map(Node::Condition)
                    .map_err(|e| e.at(&format!("filters[{i}]")))
            })
            .collect::<Result<Vec<_>>>()?;

        for (i, group) in self.filter_groups.iter().enumerate() {
            let path = format!("filter_groups[{i}]");
            if group.filters.is_empty() {
                debug!(group = i, "skipping empty filter group");
                continue;
            }
            let operator: GroupOperator = group.operator.parse().map_err(|e: RuleError| e.at(&path))?;
            let conditions = group
                .filters
                .iter()
                .enumerate()
                .map(|(j, raw)| {
                    Condition::from_value(raw)
                        .map(Node::Condition)
                        .map_err(|e| e.at(&format!("{path}.filters[{j}]")))
                })
                .collect::<Result<Vec<_>>>()?;
            items.push(Node::Group(Group::new(operator, conditions)?));
        }

        Ok(match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Node::Group(Group::all(items)?)),
        })
    }
}

/// Lower a flat filter list (AND-combined).
pub fn parse_filter_list(filters: &[Value]) -> Result<Option<Node>> {
    DynamicFilter {
        filters: filters.to_vec(),
        filter_groups: Vec::new(),
    }
    .to_node()
}
