//! Alert policy definitions.
//!
//! A policy pairs a condition (in the policy-rule wire format) with throttle
//! limits, an optional suppression key template, and the providers an alert
//! is routed to. Policies are usually loaded from YAML:
//!
//! ```yaml
//! - id: admin-login-failure
//!   name: Failed admin login
//!   throttle_minutes: 10
//!   max_alerts_per_hour: 5
//!   suppression_key: "{{ payload.user.name }}"
//!   providers: [slack]
//!   rules:
//!     - field: event_type
//!       operator: eq
//!       value: login
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use watchpost_rules::schema::parse_policy_rules;
use watchpost_rules::Node;

use crate::error::PolicyError;
use crate::throttle::ThrottleLimits;

fn default_true() -> bool {
    true
}

fn default_max_alerts_per_hour() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub id: String,
    pub name: String,
    /// `None` applies the policy to events of every tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// A single rule object, or a list combined per `match_all`.
    pub rules: Value,
    #[serde(default = "default_true")]
    pub match_all: bool,
    #[serde(default)]
    pub throttle_minutes: u32,
    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: u32,
    /// Minijinja template over the event; `None` means one key per policy.
    #[serde(default)]
    pub suppression_key: Option<String>,
    #[serde(default)]
    pub providers: Vec<String>,
}

impl Policy {
    /// Parse `rules` into the shared condition tree.
    pub fn condition(&self) -> Result<Node, PolicyError> {
        parse_policy_rules(&self.rules, self.match_all).map_err(|source| PolicyError::Rules {
            policy_id: self.id.clone(),
            source,
        })
    }

    pub fn limits(&self) -> ThrottleLimits {
        ThrottleLimits {
            throttle_minutes: self.throttle_minutes,
            max_alerts_per_hour: self.max_alerts_per_hour,
        }
    }

    /// Whether this policy watches events of `tenant_id`.
    pub fn applies_to(&self, tenant_id: Option<&str>) -> bool {
        match &self.tenant_id {
            None => true,
            Some(own) => tenant_id == Some(own.as_str()),
        }
    }
}

/// Parse a YAML list of policies. Ids must be non-empty and unique; rule
/// contents are checked later, per policy.
pub fn load_policies(yaml: &str) -> Result<Vec<Policy>, PolicyError> {
    let policies: Vec<Policy> = serde_yaml::from_str(yaml)?;
    let mut seen = HashSet::new();
    for policy in &policies {
        if policy.id.trim().is_empty() {
            return Err(PolicyError::Validation("policy id must not be empty".to_string()));
        }
        if !seen.insert(policy.id.as_str()) {
            return Err(PolicyError::Validation(format!("duplicate policy id '{}'", policy.id)));
        }
    }
    Ok(policies)
}
