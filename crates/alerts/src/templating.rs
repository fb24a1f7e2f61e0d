//! Suppression key rendering.
//!
//! A policy's `suppression_key` is a minijinja template evaluated against
//! the matched event, so one policy can keep separate suppression windows
//! per host, user, and so on. Event attributes are top-level template
//! variables (`{{ source }}`, `{{ payload.user.name }}`); the policy is
//! available as `policy.id` / `policy.name`.

use serde_json::Value;
use watchpost_core::Event;

use crate::error::PolicyError;
use crate::policy::Policy;

/// Key used when a policy has no suppression key template.
pub const DEFAULT_SUPPRESSION_KEY: &str = "default";

/// Renders suppression key templates.
#[derive(Debug, Default)]
pub struct SuppressionKeyRenderer {
    _private: (),
}

impl SuppressionKeyRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    // `lower`, `upper`, `default` and friends come with the "builtins" feature.
    fn build_env() -> minijinja::Environment<'static> {
        minijinja::Environment::new()
    }

    /// The suppression key for `policy` and `event`. Surrounding whitespace
    /// is trimmed; an empty result falls back to the default key.
    pub fn render(&self, policy: &Policy, event: &Event) -> Result<String, PolicyError> {
        let Some(template) = policy.suppression_key.as_deref() else {
            return Ok(DEFAULT_SUPPRESSION_KEY.to_string());
        };

        let mut ctx = match event.to_json() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        ctx.insert(
            "policy".to_string(),
            serde_json::json!({"id": policy.id, "name": policy.name}),
        );

        let rendered = Self::build_env()
            .render_str(template, Value::Object(ctx))
            .map_err(|e| PolicyError::Template {
                policy_id: policy.id.clone(),
                message: e.to_string(),
            })?;
        let key = rendered.trim();
        Ok(if key.is_empty() {
            DEFAULT_SUPPRESSION_KEY.to_string()
        } else {
            key.to_string()
        })
    }

    /// Check template syntax without rendering.
    pub fn validate(&self, policy: &Policy) -> Result<(), PolicyError> {
        if let Some(template) = policy.suppression_key.as_deref() {
            Self::build_env()
                .template_from_str(template)
                .map_err(|e| PolicyError::Template {
                    policy_id: policy.id.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}
