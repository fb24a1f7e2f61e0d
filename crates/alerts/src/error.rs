//! Error types for throttling, policy loading, and alert delivery.

use watchpost_rules::RuleError;

/// Errors from the throttle/suppression store.
#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    #[error("Throttle store database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Throttle store migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Throttle store call timed out after {0}ms")]
    Timeout(u64),

    #[error("Throttle store unavailable: {0}")]
    Unavailable(String),

    /// Suppression window that does not end in the future.
    #[error("Invalid suppression window: {0}")]
    InvalidWindow(String),
}

/// Errors raised while loading or preparing a policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Policy '{policy_id}' has invalid rules: {source}")]
    Rules {
        policy_id: String,
        #[source]
        source: RuleError,
    },

    #[error("Policy '{policy_id}' has an invalid suppression key template: {message}")]
    Template { policy_id: String, message: String },

    #[error("Invalid policy: {0}")]
    Validation(String),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors from handing an alert signal to the delivery collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Alert sink closed")]
    Closed,

    #[error("Alert delivery failed: {0}")]
    Failed(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
