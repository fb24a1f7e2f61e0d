//! Error types for condition parsing, validation, and evaluation.

/// Errors raised while building or parsing conditions.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Malformed condition or group (missing field, value rules, empty group).
    #[error("Validation error on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// Operator string outside the supported set.
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    /// Field path whose first segment names no known attribute.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// Operator or operand the compilation target cannot express.
    #[error("Unsupported '{operator}' on '{field}': {reason}")]
    Unsupported {
        field: String,
        operator: String,
        reason: String,
    },

    /// Policy rule with a `rule_type` other than `simple` or `compound`.
    #[error("Unknown rule_type '{0}'")]
    UnknownRuleType(String),

    /// JSON parse/deserialization error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RuleError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefix the offending field with its location in an enclosing document.
    pub(crate) fn at(self, prefix: &str) -> Self {
        match self {
            Self::Validation { field, message } => Self::Validation {
                field: format!("{prefix}.{field}"),
                message,
            },
            other => other,
        }
    }
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Failures during evaluation of an already-valid condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("invalid regex pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("rule rejected: {0}")]
    Rule(String),
}

impl From<RuleError> for EvalError {
    fn from(e: RuleError) -> Self {
        EvalError::Rule(e.to_string())
    }
}
