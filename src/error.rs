//! Structured error types for registration, loading and resolution.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Registration errors
    InvalidName,
    RepeatRegister,
    NoModuleFound,
    AttrName,

    // Resolution errors
    KeyNotFound,
    CircularReference,
    ParserConfigRepeat,
    MergeConflict,
    InvalidConfig,
    Expression,
    RecursionLimit,

    // Validation errors
    ValueMissing,
    ValueType,
    ValueOutOfRange,
    ValueValidate,
    UnknownField,

    // Input errors
    Io,
    Parse,
}

/// Every failure the engine can report. Nothing is retried or partially recovered.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid identifier, or a set of fragments whose bases never became available.
    #[error("{0}")]
    Name(String),

    #[error("module '{0}' is already registered")]
    RepeatRegister(String),

    #[error("{0}")]
    NoModuleFound(String),

    /// A field name collides with a reserved keyword.
    #[error("'{0}' is a reserved name and cannot be used as a field name")]
    AttrName(String),

    #[error("{0}")]
    KeyNotFound(String),

    #[error("the config references form a cycle, unresolved: {0}")]
    CircularReference(String),

    /// Two expanded configs are structurally identical.
    #[error("found {count} repeated configs after expansion:\n{rendered}")]
    ParserConfigRepeat { count: usize, rendered: String },

    /// Map vs scalar at the same key while merging a fragment over its base.
    #[error("cannot merge '{path}': the base is {base_kind} but the override is {override_kind}")]
    MergeConflict {
        path: String,
        base_kind: &'static str,
        override_kind: &'static str,
    },

    /// Structural misuse of the config language (ValueError-class).
    #[error("{0}")]
    InvalidConfig(String),

    #[error("expression error: {0}")]
    Expression(String),

    #[error("resolution exceeded the maximum depth of {0}, check for circular '_base' chains")]
    RecursionLimit(usize),

    #[error("required value '{path}' marked as missing was not provided in config:\n{rendered}")]
    ValueMissing { path: String, rendered: String },

    #[error("{field}: {message}")]
    ValueType { field: String, message: String },

    #[error("{field}: {message}")]
    ValueOutOfRange { field: String, message: String },

    #[error("{field}: {message}")]
    ValueValidate { field: String, message: String },

    #[error("'{field}' is not a field of {module}")]
    UnknownField { module: String, field: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::Name(_) => ErrorCode::InvalidName,
            ConfigError::RepeatRegister(_) => ErrorCode::RepeatRegister,
            ConfigError::NoModuleFound(_) => ErrorCode::NoModuleFound,
            ConfigError::AttrName(_) => ErrorCode::AttrName,
            ConfigError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            ConfigError::CircularReference(_) => ErrorCode::CircularReference,
            ConfigError::ParserConfigRepeat { .. } => ErrorCode::ParserConfigRepeat,
            ConfigError::MergeConflict { .. } => ErrorCode::MergeConflict,
            ConfigError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            ConfigError::Expression(_) => ErrorCode::Expression,
            ConfigError::RecursionLimit(_) => ErrorCode::RecursionLimit,
            ConfigError::ValueMissing { .. } => ErrorCode::ValueMissing,
            ConfigError::ValueType { .. } => ErrorCode::ValueType,
            ConfigError::ValueOutOfRange { .. } => ErrorCode::ValueOutOfRange,
            ConfigError::ValueValidate { .. } => ErrorCode::ValueValidate,
            ConfigError::UnknownField { .. } => ErrorCode::UnknownField,
            ConfigError::Io { .. } => ErrorCode::Io,
            ConfigError::Parse { .. } => ErrorCode::Parse,
        }
    }

    // Convenience constructors

    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::InvalidConfig(message.into())
    }

    pub fn key_not_found(message: impl Into<String>) -> Self {
        ConfigError::KeyNotFound(message.into())
    }

    pub fn expression(message: impl Into<String>) -> Self {
        ConfigError::Expression(message.into())
    }

    pub fn value_type(field: &str, message: impl Into<String>) -> Self {
        ConfigError::ValueType {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn out_of_range(field: &str, message: impl Into<String>) -> Self {
        ConfigError::ValueOutOfRange {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn validate(field: &str, message: impl Into<String>) -> Self {
        ConfigError::ValueValidate {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Prefix a message-carrying error with the module it was raised in.
    pub fn within(self, context: &str) -> Self {
        match self {
            ConfigError::InvalidConfig(msg) => {
                ConfigError::InvalidConfig(format!("in {}: {}", context, msg))
            }
            ConfigError::KeyNotFound(msg) => {
                ConfigError::KeyNotFound(format!("in {}: {}", context, msg))
            }
            ConfigError::Expression(msg) => {
                ConfigError::Expression(format!("in {}: {}", context, msg))
            }
            other => other,
        }
    }
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_serialize_screaming_snake() {
        let code = ConfigError::RepeatRegister("model@a".into()).code();
        assert_eq!(
            serde_json::to_value(code).unwrap(),
            serde_json::json!("REPEAT_REGISTER")
        );
        let code = ConfigError::CircularReference("a".into()).code();
        assert_eq!(
            serde_json::to_value(code).unwrap(),
            serde_json::json!("CIRCULAR_REFERENCE")
        );
    }

    #[test]
    fn test_within_adds_context() {
        let err = ConfigError::key_not_found("no 'x'").within("model@a");
        assert_eq!(err.to_string(), "in model@a: no 'x'");

        // Errors with structured fields are left untouched
        let err = ConfigError::value_type("x", "not an int").within("model@a");
        assert_eq!(err.to_string(), "x: not an int");
    }
}
