use crate::domain::feature::Type;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("Unsupported feature type: {feature_type}")]
    UnsupportedFeatureType { feature_type: Type },

    #[error("Null numeric features are not supported in counterfactuals (feature '{name}')")]
    NullNumericFeature { name: String },

    #[error("Invalid value for feature '{feature}': {reason}")]
    InvalidValue { feature: String, reason: String },

    #[error("Model invocation failed: {message}")]
    ModelFailure { message: String },

    #[error("Model returned {actual} outputs for a batch of {expected} inputs")]
    MalformedModelOutput { expected: usize, actual: usize },

    #[error("Explanation run was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ExplainError {
    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelFailure {
            message: message.into(),
        }
    }

    pub fn invalid_value(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// 依錯誤種類決定嚴重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Low,
            Self::ModelFailure { .. } | Self::MalformedModelOutput { .. } => ErrorSeverity::Medium,
            Self::UnsupportedFeatureType { .. }
            | Self::NullNumericFeature { .. }
            | Self::InvalidValue { .. }
            | Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::SerializationError(_) => ErrorSeverity::High,
            Self::IoError(_) | Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::UnsupportedFeatureType { .. } => {
                "Remove the domain from the feature or change its type to a searchable one"
            }
            Self::NullNumericFeature { .. } => "Provide a value for every numeric feature",
            Self::InvalidValue { .. } => "Check that proposed values match the feature type and domain",
            Self::ModelFailure { .. } | Self::MalformedModelOutput { .. } => {
                "Check that the model is reachable and returns one output per input"
            }
            Self::Cancelled => "Increase the timeout if the run was cancelled by a deadline",
            Self::IoError(_) => "Check that the file exists and is readable",
            Self::SerializationError(_) => "Check the JSON payload format",
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "Fix the configuration file and try again",
            Self::Internal { .. } => "Re-run with --verbose and report the log output",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExplainError>;
