// src/error.rs
//! Unified error handling for the channel selection pipeline
//!
//! Every component reports failures through [`EmgError`]. Each variant carries an
//! [`ErrorContext`] naming the component and operation that failed so that a
//! request can be terminated with a message that points at the offending stage.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the channel selection pipeline
#[derive(Debug, Clone, Error)]
pub enum EmgError {
    /// Missing or inconsistent request/configuration parameters
    #[error("[CONFIG] Configuration error in {component}: {reason} ({})", .context.operation)]
    Configuration {
        component: String,
        reason: String,
        context: ErrorContext,
    },

    /// Input data that cannot be processed (empty classes, short trials, ...)
    #[error("{}", format_invalid_data(.data_type, .reason, .expected, .actual, .context))]
    InvalidData {
        data_type: String,
        reason: String,
        expected: Option<String>,
        actual: Option<String>,
        context: ErrorContext,
    },

    /// Numerical breakdown inside a processing stage
    #[error("[PROCESSING] {stage:?} stage error: {reason} ({})", .context.operation)]
    Processing {
        stage: ProcessingStage,
        reason: String,
        context: ErrorContext,
    },

    /// Failure of a classifier, cross-validation or importance capability
    #[error("[CAPABILITY] {capability} error: {reason} ({})", .context.operation)]
    Capability {
        capability: Capability,
        reason: String,
        context: ErrorContext,
    },

    /// Filesystem errors while reading datasets or configuration
    #[error("[IO] {path}: {reason}")]
    Io { path: String, reason: String },

    /// Malformed dataset, request or configuration documents
    #[error("[PARSE] Failed to parse {document}: {reason}")]
    Parse { document: String, reason: String },
}

/// Pipeline stages for error tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStage {
    Conditioning,
    Baseline,
    Segmentation,
    FeatureExtraction,
    Ranking,
    SubsetSearch,
    Training,
}

/// External capabilities consumed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Classifier,
    CrossValidation,
    Importance,
    DatasetProvider,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Classifier => write!(f, "CLASSIFIER"),
            Capability::CrossValidation => write!(f, "CROSS-VALIDATION"),
            Capability::Importance => write!(f, "IMPORTANCE"),
            Capability::DatasetProvider => write!(f, "DATASET-PROVIDER"),
        }
    }
}

fn format_invalid_data(
    data_type: &str,
    reason: &str,
    expected: &Option<String>,
    actual: &Option<String>,
    context: &ErrorContext,
) -> String {
    match (expected, actual) {
        (Some(exp), Some(act)) => format!(
            "[DATA] Invalid {}: {} (expected: {}, got: {}) ({})",
            data_type, reason, exp, act, context.operation
        ),
        _ => format!("[DATA] Invalid {}: {} ({})", data_type, reason, context.operation),
    }
}

/// Error context for debugging and analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub additional_info: HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            ..Default::default()
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file.to_string());
        context.line = Some(line);
        context
    }

    /// Add additional information to the context
    pub fn add_info<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

/// Result type alias for pipeline operations
pub type EmgResult<T> = Result<T, EmgError>;

/// Error builder for convenient error construction
pub struct EmgErrorBuilder {
    component: String,
    operation: String,
}

impl EmgErrorBuilder {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }

    fn context(&self) -> ErrorContext {
        ErrorContext::new(&self.component, &self.operation)
    }

    pub fn configuration(self, reason: impl Into<String>) -> EmgError {
        let context = self.context();
        EmgError::Configuration {
            component: self.component,
            reason: reason.into(),
            context,
        }
    }

    pub fn invalid_data(self, data_type: &str, reason: impl Into<String>) -> EmgError {
        EmgError::InvalidData {
            data_type: data_type.to_string(),
            reason: reason.into(),
            expected: None,
            actual: None,
            context: self.context(),
        }
    }

    pub fn mismatch(
        self,
        data_type: &str,
        reason: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> EmgError {
        EmgError::InvalidData {
            data_type: data_type.to_string(),
            reason: reason.into(),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
            context: self.context(),
        }
    }

    pub fn processing(self, stage: ProcessingStage, reason: impl Into<String>) -> EmgError {
        EmgError::Processing {
            stage,
            reason: reason.into(),
            context: self.context(),
        }
    }

    pub fn capability(self, capability: Capability, reason: impl Into<String>) -> EmgError {
        EmgError::Capability {
            capability,
            reason: reason.into(),
            context: self.context(),
        }
    }
}

impl EmgError {
    /// Context attached to the error, if the variant carries one
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            EmgError::Configuration { context, .. }
            | EmgError::InvalidData { context, .. }
            | EmgError::Processing { context, .. }
            | EmgError::Capability { context, .. } => Some(context),
            EmgError::Io { .. } | EmgError::Parse { .. } => None,
        }
    }

    /// Whether the error was caused by the caller's parameters rather than the data
    pub fn is_configuration(&self) -> bool {
        matches!(self, EmgError::Configuration { .. })
    }

    /// Client-facing error body
    pub fn to_response(&self) -> ErrorResponse {
        let error = match self {
            EmgError::Configuration { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        ErrorResponse { error }
    }
}

/// `{"error": "..."}` body sent instead of a selection result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<std::io::Error> for EmgError {
    fn from(err: std::io::Error) -> Self {
        EmgError::Io {
            path: String::from("<unknown>"),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EmgError {
    fn from(err: serde_json::Error) -> Self {
        EmgError::Parse {
            document: String::from("json"),
            reason: err.to_string(),
        }
    }
}

impl From<crate::processing::filters::FilterError> for EmgError {
    fn from(err: crate::processing::filters::FilterError) -> Self {
        EmgError::Configuration {
            component: String::from("signal_conditioner"),
            reason: err.to_string(),
            context: error_context!("signal_conditioner", "filter_design"),
        }
    }
}

impl From<crate::config::ConfigError> for EmgError {
    fn from(err: crate::config::ConfigError) -> Self {
        EmgError::Configuration {
            component: String::from("config_loader"),
            reason: err.to_string(),
            context: error_context!("config_loader", "load"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("test_component", "test_operation");
        assert_eq!(context.component, "test_component");
        assert_eq!(context.operation, "test_operation");
        assert!(context.file.is_none());
    }

    #[test]
    fn test_error_context_macro_records_location() {
        let context = error_context!("segmenter", "segment");
        assert!(context.file.as_deref().unwrap_or("").ends_with("error.rs"));
        assert!(context.line.is_some());
    }

    #[test]
    fn test_error_builder() {
        let err = EmgErrorBuilder::new("pipeline", "validate").configuration("sampling rate missing!");

        match err {
            EmgError::Configuration { component, reason, .. } => {
                assert_eq!(component, "pipeline");
                assert_eq!(reason, "sampling rate missing!");
            }
            _ => panic!("Expected configuration error"),
        }
    }

    #[test]
    fn test_invalid_data_display() {
        let err = EmgErrorBuilder::new("features", "extract").mismatch(
            "trial",
            "too few samples",
            ">= 3",
            1,
        );

        let display = format!("{}", err);
        assert!(display.contains("[DATA]"));
        assert!(display.contains("expected: >= 3"));
        assert!(display.contains("got: 1"));
    }

    #[test]
    fn test_capability_display() {
        let err = EmgErrorBuilder::new("classifier_provider", "create")
            .capability(Capability::Classifier, "unknown model 'Perceptron'");
        let display = err.to_string();
        assert!(display.contains("CLASSIFIER"));
        assert!(display.contains("Perceptron"));
    }

    #[test]
    fn test_configuration_response_carries_reason() {
        let err = EmgErrorBuilder::new("pipeline", "validate").configuration("filename missing!");
        let body = serde_json::to_string(&err.to_response()).unwrap();
        assert_eq!(body, r#"{"error":"filename missing!"}"#);

        let err = EmgErrorBuilder::new("gesture_set", "new").invalid_data("gesture set", "no trials");
        assert!(err.to_response().error.contains("no trials"));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmgError>();
    }

    #[test]
    fn test_foreign_errors_convert() {
        let io: EmgError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing upload").into();
        match io {
            EmgError::Io { reason, .. } => assert!(reason.contains("missing upload")),
            other => panic!("expected io error, got {other:?}"),
        }

        let parse: EmgError = serde_json::from_str::<ErrorResponse>("{").unwrap_err().into();
        assert!(matches!(parse, EmgError::Parse { .. }));
        assert!(parse.to_response().error.starts_with("[PARSE]"));
    }
}
