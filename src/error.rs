//! Error types for medir operations
//!
//! One enum covers the whole harness. Only `InvalidConfiguration` is fatal
//! to an invocation; transport and catalog failures are demoted into the
//! affected run record, and aggregation gaps are logged and skipped.

use thiserror::Error;

/// Errors that can occur during benchmark operations
#[derive(Error, Debug)]
pub enum MedirError {
    /// Configuration is malformed or inconsistent. Names the offending
    /// key or flag. Aborts before any network call.
    #[error("Invalid configuration for '{key}': {reason}")]
    InvalidConfiguration {
        /// Configuration key, CLI flag, or environment variable at fault
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Inference server unreachable or returned an unusable response
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Requested model is absent from the server catalog
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// A (model, context) key had zero valid samples across all runs
    #[error("No valid samples for model '{model}' at context {context}")]
    AggregationGap {
        /// Model name for the empty key
        model: String,
        /// Context size for the empty key
        context: u32,
    },

    /// Malformed server response or results file
    #[error("Format error: {reason}")]
    FormatError {
        /// What failed to parse
        reason: String,
    },

    /// Filesystem failure on the results write path
    #[error("IO error: {message}")]
    IoError {
        /// Underlying failure description
        message: String,
    },
}

impl MedirError {
    /// True for errors that must stop the invocation before any cell runs.
    ///
    /// Everything else is recorded per cell or logged as a warning.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, MedirError::InvalidConfiguration { .. })
    }
}

/// Result type for medir operations
pub type Result<T> = std::result::Result<T, MedirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_names_key() {
        let err = MedirError::InvalidConfiguration {
            key: "OLLAMA_PORT".to_string(),
            reason: "expected integer, got 'abc'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("OLLAMA_PORT"));
        assert!(msg.contains("expected integer"));
    }

    #[test]
    fn test_only_configuration_errors_are_fatal() {
        let config = MedirError::InvalidConfiguration {
            key: "num_ctx".to_string(),
            reason: "not a number".to_string(),
        };
        assert!(config.is_fatal());

        let transport = MedirError::ConnectionError("refused".to_string());
        assert!(!transport.is_fatal());

        let missing = MedirError::ModelNotFound("llama3.2".to_string());
        assert!(!missing.is_fatal());

        let gap = MedirError::AggregationGap {
            model: "qwen3:8b".to_string(),
            context: 8192,
        };
        assert!(!gap.is_fatal());
    }

    #[test]
    fn test_aggregation_gap_display() {
        let err = MedirError::AggregationGap {
            model: "gemma3:4b".to_string(),
            context: 16384,
        };
        assert_eq!(
            err.to_string(),
            "No valid samples for model 'gemma3:4b' at context 16384"
        );
    }

    #[test]
    fn test_io_error_display() {
        let err = MedirError::IoError {
            message: "permission denied".to_string(),
        };
        assert!(err.to_string().starts_with("IO error"));
    }
}
