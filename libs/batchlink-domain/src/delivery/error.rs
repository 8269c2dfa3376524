//! Domain errors for delivery operations
//!
//! Adapters translate SDK failures into these variants, so nothing AWS-specific
//! leaks past the transport port.

use thiserror::Error;

/// Errors that can occur during record delivery
///
/// Producers only ever see `Config` and `Stopped`. Every other variant is
/// recovered inside the pipeline (retried or counted) and surfaces on the
/// stream's error channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Invalid or missing configuration, the pipeline never starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record could not be converted to bytes
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The remote call itself failed (network, timeout, throttling)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Records are still failing after every allowed attempt
    #[error("Retry budget exceeded after {attempts} attempt(s): {failed} record(s) undelivered")]
    RetryBudgetExceeded { attempts: u32, failed: usize },

    /// The stream no longer accepts records
    #[error("Delivery stream is stopped")]
    Stopped,

    /// An unexpected internal error occurred
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Create a config error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error with a message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a transport error with a message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a retry budget exceeded error
    pub fn retry_budget_exceeded(attempts: u32, failed: usize) -> Self {
        Self::RetryBudgetExceeded { attempts, failed }
    }

    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for delivery operations
pub type Result<T> = std::result::Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = DeliveryError::config("target is required");
        assert!(matches!(err, DeliveryError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: target is required");
    }

    #[test]
    fn test_retry_budget_exceeded_error() {
        let err = DeliveryError::retry_budget_exceeded(3, 7);
        assert!(matches!(
            err,
            DeliveryError::RetryBudgetExceeded {
                attempts: 3,
                failed: 7
            }
        ));
        assert!(err.to_string().contains("3 attempt(s)"));
        assert!(err.to_string().contains("7 record(s)"));
    }

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(DeliveryError::transport("connection reset by peer").is_retryable());
        assert!(!DeliveryError::serialization("bad float").is_retryable());
        assert!(!DeliveryError::Stopped.is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DeliveryError = json_err.into();
        assert!(matches!(err, DeliveryError::Serialization(_)));
    }
}
