//! Error types for Crewbase

use thiserror::Error;

/// Main error type for Crewbase operations
#[derive(Debug, Error)]
pub enum CrewbaseError {
    /// Required connection configuration is absent
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Configuration present but malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A call against the hosted service failed
    #[error("Service operation '{operation}' failed{}: {message}", status_suffix(.status))]
    ServiceOperation {
        /// Operation name (insert, query, update, delete, ...)
        operation: String,
        /// HTTP status, when the service answered
        status: Option<u16>,
        /// Underlying message
        message: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

/// Convenient Result type using CrewbaseError
pub type Result<T> = std::result::Result<T, CrewbaseError>;

impl CrewbaseError {
    /// Create a configuration-missing error
    pub fn configuration_missing(msg: impl Into<String>) -> Self {
        CrewbaseError::ConfigurationMissing(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        CrewbaseError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        CrewbaseError::Validation(msg.into())
    }

    /// Create a service operation failure
    pub fn service_operation(
        operation: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        CrewbaseError::ServiceOperation {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    /// True if this error came from the hosted service boundary
    pub fn is_service_failure(&self) -> bool {
        matches!(self, CrewbaseError::ServiceOperation { .. })
    }
}
