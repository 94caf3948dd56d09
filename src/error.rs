//! Error types
//!
//! Expected conversational conditions (empty queue, closed gate, no coach
//! hint, a finished call) are values, not errors. These cover the rest.

/// Failure talking to an external collaborator (generation, coach, judge).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No endpoint configured for this service
    #[error("Service not configured: {0}")]
    NotConfigured(&'static str),

    /// Request did not complete within its budget
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Request was cancelled by a newer one
    #[error("Cancelled")]
    Cancelled,

    /// Transport or status failure
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Body did not match the expected contract
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::ParseError(err.to_string())
        } else {
            ServiceError::RequestFailed(err.to_string())
        }
    }
}

/// Failure loading session configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failure addressing a session actor.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Actor has shut down (call ended or task dropped)
    #[error("Session closed")]
    Closed,
}
