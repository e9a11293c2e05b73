//! Error types for the relay.

use std::time::Duration;

use dataloop_auth::AuthError;
use thiserror::Error;

/// Errors that can occur while relaying a call.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Credential exchange or session token failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Handshake or tool invocation failure against the upstream app.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The upstream did not answer within the read timeout.
    #[error("Upstream did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Invalid or missing settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (stdio transport, signal registration).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using `RelayError`.
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_keep_their_message() {
        let err = RelayError::from(AuthError::MissingCredential);
        assert_eq!(err.to_string(), AuthError::MissingCredential.to_string());
    }

    #[test]
    fn test_timeout_message_names_duration() {
        let err = RelayError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "Upstream did not respond within 60s");
    }
}
