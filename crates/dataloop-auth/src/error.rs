//! Error types for credential handling.

use thiserror::Error;

/// Errors raised while turning an API key into a usable session token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No API key was configured for this process.
    #[error("Missing API key: set DATALOOP_API_KEY")]
    MissingCredential,

    /// The exchange request failed or returned an unsuccessful status.
    #[error("Failed getting app JWT: {0}")]
    Refresh(String),

    /// The exchange succeeded but no session cookie was issued.
    #[error(
        "APP_JWT is missing. Set the APP_JWT environment variable or ensure authentication is working"
    )]
    MissingToken,

    /// The routing endpoint could not be located.
    #[error("Failed getting app info: {0}")]
    Discovery(String),

    /// A token could not be decoded.
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Refresh(err.to_string())
    }
}

/// Result type alias using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;
