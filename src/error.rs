//! Error types for Marquee

use thiserror::Error;

/// Result type alias for Marquee operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Marquee
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Sign-in failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Request requires authentication but no access token is available")]
    NotAuthenticated,

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

const SIGN_IN_FAILED: &str = "Could not sign in, try again.";
const SESSION_EXPIRED: &str = "Session expired, please sign in again.";

/// Failures of the sign-in flows (authorization code and device code)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Transport failure: connection refused, timeout, TLS
    #[error("network failure: {0}")]
    Network(String),

    #[error("unexpected response status {0}")]
    UnsuccessfulResponse(u16),

    #[error("response body was empty")]
    MissingData,

    #[error("could not decode response: {0}")]
    Decode(String),

    /// The device code ran out of polling attempts before the user approved it
    #[error("device code expired before it was approved")]
    Expired,

    #[error("sign-in was cancelled")]
    Cancelled,
}

impl AuthError {
    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::Expired => "The code expired before it was approved, try again.",
            AuthError::Cancelled => "Sign-in cancelled.",
            _ => SIGN_IN_FAILED,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}

/// Failures of the refresh-token grant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,

    /// The access token is past its expiry; only a new sign-in can recover
    #[error("stored tokens have expired")]
    ExpiredTokens,

    /// The server rejected the refresh token (HTTP 401)
    #[error("refresh token was rejected")]
    InvalidRefreshToken,

    #[error("unexpected response status {0}")]
    UnsuccessfulNetworkResponse(u16),

    #[error("response body was empty")]
    MissingData,

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("network failure: {0}")]
    Network(String),
}

impl RefreshError {
    /// True when the caller has to run a full sign-in again
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            RefreshError::InvalidRefreshToken
                | RefreshError::ExpiredTokens
                | RefreshError::MissingRefreshToken
        )
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> &'static str {
        if self.requires_reauthentication() {
            SESSION_EXPIRED
        } else {
            "Could not reach the server, check your connection and try again."
        }
    }
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        RefreshError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_session_message_is_distinct() {
        let expired = RefreshError::InvalidRefreshToken.user_message();
        let network = RefreshError::Network("timeout".to_string()).user_message();
        assert_eq!(expired, SESSION_EXPIRED);
        assert_ne!(expired, network);
        assert_eq!(RefreshError::ExpiredTokens.user_message(), SESSION_EXPIRED);
    }

    #[test]
    fn test_sign_in_failure_message() {
        assert_eq!(AuthError::UnsuccessfulResponse(500).user_message(), SIGN_IN_FAILED);
        assert_eq!(AuthError::MissingData.user_message(), SIGN_IN_FAILED);
    }

    #[test]
    fn test_reauthentication_kinds() {
        assert!(RefreshError::MissingRefreshToken.requires_reauthentication());
        assert!(!RefreshError::UnsuccessfulNetworkResponse(503).requires_reauthentication());
        assert!(!RefreshError::MissingData.requires_reauthentication());
    }
}
