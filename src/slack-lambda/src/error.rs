//! Error types for the Slack adapter.
//!
//! Every failure the adapter can raise is a variant of [`SlackError`]:
//! request verification, routing, the OAuth install handshake, and the
//! outbound Web API calls. Hosts map errors to HTTP statuses with
//! [`SlackError::status_code`].

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that can occur while handling Slack requests.
#[derive(Error, Debug)]
pub enum SlackError {
    /// Configuration error (missing or invalid config).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request signature verification failed.
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    /// No handler is registered for the route key.
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// Slack redirected back with an `error` parameter.
    #[error("OAuth installation failed: {0}")]
    OAuthCallback(String),

    /// The callback `state` does not match an issued token.
    #[error("OAuth state mismatch: possible CSRF attempt")]
    OAuthStateMismatch,

    /// A required request parameter is absent.
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Too many requests are outstanding.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// API request failed.
    #[error("Slack API error: {0}")]
    Api(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid payload received from the host or from Slack.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SlackError {
    /// HTTP status a host should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SignatureVerification(_) => StatusCode::UNAUTHORIZED,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::OAuthCallback(_)
            | Self::OAuthStateMismatch
            | Self::MissingParameter(_)
            | Self::InvalidPayload(_)
            | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Api(_) | Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::SignatureVerification(_) => "invalid_signature",
            Self::RouteNotFound(_) => "not_found",
            Self::OAuthCallback(_) => "oauth_error",
            Self::OAuthStateMismatch => "oauth_state_mismatch",
            Self::MissingParameter(_) => "missing_parameter",
            Self::RateLimited(_) => "rate_limited",
            Self::Api(_) => "slack_api_error",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Json(_) => "json_error",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the OAuth controller may turn this error into a redirect
    /// to the configured error URI.
    pub fn is_install_rejection(&self) -> bool {
        matches!(
            self,
            Self::OAuthCallback(_) | Self::OAuthStateMismatch | Self::MissingParameter(_)
        )
    }
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::Timeout(err.to_string())
        } else if err.is_connect() {
            SlackError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            SlackError::Json(err.to_string())
        } else {
            SlackError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Json(err.to_string())
    }
}

impl From<base64::DecodeError> for SlackError {
    fn from(err: base64::DecodeError) -> Self {
        SlackError::InvalidPayload(format!("Invalid base64 body: {}", err))
    }
}

/// Result type for Slack operations.
pub type SlackResult<T> = std::result::Result<T, SlackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SlackError::Config("missing signing secret".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing signing secret");

        let err = SlackError::RouteNotFound("POST /resource".to_string());
        assert_eq!(err.to_string(), "Route not found: POST /resource");

        let err = SlackError::MissingParameter("code");
        assert_eq!(err.to_string(), "Missing required parameter: code");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            SlackError::SignatureVerification("stale".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SlackError::RouteNotFound("GET /".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SlackError::OAuthStateMismatch.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SlackError::RateLimited("full".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            SlackError::Api("invalid_code".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_install_rejection_kinds() {
        assert!(SlackError::OAuthCallback("access_denied".into()).is_install_rejection());
        assert!(SlackError::OAuthStateMismatch.is_install_rejection());
        assert!(SlackError::MissingParameter("state").is_install_rejection());
        assert!(!SlackError::Network("reset".into()).is_install_rejection());
        assert!(!SlackError::RateLimited("full".into()).is_install_rejection());
        assert!(!SlackError::SignatureVerification("bad".into()).is_install_rejection());
    }
}
