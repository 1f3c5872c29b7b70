//! Error types for the remote client.

use memoria_core::Error as CoreError;
use thiserror::Error;

/// Result type alias for remote client operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Request rejected before it was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or malformed access token
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RemoteError> for CoreError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Api { status, message } => CoreError::from_status(status, message),
            RemoteError::Http(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
                CoreError::service_unavailable(err.to_string())
            }
            RemoteError::Http(err) => CoreError::unknown(err.to_string()),
            RemoteError::Json(err) => CoreError::unknown(format!("malformed response: {}", err)),
            RemoteError::InvalidRequest(message) => CoreError::invalid_input(message),
            RemoteError::Auth(message) => CoreError::unauthorized(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_classify_by_status() {
        assert_eq!(
            CoreError::from(RemoteError::api(401, "expired")),
            CoreError::unauthorized("expired")
        );
        assert_eq!(
            CoreError::from(RemoteError::api(409, "stale")),
            CoreError::conflict("stale")
        );
        assert!(CoreError::from(RemoteError::api(503, "down")).is_transient());
        assert!(CoreError::from(RemoteError::api(429, "slow down")).is_transient());
        assert_eq!(
            CoreError::from(RemoteError::api(404, "gone")),
            CoreError::unknown("gone")
        );
    }

    #[test]
    fn local_errors_map_to_core_variants() {
        assert_eq!(
            CoreError::from(RemoteError::auth("missing access token")),
            CoreError::unauthorized("missing access token")
        );
        assert_eq!(
            CoreError::from(RemoteError::invalid_request("empty id")),
            CoreError::invalid_input("empty id")
        );
        assert_eq!(RemoteError::api(500, "boom").status_code(), Some(500));
        assert_eq!(RemoteError::auth("x").status_code(), None);
    }
}
