//! Error types shared by the cache and the page view-models.

use thiserror::Error;

/// Result type alias for memoria operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of fetch and mutation operations.
///
/// Push handling never produces these; a malformed or mismatched push is
/// dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No owner is bound (user not signed in).
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Owner mismatch or missing permission.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The server rejected the mutation because of a concurrent change.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient failure of the remote service.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Input rejected before reaching the service.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown(message.into())
    }

    /// True when re-issuing the same call later may succeed.
    ///
    /// The cache itself never retries; this is for callers deciding whether to
    /// offer a manual refresh.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }

    /// Classify an HTTP status code returned by a remote collaborator.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized(message),
            409 => Self::Conflict(message),
            408 | 423 | 425 | 429 => Self::ServiceUnavailable(message),
            500..=599 => Self::ServiceUnavailable(message),
            _ => Self::Unknown(message),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Unknown(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_taxonomy() {
        assert_eq!(
            Error::from_status(401, "nope"),
            Error::Unauthorized("nope".to_string())
        );
        assert_eq!(
            Error::from_status(409, "gone"),
            Error::Conflict("gone".to_string())
        );
        assert!(Error::from_status(503, "later").is_transient());
        assert!(Error::from_status(429, "slow down").is_transient());
        assert_eq!(
            Error::from_status(400, "bad"),
            Error::Unknown("bad".to_string())
        );
    }

    #[test]
    fn only_service_unavailable_is_transient() {
        assert!(!Error::NotAuthenticated.is_transient());
        assert!(!Error::conflict("x").is_transient());
        assert!(!Error::invalid_input("x").is_transient());
    }
}
