//! Client error types

use keyway_core::StorageError;
use thiserror::Error;

/// Failure of an identity call or an authenticated request
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure before a response arrived (connect, TLS, timeout)
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Any other non-success status, typically 5xx
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// A 401 from an identity call such as login. Authenticated requests,
    /// `send_json` included, never surface this for a 401; they refresh and
    /// report [`SessionExpired`](Self::SessionExpired) or
    /// [`RetryExhausted`](Self::RetryExhausted) instead.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The server rejected the payload (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Valid credentials without permission for the resource (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request body could not be encoded or a success body could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing base URL, bad endpoint path or client construction failure
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Credential persistence failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The access token could not be renewed; the session has been ended
    #[error("Session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    /// The request was still unauthorized after one refresh and replay
    #[error("Session expired: request was rejected again after refreshing credentials")]
    RetryExhausted,
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// True when the caller must log in again
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::RetryExhausted)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status, .. } => Some(*status),
            Self::AuthenticationFailed(_) => Some(401),
            Self::BadRequest(_) => Some(400),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Why a token refresh did not produce a usable access token
///
/// Cloneable so one outcome can be handed to every caller waiting on the
/// same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The identity endpoint refused the refresh token
    #[error("refresh token rejected with status {0}")]
    Rejected(u16),

    #[error("transport failure during refresh: {0}")]
    Transport(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("failed to persist renewed tokens: {0}")]
    Storage(String),

    /// The session was ended (or replaced) while the refresh was in flight
    #[error("session ended while the refresh was in flight")]
    Superseded,

    /// The task driving the refresh was dropped before it settled
    #[error("refresh was abandoned before completing")]
    Abandoned,
}

impl From<ClientError> for RefreshError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Request(err) => Self::Transport(err.to_string()),
            ClientError::Serialization(err) => Self::InvalidResponse(err.to_string()),
            ClientError::Storage(err) => Self::Storage(err.to_string()),
            ClientError::SessionExpired(err) => err,
            other => match other.status() {
                Some(status) => Self::Rejected(status),
                None => Self::Transport(other.to_string()),
            },
        }
    }
}
