//! Error types for the cloudscale.ch client.

use thiserror::Error;

/// Errors raised by [`super::CloudscaleClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudscaleError {
    /// Raised when the request never produced a response.
    #[error("request failed: {message}")]
    Http {
        /// Transport error message.
        message: String,
    },
    /// Raised when the API answers with a non-success status.
    #[error("API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// `detail` from the error body, or the raw body.
        message: String,
    },
    /// Raised when a response body does not decode.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Decoder error message.
        message: String,
    },
    /// Raised when a server identifier is not a UUID.
    #[error("invalid server id {id:?}: expected a UUID")]
    InvalidServerId {
        /// Identifier as supplied by the caller.
        id: String,
    },
    /// Raised when polling exceeds the wait timeout.
    #[error("timeout waiting for {action} on server {server_id}")]
    Timeout {
        /// Action being waited on.
        action: String,
        /// Server identifier.
        server_id: String,
    },
}

impl CloudscaleError {
    /// Returns the HTTP status for API errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CloudscaleError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http {
            message: value.to_string(),
        }
    }
}
