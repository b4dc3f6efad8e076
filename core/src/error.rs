//! Error types for the wallet API client.
//!
//! # Design
//! The service reports business outcomes (insufficient funds, unknown
//! operation id) as JSON fields inside a 200 response, and protocol failures
//! (bad or expired credentials, server faults) through the HTTP status. Only
//! the latter become `ApiError` variants; the former reach the caller as
//! ordinary decoded values.
//!
//! Failures that never produced a usable response (unreachable host,
//! unparsable body) are kept apart in [`TransportError`].

use std::fmt;

use serde_json::Value;

/// Errors returned by the dispatcher and every facade operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An authenticated operation was called on a client without a token.
    /// Raised locally, before any request is built.
    #[error("access token is required for this operation; obtain one first")]
    MissingToken,

    /// HTTP 400: the authorization header is missing or malformed.
    #[error("authorization header is missing or malformed (HTTP {status})")]
    Format { status: u16, body: Option<Value> },

    /// HTTP 401: the token is nonexistent, expired or revoked.
    #[error("token is nonexistent, expired or revoked (HTTP {status})")]
    Token { status: u16, body: Option<Value> },

    /// HTTP 403: the token lacks the scope the operation needs.
    #[error("token has no permission for the requested operation (HTTP {status})")]
    Scope { status: u16, body: Option<Value> },

    /// HTTP 5xx.
    #[error("wallet server error (HTTP {status})")]
    Server { status: u16, body: Option<Value> },

    /// Any failure outside the four protocol kinds above.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Protocol-level error kinds, selected purely from the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    Token,
    Scope,
    Server,
}

impl ErrorKind {
    /// Build the matching `ApiError` for a classified response.
    pub fn into_error(self, status: u16, body: Option<Value>) -> ApiError {
        match self {
            ErrorKind::Format => ApiError::Format { status, body },
            ErrorKind::Token => ApiError::Token { status, body },
            ErrorKind::Scope => ApiError::Scope { status, body },
            ErrorKind::Server => ApiError::Server { status, body },
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Format => "format",
            ErrorKind::Token => "token",
            ErrorKind::Scope => "scope",
            ErrorKind::Server => "server",
        };
        f.write_str(name)
    }
}

impl ApiError {
    /// The protocol error kind, if this error was decoded from a response.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApiError::Format { .. } => Some(ErrorKind::Format),
            ApiError::Token { .. } => Some(ErrorKind::Token),
            ApiError::Scope { .. } => Some(ErrorKind::Scope),
            ApiError::Server { .. } => Some(ErrorKind::Server),
            ApiError::MissingToken | ApiError::Transport(_) => None,
        }
    }

    /// The raw HTTP status of a classified response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Format { status, .. }
            | ApiError::Token { status, .. }
            | ApiError::Scope { status, .. }
            | ApiError::Server { status, .. } => Some(*status),
            ApiError::MissingToken | ApiError::Transport(_) => None,
        }
    }

    /// The response body of a classified response, when it was valid JSON.
    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiError::Format { body, .. }
            | ApiError::Token { body, .. }
            | ApiError::Scope { body, .. }
            | ApiError::Server { body, .. } => body.as_ref(),
            ApiError::MissingToken | ApiError::Transport(_) => None,
        }
    }
}

/// Failures below the API protocol: the exchange itself did not complete,
/// or its result could not be read.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Connection, TLS, timeout and I/O failures, as reported by `ureq`.
    /// Custom transports wrap their own I/O errors as `ureq::Error::Io`.
    #[error("HTTP exchange failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("response body is not valid JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),
}
