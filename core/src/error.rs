//! Error taxonomy for registration, dispatch and the response sink
//!
//! Request handling distinguishes exactly two kinds of failure: a
//! [`RequestError`] carries a status code and a message that is safe to show
//! to the client, anything else is an opaque internal failure. [`Error`]
//! models that split as a sum type so the centralized responder can match on
//! it exhaustively.

use std::io;

use http::StatusCode;
use thiserror::Error;

/// Boxed error used for opaque internal failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a handler or a context operation
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A structured, client-facing failure
///
/// The code must be a valid 1xx-5xx status; the message is written verbatim
/// into the response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub code: StatusCode,
    pub message: String,
}

impl RequestError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error whose message is the canonical reason phrase of `code`
    pub fn from_status(code: StatusCode) -> Self {
        Self::new(code, code.canonical_reason().unwrap_or("Unknown Status"))
    }

    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

/// Error returned by handlers and middleware
#[derive(Debug, Error)]
pub enum Error {
    /// Structured failure with a status and an exposable message
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Anything else; never shown to the client
    #[error(transparent)]
    Internal(BoxError),
}

impl Error {
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Internal(err.into())
    }

    /// The structured error, if this is one
    pub fn as_request_error(&self) -> Option<&RequestError> {
        match self {
            Error::Request(re) => Some(re),
            Error::Internal(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::internal(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal(err)
    }
}

impl From<SinkError> for Error {
    fn from(err: SinkError) -> Self {
        Error::internal(err)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Error::internal(err)
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Error::internal(err)
    }
}

/// Route registration failures
///
/// These are programming errors; `Router::handle` turns them into panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("Invalid method `{0}`. The method of a handler must be a valid http method.")]
    InvalidMethod(String),

    #[error("Invalid pattern. The path of a handler can't be empty.")]
    EmptyPath,

    #[error("Duplicate path. Path `{path}` already contains a {method} handler.")]
    DuplicateRoute { method: String, path: String },
}

/// Response sink failures
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink cannot perform the requested operation (flush, hijack)
    #[error("response writer does not support {0}")]
    Unsupported(&'static str),

    /// The status does not permit a body (204, 304, 1xx)
    #[error("request method or response status code does not allow body")]
    BodyNotAllowed,

    /// The client went away before the response was delivered
    #[error("client disconnected before the response was delivered")]
    Closed,

    /// The response was already completed or the connection taken over
    #[error("response already {0}")]
    Completed(&'static str),

    /// The connection carries no upgrade handle
    #[error("connection cannot be upgraded")]
    NoUpgrade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_from_status() {
        let err = RequestError::from_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.code, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.message, "Unsupported Media Type");
        assert_eq!(err.to_string(), "Unsupported Media Type");
    }

    #[test]
    fn test_error_narrowing() {
        let err: Error = RequestError::not_found().into();
        assert_eq!(err.as_request_error().unwrap().code, StatusCode::NOT_FOUND);

        let err: Error = io::Error::new(io::ErrorKind::Other, "disk on fire").into();
        assert!(err.as_request_error().is_none());
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_router_error_messages() {
        let err = RouterError::DuplicateRoute {
            method: "GET".to_string(),
            path: "/".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate path. Path `/` already contains a GET handler."
        );
        assert!(RouterError::EmptyPath.to_string().contains("can't be empty"));
    }
}
