//! The error types produced by the framework.
//!
//! `HttpError` is the value that travels up the middleware stack: it carries
//! an HTTP status, an optional message rendered as a JSON body, and an
//! optional opaque cause for logging. Everything the router, the file
//! middleware and request decoding produce is an `HttpError`; unexpected
//! failures are wrapped via [`HttpError::internal`] and surface as a bare
//! `500`.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use bytes::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::response::{Response, ResponseBody};

/// An error carrying an HTTP status code, convertible into a `Response`.
pub struct HttpError {
    status: StatusCode,
    message: Option<String>,
    cause: Option<anyhow::Error>,
}

impl HttpError {
    /// Creates an error with the given status and no body.
    pub fn new(status: StatusCode) -> HttpError {
        HttpError {
            status,
            message: None,
            cause: None,
        }
    }

    /// Creates an error with the given status and a message that will be
    /// rendered as `{"error":{"message":...}}`.
    pub fn with_message<M: Into<String>>(status: StatusCode, message: M) -> HttpError {
        HttpError {
            status,
            message: Some(message.into()),
            cause: None,
        }
    }

    /// The `404 Not Found` sentinel. The file middleware retries request
    /// paths that fail with this status.
    pub fn not_found() -> HttpError {
        HttpError::new(StatusCode::NOT_FOUND)
    }

    /// A `400 Bad Request` with a message.
    pub fn bad_request<M: Into<String>>(message: M) -> HttpError {
        HttpError::with_message(StatusCode::BAD_REQUEST, message)
    }

    /// A `413 Payload Too Large`, produced when a request body exceeds the
    /// configured ceiling.
    pub fn payload_too_large() -> HttpError {
        HttpError::new(StatusCode::PAYLOAD_TOO_LARGE)
    }

    /// A `416 Range Not Satisfiable`.
    pub fn range_not_satisfiable() -> HttpError {
        HttpError::new(StatusCode::RANGE_NOT_SATISFIABLE)
    }

    /// Wraps an unexpected failure as a `500 Internal Server Error`. The
    /// cause is kept for logging and never rendered to the client.
    pub fn internal<E: Into<anyhow::Error>>(cause: E) -> HttpError {
        HttpError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: None,
            cause: Some(cause.into()),
        }
    }

    /// Attaches a cause to an existing error.
    pub fn with_cause<E: Into<anyhow::Error>>(mut self, cause: E) -> HttpError {
        self.cause = Some(cause.into());
        self
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The message destined for the JSON error body, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The underlying cause, if one was recorded.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    /// True for the `404 Not Found` sentinel.
    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    /// Renders the error as a client-facing response.
    ///
    /// Errors with a message produce a JSON body; all others are empty.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(self.status);
        if let Some(message) = self.message {
            let body = ErrorBody {
                error: ErrorMessage { message: &message },
            };
            if let Ok(encoded) = serde_json::to_vec(&body) {
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref().parse().unwrap());
                response.set_body(ResponseBody::Buffer(Bytes::from(encoded)));
            }
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorMessage<'a>,
}

#[derive(Serialize)]
struct ErrorMessage<'a> {
    message: &'a str,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.status, message),
            None => write!(f, "{}", self.status),
        }
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("cause", &self.cause)
            .finish()
    }
}

impl StdError for HttpError {}

impl From<ParseError> for HttpError {
    fn from(err: ParseError) -> HttpError {
        HttpError::bad_request(err.to_string())
    }
}

/// Errors raised while interpreting request data.
///
/// These are non-fatal; at the boundary they surface as `400 Bad Request`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input was not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,
    /// An HTTP date failed to parse.
    #[error("invalid HTTP date")]
    InvalidDate,
    /// A `Range` header failed to parse.
    #[error("malformed range")]
    InvalidRange,
    /// A media type failed to parse.
    #[error("malformed media type")]
    InvalidMediaType,
}

/// Errors raised while binding the server's listener.
#[derive(Debug, Error)]
pub enum StartError {
    /// Binding or configuring the listener socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The configured address did not resolve to a socket address.
    #[error("unable to resolve listener address")]
    AddressResolution,
}
