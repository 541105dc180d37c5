//! The response type and helpers for constructing common responses.

mod body;

#[cfg(any(test, feature = "testing"))]
pub use self::body::{collect_body, CollectedBody};
pub use self::body::{BodyError, BodyWriter, ResponseBody, StreamBody};

pub(crate) use self::body::into_hyper_body;

use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use hyper::{Body, HeaderMap, StatusCode};
use mime::Mime;
use serde::Serialize;

use crate::error::HttpError;

/// An HTTP response: status, headers, a [`ResponseBody`], and optional
/// trailers for bodies that are buffered rather than streamed.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    trailers: Option<HeaderMap>,
}

impl Response {
    /// An empty response with the given status.
    pub fn new(status: StatusCode) -> Response {
        Response {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            trailers: None,
        }
    }

    /// A response with an eager body and a content type.
    pub fn with_body<B: Into<Bytes>>(status: StatusCode, body: B, mime: Mime) -> Response {
        let mut response = Response::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, content_type_value(&mime));
        response.body = ResponseBody::Buffer(body.into());
        response
    }

    /// A `200 OK` with a `text/plain` body.
    pub fn text<S: Into<String>>(text: S) -> Response {
        Response::with_body(StatusCode::OK, text.into(), mime::TEXT_PLAIN)
    }

    /// A `200 OK` with the value serialized as an `application/json` body.
    pub fn json<T: Serialize>(value: &T) -> Result<Response, HttpError> {
        let encoded = serde_json::to_vec(value).map_err(HttpError::internal)?;
        Ok(Response::with_body(
            StatusCode::OK,
            encoded,
            mime::APPLICATION_JSON,
        ))
    }

    /// A `308 Permanent Redirect` to the given location.
    pub fn permanent_redirect<L: AsRef<str>>(location: L) -> Response {
        redirect(StatusCode::PERMANENT_REDIRECT, location.as_ref())
    }

    /// A `307 Temporary Redirect` to the given location.
    pub fn temporary_redirect<L: AsRef<str>>(location: L) -> Response {
        redirect(StatusCode::TEMPORARY_REDIRECT, location.as_ref())
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Replaces the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The response body.
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Mutable access to the response body.
    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// Replaces the body.
    pub fn set_body<B: Into<ResponseBody>>(&mut self, body: B) {
        self.body = body.into();
    }

    /// Takes the body, leaving an empty one behind.
    pub fn take_body(&mut self) -> ResponseBody {
        std::mem::take(&mut self.body)
    }

    /// Trailers attached to this response, if any.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    /// Attaches trailers to the response. They are merged into the body's
    /// final [`BodyWriter::finish`] when the response is written out, so
    /// buffered and streamed bodies both deliver them; entries set here win
    /// over same-named trailers emitted by a streaming producer.
    pub fn set_trailers(&mut self, trailers: HeaderMap) {
        self.trailers = Some(trailers);
    }

    /// The body with any response-level trailers folded in, consuming the
    /// response's body and trailer slots.
    pub fn take_body_with_trailers(&mut self) -> ResponseBody {
        let body = std::mem::take(&mut self.body);
        match self.trailers.take() {
            Some(trailers) => body.with_trailers(trailers),
            None => body,
        }
    }

    /// Converts into the wire-level response. For `HEAD` requests the body is
    /// discarded while `Content-Length` is retained.
    pub(crate) fn into_hyper(
        mut self,
        head_request: bool,
        write_timeout: Option<std::time::Duration>,
    ) -> hyper::Response<Body> {
        let body_allowed = !head_request
            && self.status != StatusCode::NO_CONTENT
            && self.status != StatusCode::NOT_MODIFIED;

        if !self.headers.contains_key(CONTENT_LENGTH)
            && self.status != StatusCode::NO_CONTENT
            && self.status != StatusCode::NOT_MODIFIED
        {
            if let Some(length) = self.body.content_length() {
                self.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
        }

        let status = self.status;
        let response_headers = std::mem::take(&mut self.headers);
        let body = self.take_body_with_trailers();

        let mut builder = hyper::Response::builder().status(status);
        if let Some(headers) = builder.headers_mut() {
            *headers = response_headers;
        }

        let body = if body_allowed {
            into_hyper_body(body, write_timeout)
        } else {
            Body::empty()
        };

        builder
            .body(body)
            .expect("response built from valid status and headers")
    }
}

fn redirect(status: StatusCode, location: &str) -> Response {
    let mut response = Response::new(status);
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers.insert(LOCATION, value);
    }
    response
}

fn content_type_value(mime: &Mime) -> HeaderValue {
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}
