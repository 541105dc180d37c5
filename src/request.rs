//! The request type handed to middleware and handlers.

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, HeaderMap, Method, Uri, Version};
use mime::Mime;

use crate::error::{HttpError, ParseError};
use crate::helpers::http::parse_query;
use crate::helpers::utf8::Utf8Validator;

/// Default ceiling on collected request body size: 2 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// An incoming HTTP request.
///
/// The URI arrives pre-parsed (scheme, authority, path, query are accessor
/// calls away); the body is a finite, single-pass chunk stream.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: RequestBody,
}

impl Request {
    /// Builds a request from the wire-level representation.
    pub(crate) fn from_hyper(req: hyper::Request<Body>, body_limit: usize) -> Request {
        let (parts, body) = req.into_parts();
        Request {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body: RequestBody::new(body, body_limit),
        }
    }

    /// Constructs a request without a body, mainly useful in tests.
    pub fn new(method: Method, uri: Uri) -> Request {
        Request {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: RequestBody::empty(),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Shorthand for the URI path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The HTTP version the request arrived over.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The query string parsed into ordered key/value pairs.
    pub fn query_parameters(&self) -> Vec<(String, String)> {
        self.uri.query().map(parse_query).unwrap_or_default()
    }

    /// The media type declared in the `Content-Type` header, if any.
    ///
    /// A header value that does not parse as a media type is a
    /// [`ParseError::InvalidMediaType`], which surfaces to clients as
    /// `400 Bad Request`.
    pub fn content_type(&self) -> Result<Option<Mime>, ParseError> {
        match self.headers.get(CONTENT_TYPE) {
            None => Ok(None),
            Some(value) => value
                .to_str()
                .map_err(|_| ParseError::InvalidMediaType)?
                .parse::<Mime>()
                .map(Some)
                .map_err(|_| ParseError::InvalidMediaType),
        }
    }

    /// The request body.
    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    /// Replaces the body, for building synthetic requests in tests.
    #[cfg(any(test, feature = "testing"))]
    pub fn set_body(&mut self, body: RequestBody) {
        self.body = body;
    }

    /// Consumes the request, returning its body.
    pub fn into_body(self) -> RequestBody {
        self.body
    }
}

/// A finite, single-consumer stream of request body bytes.
///
/// Reading is bounded: accumulating more than the configured limit yields
/// `413 Payload Too Large`. Once consumed (or partially streamed), a second
/// [`collect`](RequestBody::collect) is an error.
#[derive(Debug)]
pub struct RequestBody {
    inner: Option<Body>,
    limit: usize,
    read: usize,
    streamed: bool,
}

impl RequestBody {
    pub(crate) fn new(body: Body, limit: usize) -> RequestBody {
        RequestBody {
            inner: Some(body),
            limit,
            read: 0,
            streamed: false,
        }
    }

    /// An empty body.
    pub fn empty() -> RequestBody {
        RequestBody::new(Body::empty(), DEFAULT_MAX_BODY_BYTES)
    }

    /// A body over the given bytes, mainly useful in tests.
    pub fn from_bytes<B: Into<Bytes>>(bytes: B) -> RequestBody {
        RequestBody::new(Body::from(bytes.into()), DEFAULT_MAX_BODY_BYTES)
    }

    /// The next chunk, or `None` once the body is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, HttpError>> {
        let body = self.inner.as_mut()?;
        self.streamed = true;
        match body.next().await {
            None => {
                self.inner = None;
                None
            }
            Some(Ok(chunk)) => {
                self.read += chunk.len();
                if self.read > self.limit {
                    self.inner = None;
                    Some(Err(HttpError::payload_too_large()))
                } else {
                    Some(Ok(chunk))
                }
            }
            Some(Err(err)) => {
                self.inner = None;
                Some(Err(HttpError::internal(err)))
            }
        }
    }

    /// Collects the whole body into one buffer, enforcing the size limit.
    pub async fn collect(&mut self) -> Result<Bytes, HttpError> {
        if self.streamed || self.inner.is_none() {
            return Err(HttpError::internal(anyhow::anyhow!(
                "request body already consumed"
            )));
        }
        let mut body = self.inner.take().expect("checked above");
        let mut collected = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(HttpError::internal)?;
            if collected.len() + chunk.len() > self.limit {
                return Err(HttpError::payload_too_large());
            }
            collected.extend_from_slice(&chunk);
        }
        Ok(collected.freeze())
    }

    /// Collects the whole body as UTF-8 text, validating incrementally as
    /// chunks arrive so an invalid prefix fails without buffering the rest.
    ///
    /// Invalid UTF-8 is a [`ParseError::InvalidUtf8`], surfaced to clients
    /// as `400 Bad Request`; the size limit applies as in
    /// [`collect`](RequestBody::collect).
    pub async fn collect_text(&mut self) -> Result<String, HttpError> {
        if self.streamed || self.inner.is_none() {
            return Err(HttpError::internal(anyhow::anyhow!(
                "request body already consumed"
            )));
        }
        let mut body = self.inner.take().expect("checked above");
        let mut validator = Utf8Validator::new();
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(HttpError::internal)?;
            if collected.len() + chunk.len() > self.limit {
                return Err(HttpError::payload_too_large());
            }
            if !validator.feed(&chunk) {
                return Err(ParseError::InvalidUtf8.into());
            }
            collected.extend_from_slice(&chunk);
        }
        if !validator.finish() {
            return Err(ParseError::InvalidUtf8.into());
        }
        String::from_utf8(collected).map_err(|_| ParseError::InvalidUtf8.into())
    }
}
