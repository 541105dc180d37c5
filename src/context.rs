//! The per-request context threaded through middleware and handlers.
//!
//! The context is created when a request arrives and travels by value: a
//! handler receives it together with the request and hands it back with the
//! response, so middleware on the return path can still reach the request id,
//! parameters and extensions.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{log, Level};

use crate::codec::{Decoder, Encoder};
use crate::request::Request;
use crate::router::Parameters;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next process-monotonic request id.
pub(crate) fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-request scratchpad: request id, logger, extracted path parameters,
/// the matched endpoint pattern, user extensions, and the selected codecs.
pub struct RequestContext {
    request_id: u64,
    logger: RequestLogger,
    parameters: Parameters,
    endpoint_path: Option<Arc<str>>,
    extensions: Extensions,
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("logger", &self.logger)
            .field("parameters", &self.parameters)
            .field("endpoint_path", &self.endpoint_path)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub(crate) fn new(
        request_id: u64,
        decoder: Arc<dyn Decoder>,
        encoder: Arc<dyn Encoder>,
    ) -> RequestContext {
        RequestContext {
            request_id,
            logger: RequestLogger::new(request_id),
            parameters: Parameters::new(),
            endpoint_path: None,
            extensions: Extensions::new(),
            decoder,
            encoder,
        }
    }

    /// A standalone context with default codecs, for tests and harnesses.
    #[cfg(any(test, feature = "testing"))]
    pub fn new_for_testing() -> RequestContext {
        let codec = Arc::new(crate::codec::JsonCodec);
        RequestContext::new(next_request_id(), codec.clone(), codec)
    }

    /// The process-monotonic id assigned to this request.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// The request-scoped logger.
    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    /// Path parameters extracted by the router.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub(crate) fn set_parameters(&mut self, parameters: Parameters) {
        self.parameters = parameters;
    }

    /// The route pattern the request matched, e.g. `/users/:id`.
    pub fn endpoint_path(&self) -> Option<&str> {
        self.endpoint_path.as_deref()
    }

    pub(crate) fn set_endpoint_path(&mut self, pattern: Arc<str>) {
        self.endpoint_path = Some(pattern);
    }

    /// User extension storage.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable user extension storage.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The request decoder selected for this request.
    pub fn decoder(&self) -> &Arc<dyn Decoder> {
        &self.decoder
    }

    /// The response encoder selected for this request.
    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Decodes a payload with the selected decoder.
    pub fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, crate::error::HttpError> {
        self.decoder.decode(bytes)
    }

    /// Collects the request body and decodes it with the selected decoder.
    ///
    /// The declared `Content-Type` must at least parse as a media type;
    /// malformed values fail with `400 Bad Request` before any of the body
    /// is read.
    pub async fn decode_body(
        &self,
        request: &mut Request,
    ) -> Result<serde_json::Value, crate::error::HttpError> {
        request.content_type()?;
        let bytes = request.body_mut().collect().await?;
        self.decoder.decode(&bytes)
    }

    /// Encodes a value with the selected encoder.
    pub fn encode(
        &self,
        value: &serde_json::Value,
    ) -> Result<bytes::Bytes, crate::error::HttpError> {
        self.encoder.encode(value)
    }
}

/// A value-typed logger carrying per-request metadata over the shared `log`
/// facade. Deriving a new logger (e.g. with a different target) clones.
#[derive(Clone, Debug)]
pub struct RequestLogger {
    request_id: u64,
    target: &'static str,
}

impl RequestLogger {
    fn new(request_id: u64) -> RequestLogger {
        RequestLogger {
            request_id,
            target: "shrike::request",
        }
    }

    /// A clone of this logger emitting under a different target.
    pub fn with_target(&self, target: &'static str) -> RequestLogger {
        RequestLogger {
            request_id: self.request_id,
            target,
        }
    }

    fn emit(&self, level: Level, message: &str) {
        log!(target: self.target, level, "[{}] {}", self.request_id, message);
    }

    /// Logs at trace level, prefixed with the request id.
    pub fn trace(&self, message: &str) {
        self.emit(Level::Trace, message);
    }

    /// Logs at debug level, prefixed with the request id.
    pub fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }

    /// Logs at info level, prefixed with the request id.
    pub fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    /// Logs at warn level, prefixed with the request id.
    pub fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    /// Logs at error level, prefixed with the request id.
    pub fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }
}

/// Provides storage for request-scoped values, one item of each type.
pub struct Extensions {
    data: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Extensions {
    fn new() -> Extensions {
        Extensions {
            data: HashMap::new(),
        }
    }

    /// Puts a value into storage. Successive calls overwrite the existing
    /// value of the same type.
    pub fn put<T: Send + 'static>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Determines whether a value of type `T` is present.
    pub fn has<T: Send + 'static>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    /// Tries to borrow a value from storage.
    pub fn try_borrow<T: Send + 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
    }

    /// Borrows a value from storage.
    ///
    /// # Panics
    ///
    /// If `T` is not present.
    pub fn borrow<T: Send + 'static>(&self) -> &T {
        self.try_borrow()
            .expect("required type is not present in Extensions container")
    }

    /// Tries to mutably borrow a value from storage.
    pub fn try_borrow_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.data
            .get_mut(&TypeId::of::<T>())
            .and_then(|b| b.downcast_mut::<T>())
    }

    /// Mutably borrows a value from storage.
    ///
    /// # Panics
    ///
    /// If `T` is not present.
    pub fn borrow_mut<T: Send + 'static>(&mut self) -> &mut T {
        self.try_borrow_mut()
            .expect("required type is not present in Extensions container")
    }

    /// Tries to move a value out of storage and return ownership.
    pub fn try_take<T: Send + 'static>(&mut self) -> Option<T> {
        self.data
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Moves a value out of storage and returns ownership.
    ///
    /// # Panics
    ///
    /// If `T` is not present.
    pub fn take<T: Send + 'static>(&mut self) -> T {
        self.try_take()
            .expect("required type is not present in Extensions container")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MyData {
        value: i32,
    }

    #[test]
    fn extensions_store_one_item_per_type() {
        let mut extensions = Extensions::new();
        extensions.put(MyData { value: 1 });
        assert!(extensions.has::<MyData>());
        assert_eq!(extensions.borrow::<MyData>().value, 1);

        extensions.put(MyData { value: 100 });
        assert_eq!(extensions.borrow::<MyData>().value, 100);

        extensions.borrow_mut::<MyData>().value += 10;
        assert_eq!(extensions.take::<MyData>().value, 110);
        assert!(!extensions.has::<MyData>());
        assert!(extensions.try_take::<MyData>().is_none());
    }

    #[test]
    fn request_ids_are_monotonic() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }

    #[test]
    fn context_carries_id_and_codecs() {
        let context = RequestContext::new_for_testing();
        assert!(context.request_id() > 0);
        assert_eq!(context.decoder().content_type(), "application/json");
        assert!(context.endpoint_path().is_none());
    }

    #[tokio::test]
    async fn decode_body_applies_the_selected_decoder() {
        use crate::request::RequestBody;
        use hyper::header::{HeaderValue, CONTENT_TYPE};
        use hyper::Method;

        let context = RequestContext::new_for_testing();
        let mut request = Request::new(Method::POST, "/".parse().unwrap());
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.set_body(RequestBody::from_bytes(r#"{"port":8080}"#));

        let value = context.decode_body(&mut request).await.unwrap();
        assert_eq!(value["port"], 8080);
    }

    #[tokio::test]
    async fn decode_body_rejects_malformed_media_types() {
        use hyper::header::{HeaderValue, CONTENT_TYPE};
        use hyper::{Method, StatusCode};

        let context = RequestContext::new_for_testing();
        let mut request = Request::new(Method::POST, "/".parse().unwrap());
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("definitely not a media type"),
        );

        let err = context.decode_body(&mut request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), Some("malformed media type"));
    }
}
