//! Defines types for handlers and the responder contract they plug into.
//!
//! A `Handler` is the terminal piece of request processing: an asynchronous
//! function from a request and its context to a response. The request context
//! threads through by value and comes back with the result, so the layers
//! above a handler keep access to the request id, parameters and extensions
//! on the way out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;

/// The outcome of a handler or responder: context plus response on success,
/// context plus error on failure.
pub type HandlerResult = Result<(RequestContext, Response), (RequestContext, HttpError)>;

/// The boxed future produced by handlers and responders.
pub type HandlerFuture = dyn Future<Output = HandlerResult> + Send;

/// A `Handler` receives some subset of requests to the application and
/// returns a future which resolves to a response.
///
/// Any `async fn(Request, RequestContext) -> HandlerResult` is a handler:
///
/// ```ignore
/// async fn hello(_request: Request, context: RequestContext) -> HandlerResult {
///     Ok((context, Response::text("hello")))
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles the request, returning a boxed future which resolves to a
    /// response.
    fn handle(&self, request: Request, context: RequestContext) -> Pin<Box<HandlerFuture>>;
}

impl<F, R> Handler for F
where
    F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
    R: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, request: Request, context: RequestContext) -> Pin<Box<HandlerFuture>> {
        Box::pin(self(request, context))
    }
}

/// A composed endpoint: a router, or a router wrapped in middleware.
///
/// The application invokes one responder per request; middleware composition
/// builds responders out of responders.
pub trait Responder: Send + Sync + 'static {
    /// Produces the response for a request.
    fn respond(&self, request: Request, context: RequestContext) -> Pin<Box<HandlerFuture>>;
}

/// Adapts a bare handler into a responder, for use as a pipeline terminal.
pub struct HandlerResponder {
    handler: Arc<dyn Handler>,
}

impl HandlerResponder {
    /// Wraps the given handler.
    pub fn new<H: Handler>(handler: H) -> HandlerResponder {
        HandlerResponder {
            handler: Arc::new(handler),
        }
    }

    pub(crate) fn from_arc(handler: Arc<dyn Handler>) -> HandlerResponder {
        HandlerResponder { handler }
    }
}

impl Responder for HandlerResponder {
    fn respond(&self, request: Request, context: RequestContext) -> Pin<Box<HandlerFuture>> {
        self.handler.handle(request, context)
    }
}

/// Adapts a responder back into a handler, so a middleware-wrapped subtree
/// can be registered as a route target.
pub(crate) struct ResponderHandler {
    responder: Arc<dyn Responder>,
}

impl ResponderHandler {
    pub(crate) fn new(responder: Arc<dyn Responder>) -> ResponderHandler {
        ResponderHandler { responder }
    }
}

impl Handler for ResponderHandler {
    fn handle(&self, request: Request, context: RequestContext) -> Pin<Box<HandlerFuture>> {
        self.responder.respond(request, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{Method, StatusCode};

    async fn hello(_request: Request, context: RequestContext) -> HandlerResult {
        Ok((context, Response::text("hello")))
    }

    #[tokio::test]
    async fn async_fns_are_handlers() {
        let responder = HandlerResponder::new(hello);
        let request = Request::new(Method::GET, "/".parse().unwrap());
        let (_, response) = responder
            .respond(request, RequestContext::new_for_testing())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let responder = HandlerResponder::new(|_request: Request, context: RequestContext| async move {
            Err((context, HttpError::not_found()))
        });
        let request = Request::new(Method::GET, "/".parse().unwrap());
        let (_, err) = responder
            .respond(request, RequestContext::new_for_testing())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
