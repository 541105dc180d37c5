//! Defines types for `Middleware`, a reusable unit of logic wrapped around a
//! responder, and the `Pipeline` that composes an ordered middleware stack.
//!
//! A middleware sees the request on the way in and the response on the way
//! out. It may short-circuit by responding without calling `next`, transform
//! the response (headers appended on the return path appear outermost-last in
//! append order), or catch and translate downstream errors.

pub mod files;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::handler::{HandlerFuture, Responder};
use crate::request::Request;

/// `Middleware` wraps the downstream rest of the pipeline.
///
/// To pass the request on, invoke `next.respond`; to short-circuit, resolve
/// to a response (or error) without doing so.
pub trait Middleware: Send + Sync + 'static {
    /// Entry point to the middleware.
    fn call(
        &self,
        request: Request,
        context: RequestContext,
        next: Arc<dyn Responder>,
    ) -> Pin<Box<HandlerFuture>>;
}

impl<F, R> Middleware for F
where
    F: Fn(Request, RequestContext, Arc<dyn Responder>) -> R + Send + Sync + 'static,
    R: Future<Output = crate::handler::HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        request: Request,
        context: RequestContext,
        next: Arc<dyn Responder>,
    ) -> Pin<Box<HandlerFuture>> {
        Box::pin(self(request, context, next))
    }
}

/// An ordered middleware stack, composed around a terminal responder at
/// build time.
///
/// `Pipeline::new().add(m1).add(m2).wrap(terminal)` produces a responder
/// equivalent to `m1(m2(terminal))`: the first middleware added is the
/// outermost.
#[derive(Default)]
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// An empty pipeline.
    pub fn new() -> Pipeline {
        Pipeline {
            middlewares: Vec::new(),
        }
    }

    /// Appends a middleware to the stack (one layer further inward).
    pub fn add<M: Middleware>(mut self, middleware: M) -> Pipeline {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub(crate) fn add_shared(mut self, middleware: Arc<dyn Middleware>) -> Pipeline {
        self.middlewares.push(middleware);
        self
    }

    /// True when no middleware has been added.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Right-folds the stack over the terminal responder.
    pub fn wrap(self, terminal: Arc<dyn Responder>) -> Arc<dyn Responder> {
        self.middlewares
            .into_iter()
            .rev()
            .fold(terminal, |next, middleware| {
                Arc::new(Link { middleware, next })
            })
    }
}

/// One composed layer: a middleware plus everything downstream of it.
struct Link {
    middleware: Arc<dyn Middleware>,
    next: Arc<dyn Responder>,
}

impl Responder for Link {
    fn respond(&self, request: Request, context: RequestContext) -> Pin<Box<HandlerFuture>> {
        self.middleware.call(request, context, self.next.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::handler::{HandlerResponder, HandlerResult};
    use crate::response::Response;
    use hyper::header::HeaderValue;
    use hyper::{Method, StatusCode};

    /// Appends its tag to the `middleware` response header on the return
    /// path.
    struct Tag(&'static str);

    impl Middleware for Tag {
        fn call(
            &self,
            request: Request,
            context: RequestContext,
            next: Arc<dyn Responder>,
        ) -> Pin<Box<HandlerFuture>> {
            let tag = self.0;
            Box::pin(async move {
                let (context, mut response) = next.respond(request, context).await?;
                response
                    .headers_mut()
                    .append("middleware", HeaderValue::from_static(tag));
                Ok((context, response))
            })
        }
    }

    fn terminal() -> Arc<dyn Responder> {
        Arc::new(HandlerResponder::new(
            |_request: Request, context: RequestContext| async move {
                Ok((context, Response::new(StatusCode::ACCEPTED)))
            },
        ))
    }

    async fn run(responder: Arc<dyn Responder>) -> HandlerResult {
        let request = Request::new(Method::GET, "/".parse().unwrap());
        responder
            .respond(request, RequestContext::new_for_testing())
            .await
    }

    #[tokio::test]
    async fn return_path_headers_appear_innermost_first() {
        let responder = Pipeline::new()
            .add(Tag("m1"))
            .add(Tag("m2"))
            .add(Tag("m3"))
            .wrap(terminal());

        let (_, response) = run(responder).await.unwrap();
        let tags: Vec<_> = response
            .headers()
            .get_all("middleware")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(tags, vec!["m3", "m2", "m1"]);
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let gate = |_request: Request, context: RequestContext, _next: Arc<dyn Responder>| async move {
            Err((context, HttpError::new(StatusCode::UNAUTHORIZED)))
        };
        let responder = Pipeline::new().add(gate).wrap(terminal());
        let (_, err) = run(responder).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn middleware_can_catch_downstream_errors() {
        let failing: Arc<dyn Responder> = Arc::new(HandlerResponder::new(
            |_request: Request, context: RequestContext| async move {
                Err((context, HttpError::not_found()))
            },
        ));
        let recover = |request: Request, context: RequestContext, next: Arc<dyn Responder>| async move {
            match next.respond(request, context).await {
                Err((context, err)) if err.is_not_found() => {
                    Ok((context, Response::new(StatusCode::NO_CONTENT)))
                }
                other => other,
            }
        };
        let responder = Pipeline::new().add(recover).wrap(failing);
        let (_, response) = run(responder).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn empty_pipeline_is_the_terminal() {
        let responder = Pipeline::new().wrap(terminal());
        let (_, response) = run(responder).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
