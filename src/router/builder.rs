//! Route registration and grouping.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use hyper::Method;

use super::tree::segment::RouterPath;
use super::tree::TreeBuilder;
use super::{Route, Router};
use crate::context::RequestContext;
use crate::handler::{Handler, HandlerResponder, HandlerResult, ResponderHandler};
use crate::middleware::{Middleware, Pipeline};
use crate::request::Request;

/// Collects route registrations for [`Router::build`].
///
/// A builder carries the pattern prefix and middleware stack of the scope it
/// was created in; [`scope`](RouterBuilder::scope) opens a nested group with
/// an extended prefix whose routes also inherit the current middleware.
pub struct RouterBuilder {
    prefix: String,
    middlewares: Vec<Arc<dyn Middleware>>,
    routes: Vec<RouteEntry>,
}

struct RouteEntry {
    method: Method,
    pattern: String,
    handler: Arc<dyn Handler>,
}

impl RouterBuilder {
    pub(crate) fn run<F>(f: F) -> Router
    where
        F: FnOnce(&mut RouterBuilder),
    {
        let mut builder = RouterBuilder {
            prefix: String::new(),
            middlewares: Vec::new(),
            routes: Vec::new(),
        };
        f(&mut builder);
        builder.finish()
    }

    /// Registers an asynchronous function for the given method and pattern.
    ///
    /// Registering the same `(method, pattern)` pair twice is a programmer
    /// error and panics when the router is built.
    pub fn request<F, R>(&mut self, method: Method, pattern: &str, handler: F)
    where
        F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
        R: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(method, pattern, Arc::new(handler));
    }

    /// Registers a custom [`Handler`] implementation.
    pub fn request_handler<H: Handler>(&mut self, method: Method, pattern: &str, handler: H) {
        self.add_route(method, pattern, Arc::new(handler));
    }

    fn add_route(&mut self, method: Method, pattern: &str, handler: Arc<dyn Handler>) {
        let full = join_patterns(&self.prefix, pattern);
        let handler = if self.middlewares.is_empty() {
            handler
        } else {
            let pipeline = self
                .middlewares
                .iter()
                .cloned()
                .fold(Pipeline::new(), Pipeline::add_shared);
            let wrapped = pipeline.wrap(Arc::new(HandlerResponder::from_arc(handler)));
            Arc::new(ResponderHandler::new(wrapped))
        };
        self.routes.push(RouteEntry {
            method,
            pattern: full,
            handler,
        });
    }

    /// Registers a `GET` route.
    pub fn get<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
        R: Future<Output = HandlerResult> + Send + 'static,
    {
        self.request(Method::GET, pattern, handler);
    }

    /// Registers a `HEAD` route.
    pub fn head<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
        R: Future<Output = HandlerResult> + Send + 'static,
    {
        self.request(Method::HEAD, pattern, handler);
    }

    /// Registers a `POST` route.
    pub fn post<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
        R: Future<Output = HandlerResult> + Send + 'static,
    {
        self.request(Method::POST, pattern, handler);
    }

    /// Registers a `PUT` route.
    pub fn put<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
        R: Future<Output = HandlerResult> + Send + 'static,
    {
        self.request(Method::PUT, pattern, handler);
    }

    /// Registers a `PATCH` route.
    pub fn patch<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
        R: Future<Output = HandlerResult> + Send + 'static,
    {
        self.request(Method::PATCH, pattern, handler);
    }

    /// Registers a `DELETE` route.
    pub fn delete<F, R>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(Request, RequestContext) -> R + Send + Sync + 'static,
        R: Future<Output = HandlerResult> + Send + 'static,
    {
        self.request(Method::DELETE, pattern, handler);
    }

    /// Adds a middleware scoped to routes registered after this call in the
    /// current group and in groups opened from it.
    pub fn middleware<M: Middleware>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Opens a route group: patterns registered inside are prefixed with
    /// `prefix`, and the group inherits the current middleware stack.
    pub fn scope<F>(&mut self, prefix: &str, f: F)
    where
        F: FnOnce(&mut RouterBuilder),
    {
        let mut inner = RouterBuilder {
            prefix: join_patterns(&self.prefix, prefix),
            middlewares: self.middlewares.clone(),
            routes: Vec::new(),
        };
        f(&mut inner);
        self.routes.append(&mut inner.routes);
    }

    fn finish(self) -> Router {
        let mut seen: HashSet<(Method, String)> = HashSet::new();
        let mut builders: HashMap<Method, TreeBuilder<Route>> = HashMap::new();

        for entry in self.routes {
            if !seen.insert((entry.method.clone(), entry.pattern.clone())) {
                panic!("duplicate route: {} {}", entry.method, entry.pattern);
            }
            builders.entry(entry.method).or_default().add(
                RouterPath::parse(&entry.pattern),
                Route {
                    handler: entry.handler,
                    pattern: Arc::from(entry.pattern.as_str()),
                },
            );
        }

        Router::from_tries(
            builders
                .into_iter()
                .map(|(method, builder)| (method, builder.finalize()))
                .collect(),
        )
    }
}

fn join_patterns(prefix: &str, pattern: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        pattern.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::handler::{HandlerResult, Responder};
    use crate::request::Request;
    use crate::response::Response;
    use hyper::header::HeaderValue;
    use hyper::StatusCode;

    fn ok_handler(_request: Request, context: RequestContext) -> impl std::future::Future<Output = HandlerResult> {
        async move { Ok((context, Response::new(StatusCode::OK))) }
    }

    async fn dispatch(router: &Router, path: &str) -> HandlerResult {
        let request = Request::new(Method::GET, path.parse().unwrap());
        router
            .respond(request, RequestContext::new_for_testing())
            .await
    }

    #[test]
    #[should_panic(expected = "duplicate route")]
    fn duplicate_routes_panic() {
        Router::build(|route| {
            route.get("/dup", ok_handler);
            route.get("/dup", ok_handler);
        });
    }

    #[test]
    fn same_pattern_different_methods_is_fine() {
        Router::build(|route| {
            route.get("/thing", ok_handler);
            route.post("/thing", ok_handler);
        });
    }

    #[tokio::test]
    async fn scopes_prefix_patterns() {
        let router = Router::build(|route| {
            route.get("/top", ok_handler);
            route.scope("/admin", |admin| {
                admin.get("/stats", ok_handler);
                admin.scope("/deep", |deep| {
                    deep.get("/down", ok_handler);
                });
            });
        });

        assert!(dispatch(&router, "/admin/stats").await.is_ok());
        assert!(dispatch(&router, "/admin/deep/down").await.is_ok());
        assert!(dispatch(&router, "/stats").await.is_err());
        let (context, _) = dispatch(&router, "/admin/stats").await.unwrap();
        assert_eq!(context.endpoint_path(), Some("/admin/stats"));
    }

    #[tokio::test]
    async fn scoped_middleware_applies_only_inside_the_scope() {
        let tag = |request: Request, context: RequestContext, next: Arc<dyn Responder>| async move {
            let (context, mut response) = next.respond(request, context).await?;
            response
                .headers_mut()
                .append("scoped", HeaderValue::from_static("yes"));
            Ok((context, response))
        };

        let router = Router::build(move |route| {
            route.get("/outside", ok_handler);
            route.scope("/inside", move |inside| {
                inside.middleware(tag);
                inside.get("/tagged", ok_handler);
            });
        });

        let (_, response) = dispatch(&router, "/inside/tagged").await.unwrap();
        assert_eq!(response.headers().get("scoped").unwrap(), "yes");

        let (_, response) = dispatch(&router, "/outside").await.unwrap();
        assert!(response.headers().get("scoped").is_none());
    }
}
