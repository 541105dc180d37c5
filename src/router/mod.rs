//! Routing for `Request`s: maps `(method, path)` to a handler, extracting
//! path parameters along the way.

mod builder;
mod params;
pub(crate) mod tree;

pub use self::builder::RouterBuilder;
pub use self::params::{Parameters, CATCH_ALL_KEY};

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use hyper::Method;

use self::tree::Tree;
use crate::context::RequestContext;
use crate::error::HttpError;
use crate::handler::{Handler, HandlerFuture, Responder};
use crate::request::Request;

pub(crate) struct Route {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) pattern: Arc<str>,
}

/// Routes requests to handlers via one serialized trie per HTTP method.
///
/// The router is immutable once built and shared without locks. It is a
/// [`Responder`], so it slots in as the terminal of a middleware pipeline.
pub struct Router {
    tries: HashMap<Method, Tree<Route>>,
}

impl Router {
    /// Builds a router from registrations made through the closure.
    ///
    /// ```ignore
    /// let router = Router::build(|route| {
    ///     route.get("/users/:id", user_handler);
    ///     route.get("/files/**", file_listing);
    /// });
    /// ```
    pub fn build<F>(f: F) -> Router
    where
        F: FnOnce(&mut RouterBuilder),
    {
        RouterBuilder::run(f)
    }

    pub(crate) fn from_tries(tries: HashMap<Method, Tree<Route>>) -> Router {
        Router { tries }
    }
}

impl Responder for Router {
    fn respond(&self, request: Request, mut context: RequestContext) -> Pin<Box<HandlerFuture>> {
        let resolved = self
            .tries
            .get(request.method())
            .and_then(|tree| tree.resolve(request.path()));

        match resolved {
            Some((route, parameters)) => {
                context
                    .logger()
                    .trace(&format!("matched route {}", route.pattern));
                context.set_parameters(parameters);
                context.set_endpoint_path(route.pattern.clone());
                let handler = route.handler.clone();
                handler.handle(request, context)
            }
            None => {
                context.logger().trace("no matching route");
                Box::pin(async move { Err((context, HttpError::not_found())) })
            }
        }
    }
}
