//! Shrike &ndash; a lightweight, asynchronous HTTP server framework built
//! around a serialized-trie router.
//!
//! The pieces compose in one direction: a [`Router`](router::Router) resolves
//! paths to handlers, a [`Pipeline`](middleware::Pipeline) of middleware
//! wraps the router, and an [`Application`](app::Application) runs the
//! resulting responder behind an HTTP listener alongside auxiliary services
//! with graceful shutdown.
#![warn(missing_docs, deprecated)]

pub mod app;
pub mod codec;
pub mod context;
pub mod error;
pub mod handler;
pub mod helpers;
pub mod middleware;
pub mod prelude;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod service;

pub use crate::app::Application;
pub use crate::error::HttpError;
pub use crate::request::Request;
pub use crate::response::Response;
pub use crate::router::Router;
