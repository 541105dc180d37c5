//! A collection of commonly used types and traits, for glob import.

pub use crate::app::{Application, ApplicationBuilder};
pub use crate::codec::{Decoder, Encoder, JsonCodec};
pub use crate::context::RequestContext;
pub use crate::error::{HttpError, ParseError};
pub use crate::handler::{Handler, HandlerResult, Responder};
pub use crate::middleware::files::{FileMiddleware, FileProvider, LocalFileProvider};
pub use crate::middleware::{Middleware, Pipeline};
pub use crate::request::{Request, RequestBody};
pub use crate::response::{BodyWriter, Response, ResponseBody};
pub use crate::router::{Parameters, Router, RouterBuilder};
pub use crate::server::{Address, BoundAddress};
pub use crate::service::{
    Precursor, Service, ServiceGroup, ShutdownSignal, ShutdownToken,
};
