//! Application assembly: binds the responder tree, server configuration and
//! auxiliary services together and runs the whole group.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use log::LevelFilter;

use crate::codec::{Decoder, Encoder, JsonCodec};
use crate::handler::Responder;
use crate::middleware::{Middleware, Pipeline};
use crate::request::DEFAULT_MAX_BODY_BYTES;
use crate::router::Router;
use crate::server::{Address, BoundAddress, HttpServer, ServerConfig};
use crate::service::date::{DateCache, DateCacheService};
use crate::service::{Precursor, Service, ServiceGroup, ShutdownSignal};

/// A fully assembled application, ready to run.
///
/// ```ignore
/// let router = Router::build(|route| {
///     route.get("/health", health_handler);
/// });
///
/// Application::builder()
///     .address(Address::tcp("0.0.0.0:8080"))
///     .router(router)
///     .build()
///     .start()?;
/// ```
pub struct Application {
    builder: ApplicationBuilder,
}

/// Collects everything an [`Application`] needs.
pub struct ApplicationBuilder {
    router: Option<Router>,
    pipeline: Pipeline,
    address: Address,
    backlog: u32,
    reuse_address: bool,
    server_name: Option<String>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_body_bytes: usize,
    log_level: Option<LevelFilter>,
    shutdown_signals: Vec<ShutdownSignal>,
    graceful_deadline: Duration,
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
    services: Vec<Box<dyn Service>>,
    before_server_start: Vec<BoxFuture<'static, anyhow::Result<()>>>,
    on_server_running: Option<Box<dyn FnOnce(&BoundAddress) + Send>>,
}

impl Application {
    /// Starts assembling an application.
    pub fn builder() -> ApplicationBuilder {
        let codec = Arc::new(JsonCodec);
        ApplicationBuilder {
            router: None,
            pipeline: Pipeline::new(),
            address: Address::default(),
            backlog: 256,
            reuse_address: true,
            server_name: None,
            read_timeout: None,
            write_timeout: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_level: None,
            shutdown_signals: vec![ShutdownSignal::Terminate, ShutdownSignal::Interrupt],
            graceful_deadline: Duration::from_secs(30),
            decoder: codec.clone(),
            encoder: codec,
            services: Vec::new(),
            before_server_start: Vec::new(),
            on_server_running: None,
        }
    }

    /// Runs the application on the current runtime until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let builder = self.builder;

        log::set_max_level(resolve_log_level(builder.log_level));

        let router = builder.router.unwrap_or_else(|| Router::build(|_| {}));
        let responder: Arc<dyn Responder> = builder.pipeline.wrap(Arc::new(router));

        let date_cache = DateCache::new();
        let server = HttpServer::new(
            ServerConfig {
                address: builder.address,
                backlog: builder.backlog,
                reuse_address: builder.reuse_address,
                server_name: builder.server_name,
                read_timeout: builder.read_timeout,
                write_timeout: builder.write_timeout,
                max_body_bytes: builder.max_body_bytes,
            },
            responder,
            date_cache.clone(),
            builder.decoder,
            builder.encoder,
            builder.on_server_running,
        );

        let preludes = builder.before_server_start;
        let prelude = async move {
            for step in preludes {
                step.await?;
            }
            Ok(())
        };

        let mut group = ServiceGroup::new()
            .with_signals(builder.shutdown_signals)
            .with_grace_period(builder.graceful_deadline);
        for service in builder.services {
            group = group.add_boxed(service);
        }
        group = group
            .add(DateCacheService::new(date_cache))
            .add_boxed(Box::new(Precursor::from_boxed(prelude, Box::new(server))));

        group.run().await
    }

    /// Builds a multi-threaded runtime (one worker per CPU) and blocks on
    /// [`run`](Application::run).
    pub fn start(self) -> anyhow::Result<()> {
        new_runtime(num_cpus::get())?.block_on(self.run())
    }
}

impl ApplicationBuilder {
    /// The responder tree's router.
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Adds an application-wide middleware; the first added is outermost.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.pipeline = self.pipeline.add(middleware);
        self
    }

    /// The listen address. Defaults to `127.0.0.1:8080`.
    pub fn address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// The listener backlog. Defaults to 256.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Whether to set `SO_REUSEADDR` on the listener. Defaults to true.
    pub fn reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    /// A `Server` header value attached to responses that set none.
    pub fn server_name<S: Into<String>>(mut self, name: S) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Idle timeouts: how long to wait for request headers, and how long a
    /// response chunk may wait on a stalled client.
    pub fn idle_timeouts(
        mut self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Ceiling on collected request body size. Defaults to 2 MiB.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// The `log` facade's maximum level. When unset, the `LOG_LEVEL`
    /// environment variable applies, then `info`.
    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = Some(level);
        self
    }

    /// The signals that trigger graceful shutdown. Defaults to SIGTERM and
    /// SIGINT.
    pub fn shutdown_signals(mut self, signals: Vec<ShutdownSignal>) -> Self {
        self.shutdown_signals = signals;
        self
    }

    /// How long in-flight work may keep running after shutdown begins.
    pub fn graceful_deadline(mut self, deadline: Duration) -> Self {
        self.graceful_deadline = deadline;
        self
    }

    /// Replaces the default request decoder.
    pub fn decoder<D: Decoder>(mut self, decoder: D) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Replaces the default response encoder.
    pub fn encoder<E: Encoder>(mut self, encoder: E) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    /// Adds an auxiliary service run alongside the server.
    pub fn service<S: Service>(mut self, service: S) -> Self {
        self.services.push(Box::new(service));
        self
    }

    /// Defers server start until this future completes. Steps run in
    /// registration order; other services are already running while they do.
    pub fn before_server_start<F>(mut self, prelude: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.before_server_start.push(Box::pin(prelude));
        self
    }

    /// Invoked with the bound address once the listener is ready.
    pub fn on_server_running<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&BoundAddress) + Send + 'static,
    {
        self.on_server_running = Some(Box::new(callback));
        self
    }

    /// Finishes assembly.
    pub fn build(self) -> Application {
        Application { builder: self }
    }
}

fn new_runtime(threads: usize) -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name("shrike-worker")
        .enable_all()
        .build()
        .map_err(Into::into)
}

/// Explicit configuration wins; otherwise the `LOG_LEVEL` environment
/// variable applies (key matched case-insensitively), then `info`.
fn resolve_log_level(configured: Option<LevelFilter>) -> LevelFilter {
    if let Some(level) = configured {
        return level;
    }
    std::env::vars()
        .find(|(key, _)| key.eq_ignore_ascii_case("LOG_LEVEL"))
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_resolution_prefers_configuration() {
        assert_eq!(
            resolve_log_level(Some(LevelFilter::Trace)),
            LevelFilter::Trace
        );
    }

    #[test]
    fn log_level_falls_back_to_the_environment_then_info() {
        std::env::remove_var("LOG_LEVEL");
        std::env::remove_var("log_level");
        assert_eq!(resolve_log_level(None), LevelFilter::Info);

        std::env::set_var("LOG_LEVEL", "Debug");
        assert_eq!(resolve_log_level(None), LevelFilter::Debug);
        std::env::remove_var("LOG_LEVEL");
    }

    #[tokio::test]
    async fn an_application_assembles_with_defaults() {
        // Building must not require a router or any optional piece.
        let app = Application::builder().build();
        // Nothing to assert beyond construction; running would bind a socket.
        drop(app);
    }
}
