//! The HTTP server service: listener setup, per-connection tasks, and the
//! request dispatcher bridging the wire-level channel to the responder tree.

use std::convert::Infallible;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::header::{HeaderValue, DATE, SERVER};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, StatusCode};
use log::{debug, error, info, trace};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;

use crate::codec::{Decoder, Encoder};
use crate::context::{next_request_id, RequestContext};
use crate::error::StartError;
use crate::handler::Responder;
use crate::request::Request;
use crate::response::Response;
use crate::service::date::DateCache;
use crate::service::{Service, ShutdownToken};

/// Where the server listens.
#[derive(Clone, Debug)]
pub enum Address {
    /// A TCP address in `host:port` form.
    Tcp(String),
    /// A Unix domain socket path.
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

impl Default for Address {
    fn default() -> Self {
        Address::Tcp("127.0.0.1:8080".to_string())
    }
}

impl Address {
    /// A TCP address.
    pub fn tcp<S: Into<String>>(address: S) -> Address {
        Address::Tcp(address.into())
    }

    /// A Unix domain socket address.
    #[cfg(unix)]
    pub fn unix<P: Into<std::path::PathBuf>>(path: P) -> Address {
        Address::Unix(path.into())
    }
}

/// The address the listener actually bound, handed to the
/// `on_server_running` callback.
#[derive(Clone, Debug)]
pub enum BoundAddress {
    /// A bound TCP socket address (port resolved if `0` was requested).
    Tcp(std::net::SocketAddr),
    /// A bound Unix socket path.
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

type RunningCallback = Box<dyn FnOnce(&BoundAddress) + Send>;

/// Socket and header options for the server service.
pub(crate) struct ServerConfig {
    pub(crate) address: Address,
    pub(crate) backlog: u32,
    pub(crate) reuse_address: bool,
    pub(crate) server_name: Option<String>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: Address::default(),
            backlog: 256,
            reuse_address: true,
            server_name: None,
            read_timeout: None,
            write_timeout: None,
            max_body_bytes: crate::request::DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// The HTTP server as a [`Service`].
pub(crate) struct HttpServer {
    config: ServerConfig,
    responder: Arc<dyn Responder>,
    date_cache: Arc<DateCache>,
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
    on_running: Option<RunningCallback>,
}

/// State shared by every connection of one server.
struct SharedState {
    responder: Arc<dyn Responder>,
    date_cache: Arc<DateCache>,
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
    server_name: Option<HeaderValue>,
    write_timeout: Option<Duration>,
    max_body_bytes: usize,
}

impl HttpServer {
    pub(crate) fn new(
        config: ServerConfig,
        responder: Arc<dyn Responder>,
        date_cache: Arc<DateCache>,
        decoder: Arc<dyn Decoder>,
        encoder: Arc<dyn Encoder>,
        on_running: Option<RunningCallback>,
    ) -> HttpServer {
        HttpServer {
            config,
            responder,
            date_cache,
            decoder,
            encoder,
            on_running,
        }
    }

    fn shared(&self) -> Arc<SharedState> {
        Arc::new(SharedState {
            responder: self.responder.clone(),
            date_cache: self.date_cache.clone(),
            decoder: self.decoder.clone(),
            encoder: self.encoder.clone(),
            server_name: self
                .config
                .server_name
                .as_deref()
                .and_then(|name| HeaderValue::from_str(name).ok()),
            write_timeout: self.config.write_timeout,
            max_body_bytes: self.config.max_body_bytes,
        })
    }

    fn protocol(&self) -> Http {
        let mut http = Http::new();
        if let Some(read_timeout) = self.config.read_timeout {
            http.http1_header_read_timeout(read_timeout);
        }
        http
    }
}

impl Service for HttpServer {
    fn name(&self) -> &'static str {
        "http-server"
    }

    fn run(self: Box<Self>, shutdown: ShutdownToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let mut this = *self;
            let shared = this.shared();
            let http = this.protocol();
            let on_running = this.on_running.take();

            match this.config.address.clone() {
                Address::Tcp(address) => {
                    let listener = bind_tcp(&address, this.config.backlog, this.config.reuse_address)?;
                    let local = listener.local_addr()?;
                    info!(target: "shrike::start", "listening on http://{}", local);
                    if let Some(callback) = on_running {
                        callback(&BoundAddress::Tcp(local));
                    }
                    accept_loop(
                        || async { listener.accept().await.map(|(stream, _)| stream) },
                        http,
                        shared,
                        shutdown,
                    )
                    .await
                }
                #[cfg(unix)]
                Address::Unix(path) => {
                    let _ = std::fs::remove_file(&path);
                    let listener = tokio::net::UnixListener::bind(&path)?;
                    info!(target: "shrike::start", "listening on unix socket {}", path.display());
                    if let Some(callback) = on_running {
                        callback(&BoundAddress::Unix(path.clone()));
                    }
                    accept_loop(
                        || async { listener.accept().await.map(|(stream, _)| stream) },
                        http,
                        shared,
                        shutdown,
                    )
                    .await
                }
            }
        })
    }
}

fn bind_tcp(address: &str, backlog: u32, reuse_address: bool) -> Result<TcpListener, StartError> {
    use std::net::ToSocketAddrs;

    let address = address
        .to_socket_addrs()?
        .next()
        .ok_or(StartError::AddressResolution)?;
    let socket = if address.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(reuse_address)?;
    socket.bind(address)?;
    Ok(socket.listen(backlog)?)
}

/// Accepts connections until shutdown, serving each on its own task, then
/// drains in-flight connections.
async fn accept_loop<A, F, S>(
    accept: A,
    http: Http,
    shared: Arc<SharedState>,
    shutdown: ShutdownToken,
) -> anyhow::Result<()>
where
    A: Fn() -> F,
    F: std::future::Future<Output = io::Result<S>>,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = accept() => match accepted {
                Ok(stream) => {
                    connections.spawn(serve_connection(
                        http.clone(),
                        stream,
                        shared.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(err) => {
                    error!(target: "shrike::server", "accept error: {}", err);
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.cancelled() => break,
        }
    }

    info!(
        target: "shrike::server",
        "shutting down; draining {} connection(s)", connections.len()
    );
    while connections.join_next().await.is_some() {}
    Ok(())
}

/// Serves one connection, switching to graceful drain once shutdown fires:
/// in-flight responses complete, new requests on the connection are refused.
async fn serve_connection<S>(http: Http, stream: S, shared: Arc<SharedState>, shutdown: ShutdownToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| dispatch(shared.clone(), req));
    let connection = http.serve_connection(stream, service);
    tokio::pin!(connection);

    let mut draining = false;
    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(err) = result {
                    debug!(target: "shrike::server", "connection error: {}", err);
                }
                break;
            }
            _ = shutdown.cancelled(), if !draining => {
                connection.as_mut().graceful_shutdown();
                draining = true;
            }
        }
    }
}

/// Per-request entry point: build the request and context, trap panics,
/// translate errors, and attach the `Date` and `Server` headers.
async fn dispatch(
    shared: Arc<SharedState>,
    req: hyper::Request<Body>,
) -> Result<hyper::Response<Body>, Infallible> {
    let request_id = next_request_id();
    let head_request = req.method() == Method::HEAD;
    let request = Request::from_hyper(req, shared.max_body_bytes);
    let context = RequestContext::new(request_id, shared.decoder.clone(), shared.encoder.clone());

    trace!(
        target: "shrike::server",
        "[{}] dispatching {} {}", request_id, request.method(), request.path()
    );

    let outcome =
        match std::panic::catch_unwind(AssertUnwindSafe(|| shared.responder.respond(request, context))) {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };

    let mut response = match outcome {
        Ok(Ok((_context, response))) => response,
        Ok(Err((context, err))) => {
            if err.status().is_server_error() {
                match err.cause() {
                    Some(cause) => context
                        .logger()
                        .debug(&format!("request failed: {} ({:#})", err, cause)),
                    None => context.logger().debug(&format!("request failed: {}", err)),
                }
            } else {
                context.logger().trace(&format!("request failed: {}", err));
            }
            err.into_response()
        }
        Err(_) => {
            error!(target: "shrike::server", "[{}] panic while handling request", request_id);
            Response::new(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    let date = shared.date_cache.current();
    let headers = response.headers_mut();
    if !headers.contains_key(DATE) {
        if let Ok(value) = HeaderValue::from_str(&date) {
            headers.insert(DATE, value);
        }
    }
    if let Some(server_name) = &shared.server_name {
        if !headers.contains_key(SERVER) {
            headers.insert(SERVER, server_name.clone());
        }
    }

    Ok(response.into_hyper(head_request, shared.write_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::router::Router;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn test_server(
        router: Router,
        server_name: Option<&str>,
    ) -> (HttpServer, oneshot::Receiver<std::net::SocketAddr>) {
        let (tx, rx) = oneshot::channel();
        let codec = Arc::new(JsonCodec);
        let config = ServerConfig {
            address: Address::tcp("127.0.0.1:0"),
            server_name: server_name.map(str::to_string),
            ..ServerConfig::default()
        };
        let server = HttpServer::new(
            config,
            Arc::new(router),
            DateCache::new(),
            codec.clone(),
            codec,
            Some(Box::new(move |bound| {
                if let BoundAddress::Tcp(addr) = bound {
                    let _ = tx.send(*addr);
                }
            })),
        );
        (server, rx)
    }

    async fn raw_request(addr: std::net::SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.unwrap();
        String::from_utf8_lossy(&buffer).into_owned()
    }

    #[tokio::test]
    async fn serves_requests_end_to_end() {
        let router = Router::build(|route| {
            route.get("/hello", |_request, context: RequestContext| async move {
                Ok((context, Response::text("hello, world")))
            });
        });
        let (server, bound) = test_server(router, Some("shrike-test"));

        let shutdown = ShutdownToken::standalone();
        let handle = tokio::spawn(Box::new(server).run(shutdown.clone()));
        let addr = bound.await.unwrap();

        let reply = raw_request(
            addr,
            "GET /hello HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
        )
        .await;

        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "reply: {}", reply);
        assert!(reply.to_ascii_lowercase().contains("\r\ndate: "));
        assert!(reply.to_ascii_lowercase().contains("\r\nserver: shrike-test"));
        assert!(reply.ends_with("hello, world"));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unmatched_requests_get_404_and_errors_get_500() {
        let router = Router::build(|route| {
            route.get("/panic", |_request, context: RequestContext| async move {
                let response: Option<Response> = None;
                Ok((context, response.expect("test panic")))
            });
        });
        let (server, bound) = test_server(router, None);

        let shutdown = ShutdownToken::standalone();
        let handle = tokio::spawn(Box::new(server).run(shutdown.clone()));
        let addr = bound.await.unwrap();

        let reply = raw_request(
            addr,
            "GET /missing HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 404 "), "reply: {}", reply);

        let reply = raw_request(
            addr,
            "GET /panic HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 500 "), "reply: {}", reply);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_the_accept_loop() {
        let router = Router::build(|_| {});
        let (server, bound) = test_server(router, None);

        let shutdown = ShutdownToken::standalone();
        let handle = tokio::spawn(Box::new(server).run(shutdown.clone()));
        let addr = bound.await.unwrap();

        // Hold an idle connection open across shutdown.
        let _idle = TcpStream::connect(addr).await.unwrap();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should drain promptly")
            .unwrap()
            .unwrap();
    }
}
