//! Long-running services and the group that supervises them.
//!
//! An application is a set of cooperating services: the HTTP server, the
//! date cache, and whatever the user adds (connection pools, queue
//! consumers). The group runs each service on its own task, broadcasts
//! shutdown through a shared cancellation token when a configured signal
//! arrives or any service exits, then joins the rest within a grace period.

pub mod date;

use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Signals that trigger graceful shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM.
    Terminate,
    /// SIGINT.
    Interrupt,
    /// SIGHUP.
    Hangup,
    /// SIGQUIT.
    Quit,
}

/// A cooperative shutdown handle shared by every service in a group.
///
/// Services observe the token at their suspension points and return from
/// `run` once it fires.
#[derive(Clone)]
pub struct ShutdownToken {
    token: CancellationToken,
}

impl ShutdownToken {
    pub(crate) fn child_of(parent: &CancellationToken) -> ShutdownToken {
        ShutdownToken {
            token: parent.child_token(),
        }
    }

    /// A standalone token, useful for driving a service directly in tests.
    pub fn standalone() -> ShutdownToken {
        ShutdownToken {
            token: CancellationToken::new(),
        }
    }

    /// Resolves when shutdown has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// True once shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Requests shutdown on this token (and its children).
    pub fn cancel(&self) {
        self.token.cancel()
    }
}

/// A long-running unit of the application.
pub trait Service: Send + 'static {
    /// Name used in lifecycle logging.
    fn name(&self) -> &'static str {
        "service"
    }

    /// Runs until completion or until `shutdown` fires. Returning (or
    /// failing) causes the whole group to shut down.
    fn run(self: Box<Self>, shutdown: ShutdownToken) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Builds a service from a closure.
pub fn service_fn<F, Fut>(name: &'static str, f: F) -> impl Service
where
    F: FnOnce(ShutdownToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnService { name, f }
}

struct FnService<F> {
    name: &'static str,
    f: F,
}

impl<F, Fut> Service for FnService<F>
where
    F: FnOnce(ShutdownToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(self: Box<Self>, shutdown: ShutdownToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self.f)(shutdown))
    }
}

/// A service gated on a one-shot precondition.
///
/// `run` awaits `pre` to completion, then delegates to the inner service.
/// The application uses this to hold the HTTP server back until the
/// `before_server_start` callbacks finish while other services are already
/// running.
pub struct Precursor {
    pre: BoxFuture<'static, anyhow::Result<()>>,
    inner: Box<dyn Service>,
}

impl Precursor {
    /// Wraps `inner` behind the `pre` future.
    pub fn new<F, S>(pre: F, inner: S) -> Precursor
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
        S: Service,
    {
        Precursor {
            pre: Box::pin(pre),
            inner: Box::new(inner),
        }
    }

    pub(crate) fn from_boxed<F>(pre: F, inner: Box<dyn Service>) -> Precursor
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Precursor {
            pre: Box::pin(pre),
            inner,
        }
    }
}

impl Service for Precursor {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn run(self: Box<Self>, shutdown: ShutdownToken) -> BoxFuture<'static, anyhow::Result<()>> {
        let Precursor { pre, inner } = *self;
        Box::pin(async move {
            tokio::select! {
                result = pre => result?,
                _ = shutdown.cancelled() => return Ok(()),
            }
            inner.run(shutdown).await
        })
    }
}

/// Runs a set of services concurrently with shared graceful shutdown.
pub struct ServiceGroup {
    services: Vec<Box<dyn Service>>,
    signals: Vec<ShutdownSignal>,
    grace: Duration,
}

impl Default for ServiceGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceGroup {
    /// An empty group listening for SIGTERM and SIGINT, with a 30 second
    /// grace period.
    pub fn new() -> ServiceGroup {
        ServiceGroup {
            services: Vec::new(),
            signals: vec![ShutdownSignal::Terminate, ShutdownSignal::Interrupt],
            grace: Duration::from_secs(30),
        }
    }

    /// Replaces the shutdown signal set.
    pub fn with_signals(mut self, signals: Vec<ShutdownSignal>) -> ServiceGroup {
        self.signals = signals;
        self
    }

    /// Replaces the grace period allowed for draining after shutdown begins.
    pub fn with_grace_period(mut self, grace: Duration) -> ServiceGroup {
        self.grace = grace;
        self
    }

    /// Adds a service to the group.
    pub fn add<S: Service>(mut self, service: S) -> ServiceGroup {
        self.services.push(Box::new(service));
        self
    }

    pub(crate) fn add_boxed(mut self, service: Box<dyn Service>) -> ServiceGroup {
        self.services.push(service);
        self
    }

    /// Runs every service to completion.
    ///
    /// The first service to return or fail, or the first configured signal,
    /// cancels the shared token; remaining services then have the grace
    /// period to finish. The first error observed is the group's result.
    pub async fn run(self) -> anyhow::Result<()> {
        if self.services.is_empty() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let mut running: FuturesUnordered<JoinHandle<(&'static str, anyhow::Result<()>)>> =
            FuturesUnordered::new();
        for service in self.services {
            let name = service.name();
            let shutdown = ShutdownToken::child_of(&token);
            info!(target: "shrike::services", "starting service {}", name);
            running.push(tokio::spawn(async move { (name, service.run(shutdown).await) }));
        }

        let signal_listener = spawn_signal_listener(self.signals, token.clone());

        let mut outcome: anyhow::Result<()> = Ok(());
        if let Some(joined) = running.next().await {
            let result = record_exit(joined);
            if outcome.is_ok() {
                outcome = result;
            }
        }
        token.cancel();

        let drain = async {
            let mut first_failure: anyhow::Result<()> = Ok(());
            while let Some(joined) = running.next().await {
                let result = record_exit(joined);
                if first_failure.is_ok() {
                    first_failure = result;
                }
            }
            first_failure
        };
        match tokio::time::timeout(self.grace, drain).await {
            Ok(drained) => {
                if outcome.is_ok() {
                    outcome = drained;
                }
            }
            Err(_) => {
                warn!(
                    target: "shrike::services",
                    "graceful shutdown deadline exceeded; abandoning remaining services"
                );
            }
        }

        signal_listener.abort();
        outcome
    }
}

fn record_exit(
    joined: Result<(&'static str, anyhow::Result<()>), tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match joined {
        Ok((name, Ok(()))) => {
            info!(target: "shrike::services", "service {} finished", name);
            Ok(())
        }
        Ok((name, Err(err))) => {
            error!(target: "shrike::services", "service {} failed: {:#}", name, err);
            Err(err)
        }
        Err(join_err) => {
            error!(target: "shrike::services", "service task aborted: {}", join_err);
            Err(anyhow::Error::new(join_err))
        }
    }
}

#[cfg(unix)]
fn spawn_signal_listener(signals: Vec<ShutdownSignal>, token: CancellationToken) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    fn kind(s: ShutdownSignal) -> SignalKind {
        match s {
            ShutdownSignal::Terminate => SignalKind::terminate(),
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Hangup => SignalKind::hangup(),
            ShutdownSignal::Quit => SignalKind::quit(),
        }
    }

    tokio::spawn(async move {
        let mut streams: Vec<_> = signals
            .into_iter()
            .filter_map(|s| signal(kind(s)).ok())
            .collect();
        if streams.is_empty() {
            return;
        }
        let waits: Vec<_> = streams.iter_mut().map(|s| Box::pin(s.recv())).collect();
        futures_util::future::select_all(waits).await;
        info!(target: "shrike::services", "shutdown signal received");
        token.cancel();
    })
}

#[cfg(not(unix))]
fn spawn_signal_listener(_signals: Vec<ShutdownSignal>, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "shrike::services", "shutdown signal received");
            token.cancel();
        }
    })
}
