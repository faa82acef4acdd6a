//! HTTP server and graceful shutdown.
//!
//! # Lifecycle
//!
//! A server moves through three states, each transition logged:
//!
//! ```text
//! Running ──signal──▶ ShuttingDown ──drained or timed out──▶ Stopped
//!    └───────────── listener failure ─────────────────────────▲
//! ```
//!
//! The accept loop runs on its own task and reports its result through a
//! one-shot channel. The controller races that result against the shutdown
//! signal:
//!
//! - **Listener failure**: logged and returned as [`ServerError::Listener`].
//! - **Signal**: the accept loop stops taking connections, every open
//!   connection is asked to finish its in-flight request and close, and the
//!   controller waits up to [`Config::graceful_shutdown`] for the drain. If
//!   the drain does not finish in time the remaining connections are aborted
//!   and [`ServerError::ShutdownTimeout`] is returned.
//!
//! # Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//! Keep `GRACEFUL_SHUTDOWN_TIMEOUT` below that value, and above the duration
//! of your slowest request.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::{RequestMeta, boxed_body};
use crate::error::ServerError;
use crate::recover;
use crate::router::{App, Router};

/// hyper refuses read buffers smaller than this.
const MIN_BUF_SIZE: usize = 8192;

/// Lifecycle state of a [`Server`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Running,
    ShuttingDown,
    Stopped,
}

/// The HTTP server.
pub struct Server {
    config: Config,
    listener: Option<TcpListener>,
}

impl Server {
    /// A server that binds `0.0.0.0:<config.port>` when served.
    ///
    /// ```rust,no_run
    /// use kiln::{Config, Router, Server};
    ///
    /// # async fn run() -> Result<(), kiln::ServerError> {
    /// let config = Config::from_env().expect("invalid configuration");
    /// Server::new(config).serve(Router::new()).await
    /// # }
    /// ```
    pub fn new(config: Config) -> Self {
        Self { config, listener: None }
    }

    /// A server that accepts on an already bound listener. `config.port` is
    /// ignored.
    pub fn from_listener(config: Config, listener: TcpListener) -> Self {
        Self { config, listener: Some(listener) }
    }

    /// Serves `router` until SIGINT or SIGTERM, then shuts down gracefully.
    pub async fn serve(self, router: Router) -> Result<(), ServerError> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves `router` until `signal` resolves, then shuts down gracefully.
    ///
    /// Returns `Ok(())` once every in-flight request has completed.
    pub async fn serve_with_shutdown<F>(self, router: Router, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        recover::install_hook();

        let grace = self.config.graceful_shutdown();
        let app = Arc::new(router.compile(&self.config));
        let settings = Arc::new(ConnSettings::new(&self.config));

        let listener = match self.listener {
            Some(listener) => listener,
            None => {
                let addr = self.config.addr();
                TcpListener::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?
            }
        };
        let addr = listener.local_addr().map_err(ServerError::Listener)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, mut done_rx) = oneshot::channel();
        let accept = tokio::spawn(async move {
            let result = accept_loop(listener, app, settings, stop_rx).await;
            let _ = done_tx.send(result);
        });

        info!(%addr, state = ?State::Running, "kiln listening");

        tokio::pin!(signal);
        tokio::select! {
            biased;

            result = &mut done_rx => {
                let result = result.unwrap_or_else(|_| Err(listener_gone()));
                if let Err(e) = &result {
                    error!(error = %e, "listener failed");
                }
                info!(state = ?State::Stopped, "kiln stopped");
                return result;
            }

            () = &mut signal => {}
        }

        info!(state = ?State::ShuttingDown, grace_secs = grace.as_secs(), "shutdown signal received, draining connections");
        let _ = stop_tx.send(true);

        let result = match tokio::time::timeout(grace, &mut done_rx).await {
            Ok(result) => result.unwrap_or_else(|_| Err(listener_gone())),
            Err(_) => {
                accept.abort();
                error!(grace_secs = grace.as_secs(), "graceful shutdown timed out, aborting open connections");
                Err(ServerError::ShutdownTimeout(grace))
            }
        };

        info!(state = ?State::Stopped, "kiln stopped");
        result
    }
}

fn listener_gone() -> ServerError {
    ServerError::Listener(io::Error::other("listener task ended unexpectedly"))
}

// ── Connections ───────────────────────────────────────────────────────────────

/// Per-connection settings derived from [`Config`].
struct ConnSettings {
    builder: ConnBuilder<TokioExecutor>,
    write_timeout: Option<Duration>,
}

impl ConnSettings {
    fn new(config: &Config) -> Self {
        let mut builder = ConnBuilder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .max_buf_size(config.max_header_bytes().max(MIN_BUF_SIZE));
        if let Some(timeout) = config.read_timeout().or(config.idle_timeout()) {
            builder.http1().header_read_timeout(timeout);
        }
        builder.http2().timer(TokioTimer::new());

        Self { builder, write_timeout: config.write_timeout() }
    }
}

/// Accepts until `stop` flips, then waits for every connection to close.
async fn accept_loop(
    listener: TcpListener,
    app: Arc<App>,
    settings: Arc<ConnSettings>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let mut connections = JoinSet::new();
    let conn_stop = stop.clone();

    loop {
        tokio::select! {
            biased;

            _ = stopped(&mut stop) => break,

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) if is_transient(&e) => {
                        warn!(error = %e, "accept error");
                        // Back off when out of descriptors instead of spinning.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                    Err(e) => return Err(ServerError::Listener(e)),
                };

                connections.spawn(serve_connection(
                    stream,
                    peer,
                    Arc::clone(&app),
                    Arc::clone(&settings),
                    conn_stop.clone(),
                ));
            }

            // Reap finished connections so the set does not grow without bound.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    info!(in_flight = connections.len(), "listener closed");
    while connections.join_next().await.is_some() {}
    Ok(())
}

/// Resolves once `stop` reads `true` or its sender is gone. The `wait_for`
/// guard is dropped before returning.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(e.raw_os_error(), Some(12 | 23 | 24 | 105))
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Arc<App>,
    settings: Arc<ConnSettings>,
    mut stop: watch::Receiver<bool>,
) {
    let write_timeout = settings.write_timeout;
    let shutdown = stop.clone();

    let svc = service_fn(move |req: hyper::Request<Incoming>| {
        let app = Arc::clone(&app);
        let meta = RequestMeta { peer: Some(peer), shutdown: Some(shutdown.clone()), body_timeout: None };
        async move {
            let dispatch = app.dispatch(req.map(boxed_body), meta);
            let res = match write_timeout {
                Some(limit) => tokio::time::timeout(limit, dispatch).await.map_err(|_| {
                    warn!(%peer, timeout_secs = limit.as_secs(), "write timeout exceeded, closing connection");
                    io::Error::new(io::ErrorKind::TimedOut, "write timeout exceeded")
                })?,
                None => dispatch.await,
            };
            Ok::<_, io::Error>(res.into_inner())
        }
    });

    let conn = settings.builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = stopped(&mut stop) => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available. A signal that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = sigterm => info!("received SIGTERM"),
    }
}
