//! Dual-transport listener
//!
//! One plaintext and one TLS listener feed the same service function.
//! Both speak HTTP/1.1 and HTTP/2 and accept WebSocket upgrades for the
//! latency channel. Startup fails as a whole: no listener is started
//! unless the web root, the TLS material and both ports are all usable.

use crate::latency::{self, LatencyChannel};
use crate::response::HyperBody;
use crate::{Dispatcher, Error, Request, Result, ServerConfig};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Create a TCP socket with optimizations
///
/// No SO_REUSEPORT: a second process on the same port must fail to bind.
pub fn create_optimized_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(socket)
}

fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let listener = create_optimized_socket(&addr)
        .and_then(|socket| {
            let std_listener: std::net::TcpListener = socket.into();
            std_listener.set_nonblocking(true)?;
            TcpListener::from_std(std_listener)
        })
        .map_err(|source| Error::Bind { addr, source })?;
    Ok(listener)
}

/// Tracks active connections for graceful shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Connections currently being served
    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no connection is active
    ///
    /// Returns false if `timeout` elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.count() == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// State shared by every connection task
struct State {
    dispatcher: Dispatcher,
    latency: Arc<dyn LatencyChannel>,
    tracker: Arc<ConnectionTracker>,
}

/// Bound, not yet serving, pair of listeners
pub struct Server {
    http: TcpListener,
    https: TcpListener,
    http_addr: SocketAddr,
    https_addr: SocketAddr,
    acceptor: TlsAcceptor,
    state: Arc<State>,
    drain_timeout: Duration,
}

impl Server {
    /// Validate the environment and bind both ports
    pub async fn bind(
        config: &ServerConfig,
        dispatcher: Dispatcher,
        latency: Arc<dyn LatencyChannel>,
    ) -> Result<Self> {
        config.check_web_root()?;

        let acceptor = config.tls.build_acceptor()?;

        let http = bind_listener(config.http_addr()?)?;
        let https = bind_listener(config.https_addr()?)?;
        let http_addr = http.local_addr()?;
        let https_addr = https.local_addr()?;

        Ok(Self {
            http,
            https,
            http_addr,
            https_addr,
            acceptor,
            state: Arc::new(State {
                dispatcher,
                latency,
                tracker: Arc::new(ConnectionTracker::new()),
            }),
            drain_timeout: config.drain_timeout,
        })
    }

    /// Bound plaintext and TLS addresses
    pub fn local_addrs(&self) -> (SocketAddr, SocketAddr) {
        (self.http_addr, self.https_addr)
    }

    pub fn tracker(&self) -> Arc<ConnectionTracker> {
        self.state.tracker.clone()
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes
    ///
    /// Both listeners close as soon as `shutdown` fires. Connections already
    /// accepted get up to the drain timeout to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future,
    {
        let Server {
            http,
            https,
            http_addr,
            https_addr,
            acceptor,
            state,
            drain_timeout,
        } = self;

        tracing::info!("HTTP server listening at http://{}", http_addr);
        tracing::info!("WebSocket server listening at ws://{}", http_addr);
        tracing::info!("HTTPS server listening at https://{}", https_addr);
        tracing::info!("WebSocket server listening at wss://{}", https_addr);

        let tracker = state.tracker.clone();
        tokio::select! {
            _ = accept_loop(http, None, state.clone()) => {}
            _ = accept_loop(https, Some(acceptor), state) => {}
            _ = shutdown => {
                tracing::info!(active = tracker.count(), "Shutting down, no longer accepting connections");
            }
        }

        if tracker.drain(drain_timeout).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                active = tracker.count(),
                timeout_ms = drain_timeout.as_millis() as u64,
                "Drain timeout reached, dropping open connections"
            );
        }

        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, tls: Option<TlsAcceptor>, state: Arc<State>) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let state = state.clone();
        let tls = tls.clone();
        state.tracker.increment();

        tokio::spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_connection(tls_stream, remote, state.clone()).await,
                    Err(e) => {
                        if !is_connection_closed_error(&e) {
                            tracing::debug!(%remote, error = %e, "TLS handshake failed");
                        }
                    }
                },
                None => serve_connection(stream, remote, state.clone()).await,
            }
            state.tracker.decrement();
        });
    }
}

async fn serve_connection<I>(io: I, remote: SocketAddr, state: Arc<State>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(handle(state, req, remote).await) }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    if let Err(e) = builder
        .serve_connection_with_upgrades(TokioIo::new(io), service)
        .await
    {
        if !is_connection_closed_error(&e) {
            tracing::debug!(%remote, error = %e, "Connection error");
        }
    }
}

/// Latency upgrades first, everything else through the dispatcher
async fn handle(
    state: Arc<State>,
    mut req: hyper::Request<Incoming>,
    remote: SocketAddr,
) -> hyper::Response<HyperBody> {
    let on_upgrade = hyper::upgrade::on(&mut req);
    let request = Request::from_hyper(req, remote);

    if latency::is_websocket_upgrade(&request) {
        if let Some(res) = latency::upgrade_response(&request) {
            let channel = state.latency.clone();
            tokio::spawn(async move {
                match on_upgrade.await {
                    Ok(upgraded) => {
                        tracing::debug!(%remote, "Latency channel opened");
                        channel.serve(latency::accept_upgraded(upgraded).await).await;
                    }
                    Err(e) => tracing::debug!(%remote, error = %e, "Upgrade failed"),
                }
            });
            return res.into_hyper();
        }
    }

    state.dispatcher.dispatch(request).await.into_hyper()
}

/// Check if error is just a closed connection
fn is_connection_closed_error<E: std::fmt::Display + ?Sized>(err: &E) -> bool {
    let msg = err.to_string();
    msg.contains("connection closed")
        || msg.contains("broken pipe")
        || msg.contains("reset by peer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracker() {
        let tracker = ConnectionTracker::new();
        tracker.increment();
        tracker.increment();
        tracker.decrement();
        assert_eq!(tracker.count(), 1);
    }

    #[tokio::test]
    async fn test_drain_waits_for_connections() {
        let tracker = Arc::new(ConnectionTracker::new());
        assert!(tracker.drain(Duration::ZERO).await);

        tracker.increment();
        assert!(!tracker.drain(Duration::from_millis(30)).await);

        let closing = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            closing.decrement();
        });
        assert!(tracker.drain(Duration::from_secs(5)).await);
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_connection_closed_detection() {
        assert!(is_connection_closed_error("connection closed before message completed"));
        assert!(is_connection_closed_error("Connection reset by peer (os error 104)"));
        assert!(!is_connection_closed_error("invalid HTTP method"));
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_fast() {
        let first = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();

        match bind_listener(addr) {
            Err(Error::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected bind failure, got {:?}", other.map(|_| ())),
        }
    }
}
