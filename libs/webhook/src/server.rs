//! HTTPS server wrapping the admission router.
//!
//! The server owns the listener lifecycle: `listen_and_serve` blocks until the listener
//! stops, `shutdown` drains it from anywhere, and `listen_and_serve_gracefully` ties both
//! to SIGTERM and SIGINT so a pod stops cleanly on eviction.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use parking_lot::Mutex;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::handler::{AdmissionHandler, AllowAll};
use crate::review::{ReviewOptions, Reviewer, router};
use crate::tls::{DEFAULT_RELOAD_DELAY, load_tls_config, watch_tls_files};

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_CERT_FILE: &str = "/admission-server/tls.crt";
pub const DEFAULT_KEY_FILE: &str = "/admission-server/tls.key";

/// Options for [`WebhookServer`]. Zero values are replaced by defaults.
#[derive(Clone, Default)]
pub struct WebhookServerOptions {
    /// Listen address, `0.0.0.0` when unset.
    pub address: Option<IpAddr>,
    /// Listen port, [`DEFAULT_PORT`] when zero.
    pub port: u16,
    /// PEM certificate chain, [`DEFAULT_CERT_FILE`] when empty.
    pub cert_file: PathBuf,
    /// PEM private key, [`DEFAULT_KEY_FILE`] when empty.
    pub key_file: PathBuf,
    /// Reload certificate and key when they change on disk.
    pub reload_tls: bool,
    /// Wait between a file change and the reload, [`DEFAULT_RELOAD_DELAY`] when zero.
    pub reload_delay: Duration,
    /// Log every review and verdict.
    pub debug: bool,
    /// Decision function, [`AllowAll`] when unset.
    pub handler: Option<Arc<dyn AdmissionHandler>>,
}

impl WebhookServerOptions {
    pub fn with_handler(mut self, handler: impl AdmissionHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ServeState {
    Idle,
    Serving,
    Stopped,
}

struct Inner {
    addr: SocketAddr,
    cert_file: PathBuf,
    key_file: PathBuf,
    reload_tls: bool,
    reload_delay: Duration,
    /// Pre-bound socket, consumed by the first `listen_and_serve`.
    listener: Mutex<Option<TcpListener>>,
    router: Router,
    handle: Handle,
    state: watch::Sender<ServeState>,
    /// Parent of every request token, cancelled once the listener stopped.
    cancel: CancellationToken,
}

/// Admission webhook server. Clones drive the same listener.
#[derive(Clone)]
pub struct WebhookServer {
    inner: Arc<Inner>,
}

impl WebhookServer {
    pub fn new(options: WebhookServerOptions) -> Self {
        Self::build(options, None)
    }

    /// Serve on an already bound socket, e.g. one handed over by systemd.
    ///
    /// `address` and `port` of the options are ignored.
    pub fn from_listener(options: WebhookServerOptions, listener: TcpListener) -> Result<Self> {
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Io("failed to read listener address".to_string(), e))?;
        Ok(Self::build(options, Some((addr, listener))))
    }

    fn build(options: WebhookServerOptions, listener: Option<(SocketAddr, TcpListener)>) -> Self {
        let port = if options.port == 0 {
            DEFAULT_PORT
        } else {
            options.port
        };
        let cert_file = if options.cert_file.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_CERT_FILE)
        } else {
            options.cert_file
        };
        let key_file = if options.key_file.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_KEY_FILE)
        } else {
            options.key_file
        };
        let handler = options.handler.unwrap_or_else(|| Arc::new(AllowAll));
        let reload_delay = if options.reload_delay.is_zero() {
            DEFAULT_RELOAD_DELAY
        } else {
            options.reload_delay
        };
        let (addr, listener) = match listener {
            Some((addr, listener)) => (addr, Some(listener)),
            None => {
                let address = options
                    .address
                    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
                (SocketAddr::new(address, port), None)
            }
        };

        let cancel = CancellationToken::new();
        let reviewer = Reviewer::new(
            ReviewOptions {
                debug: options.debug,
            },
            handler,
            cancel.clone(),
        );
        let (state, _) = watch::channel(ServeState::Idle);

        Self {
            inner: Arc::new(Inner {
                addr,
                cert_file,
                key_file,
                reload_tls: options.reload_tls,
                reload_delay,
                listener: Mutex::new(listener),
                router: router(reviewer),
                handle: Handle::new(),
                state,
                cancel,
            }),
        }
    }

    /// Configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Resolves to the bound address once listening, `None` if binding failed.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.inner.handle.listening().await
    }

    /// Serve HTTPS until the listener stops.
    ///
    /// Returns [`Error::ServerClosed`] after a graceful shutdown, which is not a failure.
    pub async fn listen_and_serve(&self) -> Result<()> {
        let inner = &self.inner;
        if *inner.state.borrow() == ServeState::Stopped {
            return Err(Error::ServerClosed);
        }

        let tls_config = load_tls_config(&inner.cert_file, &inner.key_file)?;
        let rustls_config = RustlsConfig::from_config(Arc::new(tls_config));

        let reload = inner.reload_tls.then(|| {
            tokio::spawn(watch_tls_files(
                inner.cert_file.clone(),
                inner.key_file.clone(),
                rustls_config.clone(),
                inner.reload_delay,
            ))
        });

        info!(addr = %inner.addr, "starting HTTPS server");
        inner.state.send_replace(ServeState::Serving);
        let listener = inner.listener.lock().take();
        let server = match listener {
            Some(listener) => axum_server::from_tcp_rustls(listener, rustls_config),
            None => axum_server::bind_rustls(inner.addr, rustls_config),
        };
        let served = server
            .handle(inner.handle.clone())
            .serve(inner.router.clone().into_make_service())
            .await;
        inner.cancel.cancel();
        inner.state.send_replace(ServeState::Stopped);

        if let Some(reload) = reload {
            reload.abort();
        }

        served.map_err(|e| Error::Listen(inner.addr, e))?;
        info!(addr = %inner.addr, "HTTPS server stopped");
        Err(Error::ServerClosed)
    }

    /// Serve until SIGTERM or SIGINT, then shut down gracefully.
    ///
    /// A listener failure is returned as is; after a signal the outcome of the shutdown is
    /// returned, so a clean drain yields `Ok(())`.
    pub async fn listen_and_serve_gracefully(&self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate()).map_err(Error::Signal)?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(Error::Signal)?;

        self.listen_and_serve_until(async move {
            let caught = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!(signal = caught, "signal caught");
        })
        .await
    }

    /// Serve in a background task until either the listener stops or `signal` resolves.
    pub async fn listen_and_serve_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let server = self.clone();
        let mut serving = tokio::spawn(async move { server.listen_and_serve().await });

        let shutdown = tokio::select! {
            served = &mut serving => return served?,
            () = signal => self.shutdown(None).await,
        };
        // the listener returns once drained, or right away if it had not started
        let _ = serving.await;
        shutdown
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    ///
    /// With a timeout, connections still open when it elapses are closed and
    /// [`Error::ShutdownTimeout`] is returned.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> Result<()> {
        let inner = &self.inner;
        info!("starting graceful shutdown");
        inner.handle.graceful_shutdown(timeout);

        let idle = inner.state.send_if_modified(|state| {
            if *state == ServeState::Idle {
                *state = ServeState::Stopped;
                true
            } else {
                false
            }
        });
        if idle {
            return Ok(());
        }

        let mut state = inner.state.subscribe();
        // the sender lives in `inner`, so waiting cannot fail
        let stopped = state.wait_for(|s| *s == ServeState::Stopped);
        match timeout {
            None => {
                let _ = stopped.await;
            }
            Some(timeout) => {
                if tokio::time::timeout(timeout, stopped).await.is_err() {
                    warn!(?timeout, "graceful shutdown timed out");
                    return Err(Error::ShutdownTimeout(timeout));
                }
            }
        }
        Ok(())
    }
}
