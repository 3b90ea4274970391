//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use super::handler::build_router;
use crate::config::ServerConfig;
use crate::error::{GateError, Result};
use crate::meter::AdmissionStrategy;

/// HTTP server that gates every request through an admission strategy.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The admission strategy shared by all requests
    strategy: Arc<dyn AdmissionStrategy>,
    /// Upper bound on handling one request
    request_timeout: Duration,
    /// How long in-flight requests may drain after shutdown is signalled
    shutdown_grace: Duration,
}

impl HttpServer {
    /// Create a new HTTP server with default timeouts.
    pub fn new(addr: SocketAddr, strategy: Arc<dyn AdmissionStrategy>) -> Self {
        let defaults = ServerConfig::default();
        Self {
            addr,
            strategy,
            request_timeout: defaults.request_timeout(),
            shutdown_grace: defaults.shutdown_grace(),
        }
    }

    /// Create a new HTTP server from the server section of the configuration.
    pub fn from_config(config: &ServerConfig, strategy: Arc<dyn AdmissionStrategy>) -> Self {
        Self {
            addr: config.addr,
            strategy,
            request_timeout: config.request_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The router this server would serve.
    pub fn router(&self) -> Router {
        build_router(self.strategy.clone(), self.request_timeout)
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server stops accepting connections when `signal` resolves and
    /// gives in-flight requests up to the shutdown grace period to finish.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GateError::Io(e)
        })?;
        self.run(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn run<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            strategy = self.strategy.name(),
            "Starting HTTP server"
        );

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let router = self.router();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        tokio::select! {
            result = &mut server => return flatten(result),
            _ = signal => {}
        }

        info!(
            grace_ms = self.shutdown_grace.as_millis() as u64,
            "Shutting down HTTP server"
        );
        let _ = stop_tx.send(());

        match tokio::time::timeout(self.shutdown_grace, &mut server).await {
            Ok(result) => flatten(result),
            Err(_) => {
                server.abort();
                warn!(
                    grace_ms = self.shutdown_grace.as_millis() as u64,
                    "In-flight requests did not drain in time, aborting"
                );
                Err(GateError::ShutdownTimeout(self.shutdown_grace))
            }
        }
    }
}

fn flatten(result: std::result::Result<std::io::Result<()>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server failed");
            Err(GateError::Io(e))
        }
        Err(e) => {
            error!(error = %e, "HTTP server task failed");
            Err(GateError::Io(std::io::Error::other(e)))
        }
    }
}
