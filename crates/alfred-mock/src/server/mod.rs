//! HTTP listener for mock traffic and administrative routes.

mod handler;

pub use handler::handle_request;

use crate::engine::MockEngine;
use crate::logging::LogLevelHandle;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Everything a connection needs, shared by all of them
pub struct AppState {
    pub engine: Arc<MockEngine>,
    pub log_level: Arc<LogLevelHandle>,
    pub admin_enabled: bool,
}

/// A bound listener, ready to serve
pub struct MockServer {
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MockServer {
    /// Bind the listener. Port 0 picks a free port; see [`MockServer::local_addr`].
    pub async fn bind(addr: &str, state: Arc<AppState>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}"))?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            listener,
            state,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Sender that stops the accept loop; in-flight connections finish on their own
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept connections until a shutdown signal arrives
    pub async fn run(self) -> anyhow::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!("Mock server listening on http://{}", local_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, remote)) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let state = Arc::clone(&state);
                                    async move { handle_request(req, state, remote).await }
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!("Connection error from {}: {}", remote, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error on {}: {}", local_addr, e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Mock server on {} shutting down", local_addr);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run on a background task, returning the bound address and a shutdown sender
    pub fn spawn(
        self,
    ) -> anyhow::Result<(SocketAddr, broadcast::Sender<()>, tokio::task::JoinHandle<()>)> {
        let addr = self.local_addr()?;
        let shutdown = self.shutdown_handle();
        let handle = tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("Mock server stopped: {}", e);
            }
        });
        Ok((addr, shutdown, handle))
    }
}
