//! Upload server.
//!
//! Binds a TCP port, serves the upload and merge endpoints and stops when
//! [`UploadServer::shutdown`] is called, letting in-flight requests finish.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ServerError;
use crate::merge::ReassemblyEngine;
use crate::routes::{AppState, router};
use crate::store::ChunkStore;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Root of the per-file staging directories.
    pub staging_dir: PathBuf,
    /// Where merged files are written.
    pub target_dir: PathBuf,
    /// Largest chunk accepted in one request.
    pub max_chunk_bytes: usize,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            staging_dir: PathBuf::from("temp"),
            target_dir: PathBuf::from("target"),
            max_chunk_bytes: 64 * 1024 * 1024,
            cors: true,
        }
    }
}

/// The chunk upload HTTP server.
pub struct UploadServer {
    config: ServerConfig,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
}

impl UploadServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Builds the full application: routes plus tracing and CORS layers.
    pub fn app(&self) -> Router {
        let store = ChunkStore::new(&self.config.staging_dir);
        let engine = ReassemblyEngine::new(store, &self.config.target_dir);
        let app = router(AppState::new(engine, self.config.max_chunk_bytes))
            .layer(TraceLayer::new_for_http());
        if self.config.cors {
            app.layer(CorsLayer::permissive())
        } else {
            app
        }
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = SocketAddr::new(self.config.bind, self.config.port);
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            staging = %self.config.staging_dir.display(),
            target = %self.config.target_dir.display(),
            "upload server listening on {local_addr}"
        );

        let cancel = self.cancel.clone();
        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        tracing::info!("server shut down");
        Ok(())
    }
}
