#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, info};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Local static file server over a run's output directory.
///
/// Stops when [`PreviewServer::stop`] is called or when dropped.
pub struct PreviewServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PreviewServer {
    /// Serve `root` on `127.0.0.1:port`. Port 0 picks a free port.
    pub async fn start(root: &Path, port: u16) -> Result<Self, AppError> {
        let bind_addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(bind_addr).await.map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to bind preview server {}: {}", bind_addr, err),
            )
            .with_code("AMP-SRV-001")
        })?;
        let addr = listener.local_addr().map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to determine preview server address: {}", err),
            )
            .with_code("AMP-SRV-001")
        })?;

        let router = Router::new().fallback_service(ServeDir::new(root.to_path_buf()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                debug!(error = %err, "preview server terminated");
            }
        });
        info!("Local server started on {}", addr);

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL of `path` (relative to the served root) on this server.
    pub fn url_for(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                debug!("preview server still had open connections at shutdown");
            }
        }
        info!("Local server closed");
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
