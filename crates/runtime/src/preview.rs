//! C2 — Preview HTTP server: serves `site_root` as static files so the
//! evaluator can drive a real browser against the generated site.
//!
//! Grounded on the broader pack's axum + tower-http static-file idiom
//! rather than the teacher (which never serves HTTP itself): `ServeDir`
//! wrapped in a `Router`, bound with `tokio::net::TcpListener`, and run on a
//! spawned task so `stop()` can be called from any exit path including the
//! error branch (Rust has no async `Drop` to rely on here).

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

use crate::error::{RuntimeError, RuntimeResult};

pub struct PreviewServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PreviewServer {
    /// Bind and start serving `site_dir` immediately; the caller must call
    /// `stop().await` on every exit path, success or failure.
    pub async fn start(host: &str, port: u16, site_dir: PathBuf) -> RuntimeResult<Self> {
        let app = axum::Router::new().fallback_service(ServeDir::new(site_dir));
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|e| RuntimeError::other(format!("preview bind failed on {host}:{port}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RuntimeError::other(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::warn!(error = %e, "preview server exited with error");
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.addr.ip(), self.addr.port())
    }

    pub fn get_file_url(&self, relative_path: &str) -> String {
        format!("{}/{}", self.url(), relative_path.trim_start_matches('/'))
    }

    /// Idempotent: safe to call more than once, including from a cleanup
    /// path after `start` already failed.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_serves_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();

        let mut server = PreviewServer::start("127.0.0.1", 0, dir.path().to_path_buf())
            .await
            .unwrap();
        let body = reqwest::get(server.get_file_url("index.html"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "<h1>hi</h1>");
        server.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = PreviewServer::start("127.0.0.1", 0, dir.path().to_path_buf())
            .await
            .unwrap();
        server.stop().await;
        server.stop().await;
    }
}
