//! Reload and readiness calls against the metrics engine.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use promsync_core::error::ReloadError;

/// Asks the engine to re-read its configuration.
#[async_trait]
pub trait Reload: Send + Sync {
    async fn reload(&self) -> Result<(), ReloadError>;

    /// Whether the engine answers its health endpoint.
    async fn is_ready(&self) -> Result<(), ReloadError>;
}

/// HTTP client for `POST /-/reload` and `GET /health`.
pub struct HttpReloader {
    client: reqwest::Client,
    reload_url: String,
    health_url: String,
}

impl HttpReloader {
    pub fn new(
        reload_url: impl Into<String>,
        health_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReloadError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            reload_url: reload_url.into(),
            health_url: health_url.into(),
        })
    }

    /// Reloader for an engine at `base_url` with the standard endpoints.
    pub fn for_base_url(base_url: &str, timeout: Duration) -> Result<Self, ReloadError> {
        let base = base_url.trim_end_matches('/');
        Self::new(format!("{base}/-/reload"), format!("{base}/health"), timeout)
    }

    async fn expect_success(resp: reqwest::Response) -> Result<String, ReloadError> {
        let status = resp.status();
        if !status.is_success() {
            // Keep the status even if the body cannot be read.
            let body = resp.text().await.unwrap_or_default();
            return Err(ReloadError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.text()
            .await
            .map_err(|e| ReloadError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Reload for HttpReloader {
    async fn reload(&self) -> Result<(), ReloadError> {
        let resp = self
            .client
            .post(&self.reload_url)
            .send()
            .await
            .map_err(|e| ReloadError::Transport(e.to_string()))?;
        let body = Self::expect_success(resp).await?;
        debug!(url = %self.reload_url, %body, "Engine reloaded");
        Ok(())
    }

    async fn is_ready(&self) -> Result<(), ReloadError> {
        let resp = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| ReloadError::Transport(e.to_string()))?;
        let body = Self::expect_success(resp).await?;
        debug!(url = %self.health_url, %body, "Engine health");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEngine;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_reload_any_2xx_is_success() {
        for status in [StatusCode::OK, StatusCode::NO_CONTENT, StatusCode::ACCEPTED] {
            let engine = FakeEngine::start(status).await;
            let reloader = HttpReloader::for_base_url(&engine.base_url(), Duration::from_secs(2)).unwrap();
            reloader.reload().await.unwrap();
            assert_eq!(engine.reloads(), 1);
        }
    }

    #[tokio::test]
    async fn test_reload_error_carries_status_and_body() {
        let engine = FakeEngine::start(StatusCode::INTERNAL_SERVER_ERROR).await;
        let reloader = HttpReloader::for_base_url(&engine.base_url(), Duration::from_secs(2)).unwrap();
        match reloader.reload().await {
            Err(ReloadError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "reload failed");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reload_status_kept_when_body_is_truncated() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // Promise 100 bytes, send 7, hang up.
            let _ = socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 100\r\n\r\npartial")
                .await;
        });

        let reloader =
            HttpReloader::for_base_url(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        match reloader.reload().await {
            Err(ReloadError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert!(body.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reload_transport_error() {
        // Nothing listens on port 1.
        let reloader = HttpReloader::for_base_url("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            reloader.reload().await,
            Err(ReloadError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_is_ready() {
        let engine = FakeEngine::start(StatusCode::OK).await;
        let reloader = HttpReloader::for_base_url(&engine.base_url(), Duration::from_secs(2)).unwrap();
        reloader.is_ready().await.unwrap();
        assert_eq!(engine.reloads(), 0);
    }
}
