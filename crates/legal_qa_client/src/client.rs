//! HTTP client: POST a question, receive the answer as an SSE byte stream.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::messages::QueryRequest;

/// Raw response body, chunked however the transport delivers it.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ClientError>>;

/// Transport error. Always fatal for the exchange it occurs in.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// The remote answering service as seen by the orchestrator.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Submit `request` and return the response body once the status is known
    /// to be successful.
    async fn open_stream(&self, request: &QueryRequest) -> Result<ByteStream, ClientError>;

    /// Best-effort liveness probe. Never fails.
    async fn ping(&self) {}
}

/// reqwest-backed client for the answering service.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpClient {
    /// Client for the service at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_connect_timeout(base_url, None)
    }

    pub fn with_connect_timeout(
        base_url: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            base_url,
            http: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn stream_url(&self) -> String {
        format!("{}/stream", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

#[async_trait]
impl AnswerService for HttpClient {
    async fn open_stream(&self, request: &QueryRequest) -> Result<ByteStream, ClientError> {
        tracing::debug!(url = %self.stream_url(), max_results = request.max_results, "opening answer stream");
        let resp = self
            .http
            .post(self.stream_url())
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from))
            .boxed())
    }

    async fn ping(&self) {
        match self.http.get(self.health_url()).send().await {
            Ok(resp) if resp.status().is_success() => tracing::debug!("health probe ok"),
            Ok(resp) => tracing::debug!(status = resp.status().as_u16(), "health probe returned non-success"),
            Err(e) => tracing::debug!(error = %e, "health probe failed"),
        }
    }
}
