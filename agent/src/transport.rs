//! Remote-write transport.
//!
//! The flush pipeline hands each encoded batch to a [`RemoteWriteClient`]
//! exactly once; retries and delivery guarantees are out of its hands.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use shared::config::OutputConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Remote-write protocol version sent with every push.
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";

const REMOTE_WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";
const MAX_ERROR_BODY_LEN: usize = 512;

/// Errors returned when a batch cannot be stored.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be built from the configuration.
    #[error("Failed to build remote write client: {0}")]
    Client(String),

    /// The request could not be sent or did not complete.
    #[error("Remote write request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Remote write endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

/// A client able to store one compressed remote-write batch.
#[async_trait]
pub trait RemoteWriteClient: Send + Sync {
    /// Stores a snappy-compressed `WriteRequest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch was not accepted by the endpoint.
    async fn store(&self, batch: Vec<u8>) -> Result<(), TransportError>;
}

/// Pushes batches to a remote-write endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemoteWriteClient {
    inner: reqwest::Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
}

impl HttpRemoteWriteClient {
    /// Builds a client from the output configuration.
    ///
    /// The request timeout is the flush period so a slow endpoint never
    /// stretches a cycle beyond it.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header is invalid or the TLS backend
    /// cannot be initialized.
    pub fn new(config: &OutputConfig) -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .user_agent(concat!("promflush/", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers(config)?)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .timeout(config.flush_period)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            inner,
            url: config.url.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn default_headers(config: &OutputConfig) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("snappy"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-protobuf"));
    headers.insert(
        REMOTE_WRITE_VERSION_HEADER,
        HeaderValue::from_static(REMOTE_WRITE_VERSION),
    );

    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Client(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Client(format!("invalid value for header '{name}': {e}")))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

#[async_trait]
impl RemoteWriteClient for HttpRemoteWriteClient {
    async fn store(&self, batch: Vec<u8>) -> Result<(), TransportError> {
        let mut request = self.inner.post(&self.url).body(batch);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY_LEN {
            let mut end = MAX_ERROR_BODY_LEN;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Keeps every stored batch in memory.
///
/// Used for dry runs and tests. A configurable delay simulates a slow
/// endpoint and an optional status makes every store fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    batches: Arc<Mutex<Vec<Vec<u8>>>>,
    delay: Option<Duration>,
    fail_status: Option<u16>,
}

impl RecordingClient {
    /// Creates a client that accepts every batch immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every store by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Rejects every store with `status`.
    #[must_use]
    pub fn failing(mut self, status: u16) -> Self {
        self.fail_status = Some(status);
        self
    }

    /// Returns a copy of the batches stored so far.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<u8>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl RemoteWriteClient for RecordingClient {
    async fn store(&self, batch: Vec<u8>) -> Result<(), TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.fail_status {
            return Err(TransportError::Status {
                status,
                body: "rejected".to_string(),
            });
        }
        self.batches.lock().push(batch);
        Ok(())
    }
}
