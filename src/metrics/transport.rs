//! HTTP delivery of rendered metrics to a Pushgateway.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};

use super::{exposition, PushError};

/// A fully built push: target URL, exposition body and optional credentials.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub url: Url,
    pub body: String,
    pub basic_auth: Option<(String, String)>,
}

/// Sends a push request. Implemented over HTTP in production and by
/// recording fakes in tests.
#[async_trait::async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, request: PushRequest) -> Result<(), PushError>;
}

/// `reqwest` transport with a fixed client-side timeout.
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, PushError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait::async_trait]
impl PushTransport for HttpTransport {
    async fn send(&self, request: PushRequest) -> Result<(), PushError> {
        // POST replaces only the metric names present in the body, leaving
        // e.g. the last success timestamp untouched on failed runs.
        let mut builder = self
            .client
            .post(request.url)
            .header(CONTENT_TYPE, exposition::CONTENT_TYPE)
            .body(request.body);
        if let Some((user, password)) = request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                PushError::Timeout(self.timeout)
            } else {
                PushError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
