//! HTTP transport seam. The gateway builds requests; a transport only moves
//! bytes. Tests swap in scripted transports.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::GatewayError;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one POST. Non-2xx statuses are returned, not raised; only
    /// connection-level failures are errors.
    async fn post(&self, request: HttpRequest) -> Result<HttpReply, GatewayError>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpReply, GatewayError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(HttpReply { status, body })
    }
}
