//! HTTP Transport
//!
//! REST client submitting compiled queries to a DataKit server.
//!
//! Every request is a `POST {base_url}/v1/query` carrying the JSON request
//! body; the response body is returned untouched for the resolver.

use super::{QueryRequest, Transport};
use crate::query::RemoteError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying the shared application secret
pub const SECRET_HEADER: &str = "x-datakit-secret";

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the DataKit server (e.g., "http://localhost:3000")
    pub base_url: String,
    /// Shared secret sent with every request
    pub secret: Option<String>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts for connection failures and rate limiting
    pub max_retries: u32,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            secret: None,
            request_timeout_ms: 10_000,
            max_retries: 3,
        }
    }
}

/// reqwest-based transport
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Create a new transport with the given configuration
    pub fn new(config: HttpTransportConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn query_url(&self) -> String {
        format!("{}/v1/query", self.config.base_url.trim_end_matches('/'))
    }

    /// Send the request, retrying connection failures and rate limiting
    async fn send_with_retry(&self, request: &QueryRequest) -> Result<Value, RemoteError> {
        let url = self.query_url();
        let request_id = Uuid::new_v4().to_string();
        let mut last_error = RemoteError::Unavailable;

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                // Quadratic backoff: 1s, 4s, 9s...
                let delay = Duration::from_secs((attempt as u64).pow(2));
                tracing::warn!(
                    request_id = %request_id,
                    attempt,
                    "Retrying query after {:?}: {}",
                    delay,
                    last_error
                );
                tokio::time::sleep(delay).await;
            }

            let mut builder = self
                .client
                .post(&url)
                .header(REQUEST_ID_HEADER, &request_id)
                .json(request);
            if let Some(secret) = &self.config.secret {
                builder = builder.header(SECRET_HEADER, secret);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.bytes().await?;
                        return parse_body(&body);
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        // Rate limited - honor Retry-After before the next attempt
                        if let Some(retry_after) = response.headers().get("Retry-After") {
                            if let Ok(secs) = retry_after.to_str().unwrap_or("5").parse::<u64>() {
                                tokio::time::sleep(Duration::from_secs(secs)).await;
                            }
                        }
                        last_error = RemoteError::ApiError {
                            status: status.as_u16(),
                            message: "rate limited".to_string(),
                        };
                        continue;
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        return Err(status_error(status, text));
                    }
                }
                Err(e) => {
                    last_error = if e.is_timeout() {
                        RemoteError::Timeout
                    } else if e.is_connect() {
                        RemoteError::Unavailable
                    } else {
                        RemoteError::Request(e)
                    };
                    // Only connection failures are worth another attempt
                    if !matches!(last_error, RemoteError::Unavailable) {
                        return Err(last_error);
                    }
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, request: &QueryRequest) -> Result<Value, RemoteError> {
        self.send_with_retry(request).await
    }
}

/// Decode a success body; an empty body means `null`
fn parse_body(body: &[u8]) -> Result<Value, RemoteError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| RemoteError::MalformedResponse(e.to_string()))
}

/// Map a non-success status to a typed error
fn status_error(status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        _ => RemoteError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}
