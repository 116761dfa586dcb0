//! HTTP transport abstraction.
//!
//! The retry loop is written against [`HttpTransport`] so tests can script
//! responses without a network; production uses [`ReqwestTransport`].

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;

use super::error::FetchError;
use super::{FetchOutcome, FetchRequest};

/// A single-attempt HTTP executor.
///
/// Implementations perform exactly one request and report the raw result;
/// retry, backoff and timeout policy live entirely in the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &FetchRequest) -> Result<FetchOutcome, FetchError>;
}

/// Production transport backed by a shared `reqwest::Client`.
///
/// The client is built without its own timeout; the per-attempt deadline is
/// enforced by the retry loop, which aborts the in-flight request by dropping
/// the future.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &FetchRequest) -> Result<FetchOutcome, FetchError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                // Connection-level failure; reqwest's own timeout is disabled
                // so timeouts here only come from DNS/OS-level errors.
                if e.is_connect() {
                    return Err(FetchError::Network(format!("connection failed: {}", e)));
                }
                return Err(FetchError::Network(format!("request failed: {}", e)));
            }
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read body: {}", e)))?;

        Ok(FetchOutcome {
            status,
            headers,
            body,
        })
    }
}
