//! HTTP transport implementation on reqwest

use crate::transport::traits::{HttpResponse, HttpTransport, IngestRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// reqwest-backed transport with a per-request timeout.
///
/// Redirects are not followed: a redirected POST would be replayed as a
/// bodiless GET, and its 2xx would count as a delivery.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: &IngestRequest) -> Result<HttpResponse> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.body(request.body.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}
