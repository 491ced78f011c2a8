//! Transport trait abstraction for pluggable HTTP backends

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// One ingest POST, fully assembled
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Bytes,
}

impl IngestRequest {
    /// Value of the first header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body as text, lossy
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs the HTTP POST for the transmission engine
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request`. `Err` means no status code was obtained (DNS,
    /// connect, timeout); any status, including errors, is `Ok`.
    async fn post(&self, request: &IngestRequest) -> Result<HttpResponse>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
