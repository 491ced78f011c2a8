//! Client configuration

use relay_shared::defaults;
use std::fmt;
use std::time::Duration;

/// Retry and backoff parameters for a single send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per send, including the first one
    pub attempts: u32,
    /// Delay after the first failed attempt (doubles each retry)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: defaults::RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_DELAY_MS),
            max_delay: Duration::from_millis(defaults::MAX_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay taken after attempt `attempt` (1-based) fails:
    /// `min(base_delay * 2^(attempt - 1), max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Configuration for the device client
#[derive(Clone)]
pub struct ClientConfig {
    /// Project the payloads belong to
    pub project_id: String,
    /// Project API key
    pub api_key: String,
    /// Server-side schema to validate payloads against
    pub schema_id: Option<String>,
    /// Ingestion host, without the endpoint path
    pub base_url: String,
    /// Retry and backoff
    pub retry: RetryPolicy,
    /// Per-request timeout
    pub http_timeout: Duration,
    /// Budget for a reconnect attempt before a send
    pub reconnect_timeout: Duration,
    /// Progress and diagnostic logging
    pub verbose: bool,
    /// Request/response dumps
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: String::new(),
            schema_id: None,
            base_url: defaults::API_BASE_URL.into(),
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_millis(defaults::HTTP_TIMEOUT_MS),
            reconnect_timeout: Duration::from_millis(defaults::RECONNECT_TIMEOUT_MS),
            verbose: true,
            debug: false,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &"<redacted>")
            .field("schema_id", &self.schema_id)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("http_timeout", &self.http_timeout)
            .field("reconnect_timeout", &self.reconnect_timeout)
            .field("verbose", &self.verbose)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration for a project, everything else defaulted
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Full ingest URL, with the schema id as a query parameter when set
    pub fn ingest_url(&self) -> String {
        let mut url = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            defaults::INGEST_ENDPOINT
        );

        if let Some(schema_id) = self.schema_id.as_deref().filter(|id| !id.is_empty()) {
            url.push_str("?schema_id=");
            url.push_str(&urlencoding::encode(schema_id));
        }

        url
    }

    /// Where the project's schemas are managed
    pub fn schemas_url(&self) -> String {
        format!("{}/projects/{}/schemas", defaults::DASHBOARD_URL, self.project_id)
    }

    /// Where delivered payloads can be inspected
    pub fn payloads_url(&self) -> String {
        format!("{}/projects/{}/payloads", defaults::DASHBOARD_URL, self.project_id)
    }
}
