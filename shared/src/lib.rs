//! Relay Shared Protocol Types
//!
//! This crate provides the wire types, response codec, error taxonomy and
//! pulse state machine shared by the relay device runtime and its tooling.

pub mod codec;
pub mod error;
pub mod state_machine;

use serde::{Deserialize, Serialize};

pub use error::{DeliveryError, DispatchError};

/// Named arguments carried by a dispatched command
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Protocol defaults for the ingestion service
pub mod defaults {
    /// Ingestion host
    pub const API_BASE_URL: &str = "https://api.inventronix.club";

    /// Ingestion path, appended to the base URL
    pub const INGEST_ENDPOINT: &str = "/v1/iot/ingest";

    /// Dashboard root used in diagnostics
    pub const DASHBOARD_URL: &str = "https://inventronix.club/iot-relay";

    /// Attempts per send, including the first one
    pub const RETRY_ATTEMPTS: u32 = 3;

    /// Backoff after the first failed attempt
    pub const RETRY_DELAY_MS: u64 = 1000;

    /// Upper bound for any single backoff
    pub const MAX_RETRY_DELAY_MS: u64 = 10_000;

    /// Per-request timeout
    pub const HTTP_TIMEOUT_MS: u64 = 10_000;

    /// Budget for a best-effort reconnect before a send
    pub const RECONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Fixed User-Agent header
    pub const USER_AGENT: &str = concat!("relay-device/", env!("CARGO_PKG_VERSION"), " (rust)");

    /// Response bodies shorter than this are echoed in progress logs
    pub const LOG_SNIPPET_LEN: usize = 100;

    /// Toggle command slots
    pub const MAX_COMMANDS: usize = 10;

    /// Pulse slots
    pub const MAX_PULSES: usize = 5;
}

/// HTTP header names used on the ingest request
pub mod headers {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const API_KEY: &str = "X-Api-Key";
    pub const PROJECT_ID: &str = "X-Project-Id";
    pub const USER_AGENT: &str = "User-Agent";
}

/// One element of the `commands` array in an ingest response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedCommand {
    #[serde(rename = "command")]
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,
    #[serde(default)]
    pub execution_id: String,
}

/// Body of a successful ingest response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub commands: Vec<DispatchedCommand>,
}

/// How the client must react to an HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx: delivered, response may carry commands
    Success,
    /// 400: payload rejected by the project's schema
    SchemaValidation,
    /// 401: bad project id or API key
    Unauthorized,
    /// 429: over the project's request quota
    RateLimited,
    /// 5xx: temporary server-side failure
    ServerError,
    /// Any other 4xx
    ClientError,
    /// Anything else (1xx, 3xx, out of range)
    Unexpected,
}

impl StatusClass {
    /// Classify a status code per the ingest status contract
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            400 => StatusClass::SchemaValidation,
            401 => StatusClass::Unauthorized,
            429 => StatusClass::RateLimited,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Unexpected,
        }
    }

    /// Whether a send should try again after this status
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            StatusClass::RateLimited | StatusClass::ServerError | StatusClass::Unexpected
        )
    }
}

impl DispatchedCommand {
    /// Create a command with no arguments
    pub fn new(name: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Arguments::new(),
            execution_id: execution_id.into(),
        }
    }

    /// Attach an argument
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}
