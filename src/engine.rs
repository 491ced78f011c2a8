//! Transmission engine - one ingest POST with bounded retry and backoff
//!
//! A send runs to completion, backoff sleeps included, before it returns.
//! Statuses are classified per attempt:
//! - 2xx: delivered, stop
//! - 4xx other than 429: terminal, stop
//! - 429, 5xx, transport failure and anything else: retry after
//!   `min(base * 2^(n-1), max)` while attempts remain

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::connection::Connectivity;
use crate::transport::{HttpResponse, HttpTransport, IngestRequest};
use bytes::Bytes;
use relay_shared::{defaults, headers, DeliveryError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A delivered payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// 2xx status the server answered with
    pub status: u16,
    /// Response body, possibly carrying commands
    pub body: Bytes,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Performs sends against the ingest endpoint
pub struct TransmissionEngine {
    transport: Arc<dyn HttpTransport>,
    link: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
}

impl TransmissionEngine {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        link: Arc<dyn Connectivity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            link,
            clock,
        }
    }

    /// Clock used for backoff sleeps
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Deliver `payload`, retrying transient failures.
    ///
    /// Fails without any attempt when the link is down and cannot be
    /// brought back within the reconnect budget.
    pub async fn send(
        &self,
        config: &ClientConfig,
        payload: Bytes,
    ) -> Result<Delivery, DeliveryError> {
        self.ensure_connected(config).await?;

        let request = build_request(config, payload);
        let attempts = config.retry.attempts;
        let mut last = None;

        for attempt in 1..=attempts {
            if config.debug {
                debug!("POST {}", request.url);
                debug!("Payload: {}", String::from_utf8_lossy(&request.body));
            }

            let result = self.transport.post(&request).await;
            let error = match result {
                Ok(response) => {
                    log_attempt(config, &response);
                    if config.debug {
                        debug!("Status: {}", response.status);
                        debug!("Response: {}", response.text());
                    }

                    if (200..300).contains(&response.status) {
                        log_success(config);
                        return Ok(Delivery {
                            status: response.status,
                            body: response.body,
                            attempts: attempt,
                        });
                    }

                    DeliveryError::from_status(response.status, &response.text())
                }
                Err(e) => {
                    if config.verbose {
                        warn!("Request failed: {:#}", e);
                    }
                    DeliveryError::Transport(format!("{:#}", e))
                }
            };

            if !error.is_retryable() {
                log_failure(config, &error);
                return Err(error);
            }

            if attempt < attempts {
                let delay = config.retry.delay_for_attempt(attempt);
                if config.verbose {
                    info!(
                        "Retrying in {}ms... (attempt {}/{})",
                        delay.as_millis(),
                        attempt + 1,
                        attempts
                    );
                }
                self.clock.sleep(delay).await;
            }

            last = Some(error);
        }

        let last = last.unwrap_or_else(|| {
            DeliveryError::Transport("no attempts configured".into())
        });
        log_failure(config, &last);
        if config.verbose {
            error!("Max retry attempts reached. Giving up.");
        }

        Err(DeliveryError::Exhausted {
            attempts,
            last: Box::new(last),
        })
    }

    async fn ensure_connected(&self, config: &ClientConfig) -> Result<(), DeliveryError> {
        if self.link.is_connected().await {
            return Ok(());
        }

        if config.verbose {
            warn!("Network down, attempting reconnect...");
        }

        if self.link.try_reconnect(config.reconnect_timeout).await {
            return Ok(());
        }

        if config.verbose {
            error!("No network connection; payload not sent");
        }
        Err(DeliveryError::Connectivity)
    }
}

/// Assemble the POST for `payload` from the configuration
pub fn build_request(config: &ClientConfig, payload: Bytes) -> IngestRequest {
    IngestRequest {
        url: config.ingest_url(),
        headers: vec![
            (headers::CONTENT_TYPE, "application/json".into()),
            (headers::API_KEY, config.api_key.clone()),
            (headers::PROJECT_ID, config.project_id.clone()),
            (headers::USER_AGENT, defaults::USER_AGENT.into()),
        ],
        body: payload,
    }
}

fn log_attempt(config: &ClientConfig, response: &HttpResponse) {
    if !config.verbose {
        return;
    }

    if !response.body.is_empty() && response.body.len() < defaults::LOG_SNIPPET_LEN {
        info!("HTTP {} - {}", response.status, response.text());
    } else {
        info!("HTTP {}", response.status);
    }
}

fn log_success(config: &ClientConfig) {
    if config.verbose {
        info!("Data sent successfully! View your data: {}", config.payloads_url());
    }
}

/// Human-actionable diagnostic for a failed send
fn log_failure(config: &ClientConfig, error: &DeliveryError) {
    if !config.verbose {
        return;
    }

    match error {
        DeliveryError::Validation { body } => {
            error!("Schema validation failed: your data doesn't match the server-side schema");
            if !body.is_empty() {
                error!("Validation error: {}", body);
            }
            error!("Fix your data or update the schema at {}", config.schemas_url());
        }
        DeliveryError::Auth => {
            error!("Authentication failed: project id or API key is incorrect");
            error!("Check your credentials at {}", defaults::DASHBOARD_URL);
        }
        DeliveryError::RateLimited => {
            warn!("Rate limit exceeded for this project");
            warn!("Upgrade at {}", defaults::DASHBOARD_URL);
        }
        DeliveryError::Server { status } => {
            warn!("Server error ({}): temporary issue on the server side", status);
        }
        DeliveryError::Rejected { status, body } => {
            error!("Request failed (HTTP {})", status);
            if !body.is_empty() {
                error!("Response: {}", body);
            }
        }
        other => warn!("{}", other),
    }
}
