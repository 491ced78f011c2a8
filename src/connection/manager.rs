//! Connectivity collaborators: link status and best-effort reconnect

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Interval between reachability checks while reconnecting
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Default connect timeout for a single probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Link status as seen by the transmission engine
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Whether a send has a chance of reaching the server
    async fn is_connected(&self) -> bool;

    /// Try to bring the link back within `budget`. Returns whether it is up.
    async fn try_reconnect(&self, budget: Duration) -> bool;
}

/// Link owned by the operating system; always reported up
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn try_reconnect(&self, _budget: Duration) -> bool {
        true
    }
}

/// Reachability of a TCP endpoint, normally the ingest host.
///
/// A managed probe keeps checking every 500 ms until the reconnect budget
/// runs out. An unmanaged probe leaves the link to the application and only
/// reports it down.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    connect_timeout: Duration,
    managed: bool,
}

impl TcpProbe {
    /// Probe `address` (`host:port`)
    pub fn new(address: impl Into<String>, managed: bool) -> Self {
        Self {
            address: address.into(),
            connect_timeout: PROBE_TIMEOUT,
            managed,
        }
    }

    /// Probe the host and port of `url`
    pub fn for_url(url: &str, managed: bool) -> Result<Self> {
        let parsed = reqwest::Url::parse(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow!("URL has no host: {}", url))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| anyhow!("URL has no port: {}", url))?;

        Ok(Self::new(format!("{}:{}", host, port), managed))
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    async fn probe(&self) -> bool {
        match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("Probe {} failed: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("Probe {} timed out", self.address);
                false
            }
        }
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_connected(&self) -> bool {
        self.probe().await
    }

    async fn try_reconnect(&self, budget: Duration) -> bool {
        if !self.managed {
            warn!(
                "{} unreachable and the link is not managed here; reconnect it in the application or use a managed probe",
                self.address
            );
            return false;
        }

        info!("Reconnecting to {}...", self.address);
        let deadline = Instant::now() + budget;

        loop {
            if self.probe().await {
                info!("Reconnected to {}", self.address);
                return true;
            }

            if Instant::now() + RETRY_INTERVAL > deadline {
                warn!("Reconnect to {} failed within {:?}", self.address, budget);
                return false;
            }
            sleep(RETRY_INTERVAL).await;
        }
    }
}
