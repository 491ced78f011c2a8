//! Monotonic time source and blocking-style waits

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Time source used for backoff waits and pulse deadlines
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary, fixed origin; never goes backwards
    fn now_ms(&self) -> u64;

    /// Wait for `duration` in the calling task
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
