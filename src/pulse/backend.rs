//! Expiry backends - how an active pulse gets turned off
//!
//! Two strategies, picked once when the scheduler is built:
//! - [`TimerBackend`]: a one-shot tokio timer per pulse fires the expiry
//!   on its own task.
//! - [`PollBackend`]: nothing happens until the application calls `tick()`;
//!   the worst-case overrun is the interval between ticks.

use super::entry::ExpiryHandle;
use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;

/// Scheduling strategy for pulse expiry
pub trait ExpiryBackend: Send + Sync {
    /// Arrange for `handle` to fire once `duration` has elapsed
    fn arm(&self, handle: ExpiryHandle, duration: Duration);

    /// Cooperative tick; fire whatever is due at `now_ms`
    fn tick(&self, now_ms: u64);

    /// Short name for logs
    fn name(&self) -> &'static str;
}

impl<B: ExpiryBackend + ?Sized> ExpiryBackend for Arc<B> {
    fn arm(&self, handle: ExpiryHandle, duration: Duration) {
        (**self).arm(handle, duration)
    }

    fn tick(&self, now_ms: u64) {
        (**self).tick(now_ms)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<B: ExpiryBackend + ?Sized> ExpiryBackend for Box<B> {
    fn arm(&self, handle: ExpiryHandle, duration: Duration) {
        (**self).arm(handle, duration)
    }

    fn tick(&self, now_ms: u64) {
        (**self).tick(now_ms)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// One-shot timer per pulse on a tokio runtime
pub struct TimerBackend {
    runtime: Handle,
}

impl TimerBackend {
    /// Spawn timers on the given runtime
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Spawn timers on the runtime this is called from
    pub fn current() -> Result<Self> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl ExpiryBackend for TimerBackend {
    fn arm(&self, handle: ExpiryHandle, duration: Duration) {
        self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            handle.fire();
        });
    }

    fn tick(&self, _now_ms: u64) {
        // Timers fire on their own
    }

    fn name(&self) -> &'static str {
        "timer"
    }
}

/// Expiry driven by periodic `tick()` calls from the application loop
#[derive(Default)]
pub struct PollBackend {
    armed: Mutex<Vec<ExpiryHandle>>,
}

impl PollBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pulses waiting for a tick to expire them
    pub fn pending(&self) -> usize {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|handle| handle.is_pending())
            .count()
    }
}

impl ExpiryBackend for PollBackend {
    fn arm(&self, handle: ExpiryHandle, _duration: Duration) {
        // The deadline was recorded on the entry when it started
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn tick(&self, now_ms: u64) {
        let due: Vec<ExpiryHandle> = {
            let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
            let mut due = Vec::new();
            armed.retain(|handle| {
                if handle.is_due(now_ms) {
                    due.push(handle.clone());
                    false
                } else {
                    handle.is_pending()
                }
            });
            due
        };

        // Stop actions run outside the lock
        for handle in due {
            handle.fire();
        }
    }

    fn name(&self) -> &'static str {
        "poll"
    }
}
