//! GPIO abstraction for pin-driven pulses

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Board-level pin number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub u8);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// Output level of a digital pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Digital output driver
pub trait Gpio: Send + Sync {
    /// Configure `pin` as a push-pull output
    fn configure_output(&self, pin: PinId) -> Result<()>;

    /// Drive `pin` to `level`
    fn write(&self, pin: PinId, level: Level) -> Result<()>;
}

/// In-memory GPIO for hosts without pin hardware
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    levels: Mutex<HashMap<PinId, Level>>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to `pin`, if it was configured
    pub fn level(&self, pin: PinId) -> Option<Level> {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pin)
            .copied()
    }
}

impl Gpio for SimulatedGpio {
    fn configure_output(&self, pin: PinId) -> Result<()> {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(pin)
            .or_insert(Level::Low);
        debug!("[GPIO] {} configured as output", pin);
        Ok(())
    }

    fn write(&self, pin: PinId, level: Level) -> Result<()> {
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        match levels.get_mut(&pin) {
            Some(current) => {
                *current = level;
                debug!("[GPIO] {} -> {:?}", pin, level);
                Ok(())
            }
            None => Err(anyhow::anyhow!("{} is not configured as an output", pin)),
        }
    }
}
