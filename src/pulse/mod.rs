//! Pulse Commands
//!
//! A pulse turns something on when its command arrives and off again once
//! its duration has elapsed. Retriggers while on are ignored. How the
//! off-transition gets scheduled is up to the [`ExpiryBackend`]:
//! a tokio timer per pulse, or cooperative polling from `tick()`.

mod backend;
mod entry;
mod gpio;
mod scheduler;
mod target;

pub use backend::{ExpiryBackend, PollBackend, TimerBackend};
pub use entry::ExpiryHandle;
pub use gpio::{Gpio, Level, PinId, SimulatedGpio};
pub use scheduler::{PulseOutcome, PulseScheduler};
pub use target::{PulseAction, PulseTarget};
