//! What a pulse drives while it is active

use super::gpio::PinId;
use std::fmt;
use std::sync::Arc;

/// Something a pulse can run at start or stop.
///
/// Stop actions may run from a timer task; keep them short.
pub trait PulseAction: Send + Sync {
    fn invoke(&self);
}

impl<F> PulseAction for F
where
    F: Fn() + Send + Sync,
{
    fn invoke(&self) {
        self()
    }
}

/// Output driven by a pulse entry
#[derive(Clone)]
pub enum PulseTarget {
    /// Drive a pin high on start and low on stop
    Pin(PinId),
    /// Run user actions on start and stop
    Callbacks {
        on_start: Arc<dyn PulseAction>,
        on_stop: Arc<dyn PulseAction>,
    },
}

impl PulseTarget {
    pub fn callbacks(
        on_start: impl PulseAction + 'static,
        on_stop: impl PulseAction + 'static,
    ) -> Self {
        PulseTarget::Callbacks {
            on_start: Arc::new(on_start),
            on_stop: Arc::new(on_stop),
        }
    }
}

impl fmt::Debug for PulseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseTarget::Pin(pin) => f.debug_tuple("Pin").field(pin).finish(),
            PulseTarget::Callbacks { .. } => f.write_str("Callbacks"),
        }
    }
}

impl fmt::Display for PulseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseTarget::Pin(pin) => write!(f, "pin {}", pin.0),
            PulseTarget::Callbacks { .. } => write!(f, "callback"),
        }
    }
}
