//! Pulse State Machine
//!
//! Defines the valid transitions of a pulse entry. A pulse is cyclical: it
//! starts `Idle`, becomes `Active` when a matching command arrives, and
//! returns to `Idle` when its duration runs out. There is no terminal state.
//!
//! `Stopping` is the short window in which the stop action is running. It is
//! reported as active so a retrigger cannot interleave its start action with
//! the previous stop action.

/// Phase of a pulse entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PulsePhase {
    /// Output off, no expiry pending
    Idle = 0,
    /// Output on, expiry pending
    Active = 1,
    /// Expiry claimed, stop action in progress
    Stopping = 2,
}

/// Events that can trigger pulse transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseEvent {
    /// A matching command arrived with a resolvable duration
    Triggered,
    /// The pulse duration elapsed (timer fire or poll tick)
    Expired,
    /// The stop action finished
    Stopped,
}

impl PulsePhase {
    /// Decode a phase stored as its discriminant
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PulsePhase::Active,
            2 => PulsePhase::Stopping,
            _ => PulsePhase::Idle,
        }
    }

    /// Whether the output is (still) considered on
    pub fn is_active(self) -> bool {
        self != PulsePhase::Idle
    }

    /// Get the next phase for an event, if the transition is valid
    pub fn next(self, event: PulseEvent) -> Option<PulsePhase> {
        use PulseEvent::*;
        use PulsePhase::*;

        match (self, event) {
            (Idle, Triggered) => Some(Active),
            (Active, Expired) => Some(Stopping),
            (Stopping, Stopped) => Some(Idle),

            // Retrigger while pulsing, late or duplicate expiry
            _ => None,
        }
    }
}
