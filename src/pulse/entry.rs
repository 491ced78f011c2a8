//! Pulse entries and the handles that expire them
//!
//! An entry's phase and deadline are atomics: the expiry may run on a timer
//! task while the main loop reads `is_active`.

use super::gpio::{Gpio, Level};
use super::target::PulseTarget;
use relay_shared::state_machine::{PulseEvent, PulsePhase};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{error, info};

/// One registered pulse command
pub(crate) struct PulseEntry {
    pub(crate) name: String,
    pub(crate) target: PulseTarget,
    /// Registered duration; `None` means "take it from the command arguments"
    pub(crate) fixed_duration: Option<Duration>,
    /// Cycle number in the upper bits, phase in the low byte. The cycle is
    /// bumped on every start so handles from earlier cycles can be told apart.
    state: AtomicU64,
    /// Clock time at which the active pulse ends
    deadline_ms: AtomicU64,
}

fn pack(cycle: u32, phase: PulsePhase) -> u64 {
    (u64::from(cycle) << 8) | phase as u64
}

fn unpack(raw: u64) -> (u32, PulsePhase) {
    ((raw >> 8) as u32, PulsePhase::from_u8((raw & 0xff) as u8))
}

impl PulseEntry {
    pub(crate) fn new(name: String, target: PulseTarget, fixed_duration: Option<Duration>) -> Self {
        Self {
            name,
            target,
            fixed_duration: fixed_duration.filter(|d| !d.is_zero()),
            state: AtomicU64::new(pack(0, PulsePhase::Idle)),
            deadline_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn phase(&self) -> PulsePhase {
        unpack(self.state.load(Ordering::Acquire)).1
    }

    pub(crate) fn cycle(&self) -> u32 {
        unpack(self.state.load(Ordering::Acquire)).0
    }

    pub(crate) fn deadline_ms(&self) -> u64 {
        self.deadline_ms.load(Ordering::Acquire)
    }

    /// Apply `event` if it is valid from the current phase (and, when given,
    /// only within `expected_cycle`). Returns the cycle after the transition.
    fn transition(&self, event: PulseEvent, expected_cycle: Option<u32>) -> Option<u32> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let (cycle, phase) = unpack(current);
            if expected_cycle.is_some_and(|expected| expected != cycle) {
                return None;
            }

            let next = phase.next(event)?;
            let next_cycle = match event {
                PulseEvent::Triggered => cycle.wrapping_add(1),
                PulseEvent::Expired | PulseEvent::Stopped => cycle,
            };

            match self.state.compare_exchange(
                current,
                pack(next_cycle, next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(next_cycle),
                Err(actual) => current = actual,
            }
        }
    }

    /// Idle -> Active, recording the deadline and running the start action.
    /// Returns the new cycle number, or `None` if the entry was not idle.
    pub(crate) fn start(&self, gpio: &dyn Gpio, deadline_ms: u64) -> Option<u32> {
        let cycle = self.transition(PulseEvent::Triggered, None)?;
        self.deadline_ms.store(deadline_ms, Ordering::Release);

        match &self.target {
            PulseTarget::Pin(pin) => {
                if let Err(e) = gpio.write(*pin, Level::High) {
                    error!("Pulse {}: failed to drive {} high: {}", self.name, pin, e);
                }
            }
            PulseTarget::Callbacks { on_start, .. } => on_start.invoke(),
        }

        Some(cycle)
    }

    /// Active -> Idle, running the stop action. A no-op unless the entry is
    /// active in the given cycle.
    pub(crate) fn expire(&self, gpio: &dyn Gpio, cycle: u32, verbose: bool) -> bool {
        if self.transition(PulseEvent::Expired, Some(cycle)).is_none() {
            return false;
        }

        if verbose {
            info!("Pulse complete: {}", self.name);
        }

        match &self.target {
            PulseTarget::Pin(pin) => {
                if let Err(e) = gpio.write(*pin, Level::Low) {
                    error!("Pulse {}: failed to drive {} low: {}", self.name, pin, e);
                }
            }
            PulseTarget::Callbacks { on_stop, .. } => on_stop.invoke(),
        }

        self.deadline_ms.store(0, Ordering::Release);
        self.transition(PulseEvent::Stopped, Some(cycle)).is_some()
    }
}

/// Opaque context handed to an expiry backend when a pulse starts.
///
/// Carries everything the off-transition needs, so a timer callback can
/// expire the right entry without reaching back into the scheduler.
#[derive(Clone)]
pub struct ExpiryHandle {
    slot: usize,
    cycle: u32,
    entry: Weak<PulseEntry>,
    gpio: Arc<dyn Gpio>,
    verbose: bool,
}

impl ExpiryHandle {
    pub(crate) fn new(
        slot: usize,
        cycle: u32,
        entry: &Arc<PulseEntry>,
        gpio: Arc<dyn Gpio>,
        verbose: bool,
    ) -> Self {
        Self {
            slot,
            cycle,
            entry: Arc::downgrade(entry),
            gpio,
            verbose,
        }
    }

    /// Slot of the entry in its scheduler
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Deadline recorded when the pulse started
    pub fn deadline_ms(&self) -> Option<u64> {
        self.live_entry().map(|entry| entry.deadline_ms())
    }

    /// Whether this handle's pulse is still waiting to expire
    pub fn is_pending(&self) -> bool {
        self.live_entry()
            .is_some_and(|entry| entry.phase() == PulsePhase::Active)
    }

    /// Whether this handle's pulse should have ended by `now_ms`
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.live_entry().is_some_and(|entry| {
            entry.phase() == PulsePhase::Active && entry.deadline_ms() <= now_ms
        })
    }

    /// Run the off-transition. Idempotent: late or duplicate fires do nothing.
    pub fn fire(&self) -> bool {
        match self.entry.upgrade() {
            Some(entry) => entry.expire(self.gpio.as_ref(), self.cycle, self.verbose),
            None => false,
        }
    }

    fn live_entry(&self) -> Option<Arc<PulseEntry>> {
        self.entry
            .upgrade()
            .filter(|entry| entry.cycle() == self.cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::gpio::{PinId, SimulatedGpio};

    fn pin_entry(gpio: &SimulatedGpio) -> Arc<PulseEntry> {
        gpio.configure_output(PinId(5)).unwrap();
        Arc::new(PulseEntry::new("pump".into(), PulseTarget::Pin(PinId(5)), None))
    }

    #[test]
    fn test_start_and_expire_pin() {
        let gpio = SimulatedGpio::new();
        let entry = pin_entry(&gpio);

        let cycle = entry.start(&gpio, 3000).expect("entry was idle");
        assert_eq!(entry.phase(), PulsePhase::Active);
        assert_eq!(entry.deadline_ms(), 3000);
        assert_eq!(gpio.level(PinId(5)), Some(Level::High));

        assert!(entry.expire(&gpio, cycle, false));
        assert_eq!(entry.phase(), PulsePhase::Idle);
        assert_eq!(gpio.level(PinId(5)), Some(Level::Low));
    }

    #[test]
    fn test_start_while_active_refused() {
        let gpio = SimulatedGpio::new();
        let entry = pin_entry(&gpio);

        let cycle = entry.start(&gpio, 100).unwrap();
        assert!(entry.start(&gpio, 999).is_none());
        assert_eq!(entry.deadline_ms(), 100);
        assert_eq!(entry.cycle(), cycle);
    }

    #[test]
    fn test_expire_is_idempotent() {
        let gpio = SimulatedGpio::new();
        let entry = pin_entry(&gpio);

        let cycle = entry.start(&gpio, 100).unwrap();
        assert!(entry.expire(&gpio, cycle, false));
        assert!(!entry.expire(&gpio, cycle, false));
    }

    #[test]
    fn test_stale_handle_does_not_cut_next_cycle() {
        let gpio: Arc<dyn Gpio> = Arc::new(SimulatedGpio::new());
        gpio.configure_output(PinId(5)).unwrap();
        let entry = Arc::new(PulseEntry::new("pump".into(), PulseTarget::Pin(PinId(5)), None));

        let first = entry.start(gpio.as_ref(), 100).unwrap();
        let stale = ExpiryHandle::new(0, first, &entry, gpio.clone(), false);
        assert!(stale.fire());

        let second = entry.start(gpio.as_ref(), 200).unwrap();
        let current = ExpiryHandle::new(0, second, &entry, gpio.clone(), false);

        assert!(!stale.fire());
        assert!(!stale.is_pending());
        assert_eq!(entry.phase(), PulsePhase::Active);

        assert!(current.is_due(200));
        assert!(current.fire());
        assert_eq!(entry.phase(), PulsePhase::Idle);
    }

    #[test]
    fn test_handle_outliving_entry() {
        let gpio: Arc<dyn Gpio> = Arc::new(SimulatedGpio::new());
        gpio.configure_output(PinId(1)).unwrap();
        let entry = Arc::new(PulseEntry::new("valve".into(), PulseTarget::Pin(PinId(1)), None));
        let cycle = entry.start(gpio.as_ref(), 10).unwrap();
        let handle = ExpiryHandle::new(0, cycle, &entry, gpio, false);

        drop(entry);
        assert!(!handle.fire());
        assert_eq!(handle.deadline_ms(), None);
    }

    #[test]
    fn test_zero_fixed_duration_means_from_arguments() {
        let entry = PulseEntry::new("x".into(), PulseTarget::Pin(PinId(2)), Some(Duration::ZERO));
        assert_eq!(entry.fixed_duration, None);
    }
}
