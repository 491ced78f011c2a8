//! Pulse scheduler - timed actions that switch themselves off

use super::backend::ExpiryBackend;
use super::entry::{ExpiryHandle, PulseEntry};
use super::gpio::{Gpio, Level, PinId};
use super::target::{PulseAction, PulseTarget};
use crate::clock::Clock;
use crate::slots::SlotArena;
use relay_shared::{defaults, Arguments, DispatchError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Argument keys a duration is read from, in lookup order
const DURATION_KEYS: [&str; 2] = ["duration", "duration_ms"];

/// Result of dispatching a command to a registered pulse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseOutcome {
    /// Start action ran, expiry armed
    Started { duration: Duration },
    /// Pulse was already active; retrigger dropped
    Ignored,
    /// No usable duration; nothing changed
    Rejected(DispatchError),
}

/// Bounded table of pulse commands and their expiry
pub struct PulseScheduler {
    entries: SlotArena<Arc<PulseEntry>>,
    gpio: Arc<dyn Gpio>,
    clock: Arc<dyn Clock>,
    backend: Box<dyn ExpiryBackend>,
    verbose: bool,
}

impl PulseScheduler {
    /// Create a scheduler with the default number of slots
    pub fn new(
        gpio: Arc<dyn Gpio>,
        clock: Arc<dyn Clock>,
        backend: impl ExpiryBackend + 'static,
    ) -> Self {
        Self::with_capacity(defaults::MAX_PULSES, gpio, clock, backend)
    }

    pub fn with_capacity(
        capacity: usize,
        gpio: Arc<dyn Gpio>,
        clock: Arc<dyn Clock>,
        backend: impl ExpiryBackend + 'static,
    ) -> Self {
        Self {
            entries: SlotArena::with_capacity(capacity),
            gpio,
            clock,
            backend: Box::new(backend),
            verbose: true,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Name of the expiry strategy in use
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Register a pulse that drives `pin` high for its duration.
    ///
    /// The pin is configured as an output and driven low. A `None` or zero
    /// duration means each command must carry `duration` or `duration_ms`.
    pub fn register_pin(&mut self, name: &str, pin: PinId, duration: Option<Duration>) -> bool {
        if !self.accepts(name) {
            return false;
        }

        if let Err(e) = self
            .gpio
            .configure_output(pin)
            .and_then(|_| self.gpio.write(pin, Level::Low))
        {
            warn!("Pulse {}: cannot drive {}, ignoring: {}", name, pin, e);
            return false;
        }

        self.insert(name, PulseTarget::Pin(pin), duration)
    }

    /// Register a pulse that runs `on_start`, then `on_stop` once its
    /// duration has elapsed
    pub fn register_callbacks(
        &mut self,
        name: &str,
        duration: Option<Duration>,
        on_start: impl PulseAction + 'static,
        on_stop: impl PulseAction + 'static,
    ) -> bool {
        if !self.accepts(name) {
            return false;
        }

        self.insert(name, PulseTarget::callbacks(on_start, on_stop), duration)
    }

    fn accepts(&self, name: &str) -> bool {
        if name.is_empty() {
            if self.verbose {
                warn!("Ignoring pulse registration with an empty name");
            }
            return false;
        }

        if self.contains(name) {
            if self.verbose {
                warn!("Pulse command already registered, ignoring: {}", name);
            }
            return false;
        }

        if self.entries.is_full() {
            if self.verbose {
                warn!(
                    "Max pulse commands registered ({}), ignoring: {}",
                    self.entries.capacity(),
                    name
                );
            }
            return false;
        }

        true
    }

    fn insert(&mut self, name: &str, target: PulseTarget, duration: Option<Duration>) -> bool {
        let entry = PulseEntry::new(name.to_string(), target, duration);
        let summary = match entry.fixed_duration {
            Some(d) => format!("{}, {}ms", entry.target, d.as_millis()),
            None => format!("{}, duration from args", entry.target),
        };

        match self.entries.insert(Arc::new(entry)) {
            Ok(_) => {
                if self.verbose {
                    info!("Registered pulse command: {} ({})", name, summary);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Start the pulse registered under `name`.
    ///
    /// Returns `None` when no pulse has that name.
    pub fn dispatch(&self, name: &str, arguments: &Arguments) -> Option<PulseOutcome> {
        let (slot, entry) = self.entries.find(|entry| entry.name == name)?;

        if entry.phase().is_active() {
            if self.verbose {
                info!("Already pulsing, ignoring: {}", name);
            }
            return Some(PulseOutcome::Ignored);
        }

        let duration = match entry
            .fixed_duration
            .or_else(|| duration_from_arguments(arguments))
        {
            Some(duration) => duration,
            None => {
                if self.verbose {
                    warn!(
                        "No duration for pulse {} (set one at registration or send `duration`)",
                        name
                    );
                }
                return Some(PulseOutcome::Rejected(DispatchError::DurationUnresolved(
                    name.to_string(),
                )));
            }
        };

        let deadline_ms = self
            .clock
            .now_ms()
            .saturating_add(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));

        let cycle = match entry.start(self.gpio.as_ref(), deadline_ms) {
            Some(cycle) => cycle,
            None => return Some(PulseOutcome::Ignored),
        };

        if self.verbose {
            info!("Pulsing {} for {}ms", name, duration.as_millis());
        }
        debug!(
            "Pulse {} armed on {} backend (slot {}, deadline {}ms)",
            name,
            self.backend.name(),
            slot,
            deadline_ms
        );

        let handle = ExpiryHandle::new(slot, cycle, entry, self.gpio.clone(), self.verbose);
        self.backend.arm(handle, duration);

        Some(PulseOutcome::Started { duration })
    }

    /// Whether the pulse named `name` is currently on; `false` for unknown names
    pub fn is_active(&self, name: &str) -> bool {
        self.entries
            .find(|entry| entry.name == name)
            .is_some_and(|(_, entry)| entry.phase().is_active())
    }

    /// Expire due pulses (poll backend); a no-op for timer backends
    pub fn tick(&self) {
        self.backend.tick(self.clock.now_ms());
    }

    /// Turn the pulse in `slot` off now, if it is active
    pub fn expire_slot(&self, slot: usize) -> bool {
        match self.entries.get(slot) {
            Some(entry) => entry.expire(self.gpio.as_ref(), entry.cycle(), self.verbose),
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.find(|entry| entry.name == name).is_some()
    }

    /// Number of registered pulses
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pulses currently on
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.phase().is_active())
            .count()
    }
}

/// Read a pulse duration from command arguments.
///
/// The first key in [`DURATION_KEYS`] that is present decides; a zero,
/// negative or non-numeric value there leaves the duration unresolved.
fn duration_from_arguments(arguments: &Arguments) -> Option<Duration> {
    let value = DURATION_KEYS
        .iter()
        .find_map(|key| arguments.get(*key).filter(|value| !value.is_null()))?;

    let ms = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|ms| ms.is_finite() && *ms >= 1.0).map(|ms| ms as u64))?,
        _ => return None,
    };

    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::backend::{PollBackend, TimerBackend};
    use crate::pulse::gpio::SimulatedGpio;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Clock that only moves when told to
    #[derive(Default)]
    struct ManualClock {
        now: AtomicU64,
    }

    impl ManualClock {
        fn advance(&self, ms: u64) {
            self.now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration.as_millis() as u64);
        }
    }

    /// Backend that hands armed handles to the test
    #[derive(Default)]
    struct ManualBackend {
        armed: Mutex<Vec<(ExpiryHandle, Duration)>>,
    }

    impl ManualBackend {
        fn take(&self) -> Vec<(ExpiryHandle, Duration)> {
            std::mem::take(&mut *self.armed.lock().unwrap())
        }
    }

    impl ExpiryBackend for ManualBackend {
        fn arm(&self, handle: ExpiryHandle, duration: Duration) {
            self.armed.lock().unwrap().push((handle, duration));
        }

        fn tick(&self, _now_ms: u64) {}

        fn name(&self) -> &'static str {
            "manual"
        }
    }

    #[derive(Default)]
    struct Counters {
        starts: AtomicU32,
        stops: AtomicU32,
    }

    fn register_counted(
        scheduler: &mut PulseScheduler,
        name: &str,
        duration: Option<Duration>,
    ) -> Arc<Counters> {
        let counters = Arc::new(Counters::default());
        let on_start = counters.clone();
        let on_stop = counters.clone();
        assert!(scheduler.register_callbacks(
            name,
            duration,
            move || {
                on_start.starts.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                on_stop.stops.fetch_add(1, Ordering::SeqCst);
            },
        ));
        counters
    }

    fn args(value: serde_json::Value) -> Arguments {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("arguments must be an object"),
        }
    }

    fn poll_scheduler() -> (PulseScheduler, Arc<ManualClock>, Arc<SimulatedGpio>) {
        let clock = Arc::new(ManualClock::default());
        let gpio = Arc::new(SimulatedGpio::new());
        let scheduler = PulseScheduler::new(gpio.clone(), clock.clone(), PollBackend::new());
        (scheduler, clock, gpio)
    }

    #[test]
    fn test_duration_from_arguments() {
        let d = |v| duration_from_arguments(&args(v));
        assert_eq!(d(json!({"duration": 3000})), Some(Duration::from_millis(3000)));
        assert_eq!(d(json!({"duration_ms": 250})), Some(Duration::from_millis(250)));
        assert_eq!(d(json!({"duration": 1500.0})), Some(Duration::from_millis(1500)));
        assert_eq!(d(json!({"duration": 10, "duration_ms": 20})), Some(Duration::from_millis(10)));
        assert_eq!(d(json!({"duration": null, "duration_ms": 20})), Some(Duration::from_millis(20)));
        assert_eq!(d(json!({"duration": 0, "duration_ms": 20})), None);
        assert_eq!(d(json!({"duration": "3000"})), None);
        assert_eq!(d(json!({"duration": -5})), None);
        assert_eq!(d(json!({})), None);
    }

    #[test]
    fn test_poll_pulse_from_arguments_expires_once() {
        let (mut scheduler, clock, _gpio) = poll_scheduler();
        let counters = register_counted(&mut scheduler, "pump", None);

        let outcome = scheduler.dispatch("pump", &args(json!({"duration": 3000})));
        assert_eq!(
            outcome,
            Some(PulseOutcome::Started {
                duration: Duration::from_millis(3000)
            })
        );
        assert!(scheduler.is_active("pump"));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

        clock.advance(2999);
        scheduler.tick();
        assert!(scheduler.is_active("pump"));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 0);

        clock.advance(1);
        scheduler.tick();
        assert!(!scheduler.is_active("pump"));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);

        clock.advance(10_000);
        scheduler.tick();
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retrigger_while_active_is_ignored() {
        let (mut scheduler, clock, _gpio) = poll_scheduler();
        let counters = register_counted(&mut scheduler, "pump", Some(Duration::from_millis(1000)));

        assert!(matches!(
            scheduler.dispatch("pump", &Arguments::new()),
            Some(PulseOutcome::Started { .. })
        ));

        clock.advance(500);
        assert_eq!(scheduler.dispatch("pump", &Arguments::new()), Some(PulseOutcome::Ignored));
        assert!(scheduler.is_active("pump"));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

        // Deadline is not extended by the ignored retrigger
        clock.advance(500);
        scheduler.tick();
        assert!(!scheduler.is_active("pump"));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_duration_rejected() {
        let (mut scheduler, _clock, _gpio) = poll_scheduler();
        let counters = register_counted(&mut scheduler, "pump", None);

        let outcome = scheduler.dispatch("pump", &args(json!({"speed": 3})));

        assert_eq!(
            outcome,
            Some(PulseOutcome::Rejected(DispatchError::DurationUnresolved("pump".into())))
        );
        assert!(!scheduler.is_active("pump"));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fixed_duration_wins_over_arguments() {
        let (mut scheduler, _clock, _gpio) = poll_scheduler();
        register_counted(&mut scheduler, "pump", Some(Duration::from_millis(5000)));

        let outcome = scheduler.dispatch("pump", &args(json!({"duration": 100})));
        assert_eq!(
            outcome,
            Some(PulseOutcome::Started {
                duration: Duration::from_millis(5000)
            })
        );
    }

    #[test]
    fn test_huge_fixed_duration_does_not_wrap() {
        let (mut scheduler, clock, _gpio) = poll_scheduler();
        // 2^64 + 384 ms: wraps to 384 ms if narrowed to u64
        let duration = Duration::from_secs(18_446_744_073_709_552);
        let counters = register_counted(&mut scheduler, "valve", Some(duration));

        assert_eq!(
            scheduler.dispatch("valve", &Arguments::new()),
            Some(PulseOutcome::Started { duration })
        );

        clock.advance(1000);
        scheduler.tick();
        assert!(scheduler.is_active("valve"));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_pulse() {
        let (scheduler, _clock, _gpio) = poll_scheduler();
        assert_eq!(scheduler.dispatch("nothing", &Arguments::new()), None);
        assert!(!scheduler.is_active("nothing"));
    }

    #[test]
    fn test_pin_pulse_drives_gpio() {
        let (mut scheduler, clock, gpio) = poll_scheduler();
        assert!(scheduler.register_pin("pump_nutrients", PinId(5), Some(Duration::from_millis(5000))));
        assert_eq!(gpio.level(PinId(5)), Some(Level::Low));

        scheduler.dispatch("pump_nutrients", &Arguments::new());
        assert_eq!(gpio.level(PinId(5)), Some(Level::High));

        clock.advance(5000);
        scheduler.tick();
        assert_eq!(gpio.level(PinId(5)), Some(Level::Low));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_pulse_cycles_repeatedly() {
        let (mut scheduler, clock, _gpio) = poll_scheduler();
        let counters = register_counted(&mut scheduler, "pump", Some(Duration::from_millis(100)));

        for round in 1..=3 {
            scheduler.dispatch("pump", &Arguments::new());
            clock.advance(100);
            scheduler.tick();
            assert!(!scheduler.is_active("pump"));
            assert_eq!(counters.stops.load(Ordering::SeqCst), round);
        }
        assert_eq!(counters.starts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_registration_limits() {
        let clock = Arc::new(ManualClock::default());
        let gpio = Arc::new(SimulatedGpio::new());
        let mut scheduler = PulseScheduler::with_capacity(1, gpio, clock, PollBackend::new());

        assert!(!scheduler.register_callbacks("", None, || {}, || {}));
        assert!(scheduler.register_callbacks("a", None, || {}, || {}));
        assert!(!scheduler.register_callbacks("a", None, || {}, || {}));
        assert!(!scheduler.register_pin("b", PinId(4), None));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_manual_timer_fire() {
        let clock = Arc::new(ManualClock::default());
        let gpio = Arc::new(SimulatedGpio::new());
        let backend = Arc::new(ManualBackend::default());
        let mut scheduler = PulseScheduler::new(gpio, clock, backend.clone());
        let counters = register_counted(&mut scheduler, "pump", None);

        scheduler.dispatch("pump", &args(json!({"duration": 3000})));
        let armed = backend.take();
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].1, Duration::from_millis(3000));
        assert_eq!(armed[0].0.slot(), 0);

        // A tick never expires timer-driven pulses
        scheduler.tick();
        assert!(scheduler.is_active("pump"));

        assert!(armed[0].0.fire());
        assert!(!scheduler.is_active("pump"));

        // Duplicate fire is harmless
        assert!(!armed[0].0.fire());
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expire_slot() {
        let (mut scheduler, _clock, _gpio) = poll_scheduler();
        let counters = register_counted(&mut scheduler, "pump", Some(Duration::from_secs(60)));

        assert!(!scheduler.expire_slot(0));
        scheduler.dispatch("pump", &Arguments::new());
        assert!(scheduler.expire_slot(0));
        assert!(!scheduler.expire_slot(0));
        assert!(!scheduler.expire_slot(3));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_backend() {
        let clock = Arc::new(ManualClock::default());
        let gpio = Arc::new(SimulatedGpio::new());
        let backend = TimerBackend::current().expect("inside a runtime");
        let mut scheduler = PulseScheduler::new(gpio, clock, backend);
        let counters = register_counted(&mut scheduler, "pump", None);
        assert_eq!(scheduler.backend_name(), "timer");

        scheduler.dispatch("pump", &args(json!({"duration_ms": 3000})));
        assert!(scheduler.is_active("pump"));

        tokio::time::sleep(Duration::from_millis(2990)).await;
        tokio::task::yield_now().await;
        assert!(scheduler.is_active("pump"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert!(!scheduler.is_active("pump"));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timer_backend_outside_runtime() {
        assert!(TimerBackend::current().is_err());
    }
}
