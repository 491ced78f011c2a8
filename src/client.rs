//! Device client - the application-facing facade
//!
//! Owns the configuration, the transmission engine and both command tables.
//! A successful send hands the response body to [`DeviceClient::process_response`],
//! which routes each command to a toggle handler first, then to a pulse.

use crate::clock::{Clock, TokioClock};
use crate::command::{CommandAction, CommandRegistry, Dispatch};
use crate::config::ClientConfig;
use crate::connection::{AlwaysOnline, Connectivity};
use crate::engine::{Delivery, TransmissionEngine};
use crate::pulse::{
    ExpiryBackend, Gpio, PinId, PollBackend, PulseAction, PulseOutcome, PulseScheduler,
    SimulatedGpio, TimerBackend,
};
use crate::transport::{HttpTransport, ReqwestTransport};
use anyhow::Result;
use bytes::Bytes;
use relay_shared::codec::decode_commands;
use relay_shared::{DeliveryError, DispatchError, DispatchedCommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to one dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A toggle handler ran
    Toggled,
    /// A pulse started
    PulseStarted { duration: Duration },
    /// The pulse was already on
    PulseIgnored,
    /// The pulse had no usable duration
    PulseRejected(DispatchError),
    /// Nothing is registered under the command's name
    NoHandler(DispatchError),
}

/// Local notification after each dispatched command.
///
/// Nothing is reported back to the server; the ingest protocol has no
/// acknowledgement message.
pub trait AckHook: Send + Sync {
    fn on_dispatched(&self, execution_id: &str, outcome: &DispatchOutcome);
}

impl<F> AckHook for F
where
    F: Fn(&str, &DispatchOutcome) + Send + Sync,
{
    fn on_dispatched(&self, execution_id: &str, outcome: &DispatchOutcome) {
        self(execution_id, outcome)
    }
}

/// How active pulses get switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryMode {
    /// One tokio timer per pulse
    #[default]
    Timer,
    /// Expired from `DeviceClient::tick()`
    Poll,
}

/// Everything the client talks to outside itself
pub struct Collaborators {
    pub transport: Arc<dyn HttpTransport>,
    pub link: Arc<dyn Connectivity>,
    pub clock: Arc<dyn Clock>,
    pub gpio: Arc<dyn Gpio>,
    pub backend: Box<dyn ExpiryBackend>,
}

impl Collaborators {
    /// Host defaults: reqwest, OS-managed network, tokio time, simulated pins.
    ///
    /// `ExpiryMode::Timer` must be called from inside a tokio runtime.
    pub fn host(config: &ClientConfig, expiry: ExpiryMode) -> Result<Self> {
        let backend: Box<dyn ExpiryBackend> = match expiry {
            ExpiryMode::Timer => Box::new(TimerBackend::current()?),
            ExpiryMode::Poll => Box::new(PollBackend::new()),
        };

        Ok(Self {
            transport: Arc::new(ReqwestTransport::new(config.http_timeout)?),
            link: Arc::new(AlwaysOnline),
            clock: Arc::new(TokioClock::new()),
            gpio: Arc::new(SimulatedGpio::new()),
            backend,
        })
    }
}

/// Telemetry client with remote command dispatch
pub struct DeviceClient {
    config: ClientConfig,
    engine: TransmissionEngine,
    commands: CommandRegistry,
    pulses: PulseScheduler,
    ack: Option<Box<dyn AckHook>>,
}

impl DeviceClient {
    pub fn new(config: ClientConfig, parts: Collaborators) -> Self {
        let engine = TransmissionEngine::new(parts.transport, parts.link, parts.clock.clone());

        let mut commands = CommandRegistry::new();
        commands.set_verbose(config.verbose);

        let mut pulses = PulseScheduler::new(parts.gpio, parts.clock, parts.backend);
        pulses.set_verbose(config.verbose);

        Self {
            config,
            engine,
            commands,
            pulses,
            ack: None,
        }
    }

    /// Client with host collaborators
    pub fn with_defaults(config: ClientConfig, expiry: ExpiryMode) -> Result<Self> {
        let parts = Collaborators::host(&config, expiry)?;
        Ok(Self::new(config, parts))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Set the project credentials
    pub fn begin(&mut self, project_id: &str, api_key: &str) {
        self.config.project_id = project_id.to_string();
        self.config.api_key = api_key.to_string();

        if self.config.verbose {
            info!("Relay client initialized");
            info!("  Project: {}", project_id);
            info!("  Pulse backend: {}", self.pulses.backend_name());
        }
    }

    pub fn set_schema_id(&mut self, schema_id: &str) {
        self.config.schema_id = Some(schema_id.to_string()).filter(|id| !id.is_empty());
    }

    pub fn set_retry_attempts(&mut self, attempts: u32) {
        self.config.retry.attempts = attempts;
    }

    /// Delay after the first failed attempt
    pub fn set_retry_delay(&mut self, delay: Duration) {
        self.config.retry.base_delay = delay;
    }

    pub fn set_verbose_logging(&mut self, enabled: bool) {
        self.config.verbose = enabled;
        self.commands.set_verbose(enabled);
        self.pulses.set_verbose(enabled);
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.config.debug = enabled;
    }

    pub fn set_ack_hook(&mut self, hook: impl AckHook + 'static) {
        self.ack = Some(Box::new(hook));
    }

    /// Register a toggle command
    pub fn on_command(&mut self, name: &str, action: impl CommandAction + 'static) -> bool {
        self.commands.register(name, action)
    }

    /// Register a pulse that drives `pin` high for `duration`
    /// (`None`: taken from each command's arguments)
    pub fn on_pulse_pin(&mut self, name: &str, pin: PinId, duration: Option<Duration>) -> bool {
        self.pulses.register_pin(name, pin, duration)
    }

    /// Register a pulse that runs `on_start`, then `on_stop` after `duration`
    pub fn on_pulse(
        &mut self,
        name: &str,
        duration: Option<Duration>,
        on_start: impl PulseAction + 'static,
        on_stop: impl PulseAction + 'static,
    ) -> bool {
        self.pulses
            .register_callbacks(name, duration, on_start, on_stop)
    }

    /// Whether the pulse `name` is on; `false` for unknown names
    pub fn is_pulsing(&self, name: &str) -> bool {
        self.pulses.is_active(name)
    }

    /// Expire due pulses; call often when using [`ExpiryMode::Poll`]
    pub fn tick(&self) {
        self.pulses.tick();
    }

    /// Deliver `payload` and run any commands in the response
    pub async fn try_send(&self, payload: impl Into<Bytes>) -> Result<Delivery, DeliveryError> {
        let delivery = self.engine.send(&self.config, payload.into()).await?;
        self.process_response(&delivery.body);
        Ok(delivery)
    }

    /// Deliver `payload`; `true` once the server accepted it
    pub async fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.try_send(payload).await.is_ok()
    }

    /// Dispatch every command in an ingest response body.
    ///
    /// A body that is not JSON counts as no commands.
    pub fn process_response(&self, body: &[u8]) -> Vec<DispatchOutcome> {
        let commands = match decode_commands(body) {
            Ok(commands) => commands,
            Err(e) => {
                if self.config.debug {
                    debug!("Ignoring response body: {}", e);
                }
                return Vec::new();
            }
        };

        if commands.is_empty() {
            return Vec::new();
        }

        if self.config.verbose {
            info!("Received {} command(s)", commands.len());
        }

        commands
            .iter()
            .map(|command| {
                let outcome = self.dispatch(command);
                if let Some(ack) = &self.ack {
                    ack.on_dispatched(&command.execution_id, &outcome);
                }
                outcome
            })
            .collect()
    }

    fn dispatch(&self, command: &DispatchedCommand) -> DispatchOutcome {
        if self.config.verbose {
            info!(
                "Dispatching command: {} (execution {})",
                command.name, command.execution_id
            );
        }

        if self.commands.dispatch(&command.name, &command.arguments) == Dispatch::Dispatched {
            return DispatchOutcome::Toggled;
        }

        match self.pulses.dispatch(&command.name, &command.arguments) {
            Some(PulseOutcome::Started { duration }) => DispatchOutcome::PulseStarted { duration },
            Some(PulseOutcome::Ignored) => DispatchOutcome::PulseIgnored,
            Some(PulseOutcome::Rejected(e)) => DispatchOutcome::PulseRejected(e),
            None => {
                if self.config.verbose {
                    warn!("No handler for command: {}", command.name);
                }
                DispatchOutcome::NoHandler(DispatchError::CommandNotFound(command.name.clone()))
            }
        }
    }
}
