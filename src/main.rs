//! Hydroponic controller demo
//!
//! Reports synthetic climate readings on an interval. The server can answer
//! with `heater_on` / `heater_off` toggles and a timed `pump_nutrients` pulse.

use anyhow::Result;
use clap::Parser;
use relay_device::connection::TcpProbe;
use relay_device::pulse::{Gpio, Level, PinId, SimulatedGpio};
use relay_device::{ClientConfig, Collaborators, DeviceClient, ExpiryMode};
use relay_shared::defaults;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const HEATER_PIN: PinId = PinId(3);
const PUMP_PIN: PinId = PinId(5);
const PUMP_DURATION: Duration = Duration::from_secs(5);
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Relay device - telemetry with remote commands
#[derive(Parser, Debug)]
#[command(name = "relay-device", version, about)]
struct Args {
    /// Project the readings belong to
    #[arg(long, env = "RELAY_PROJECT_ID")]
    project_id: String,

    /// Project API key
    #[arg(long, env = "RELAY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Validate payloads against this server-side schema
    #[arg(long, env = "RELAY_SCHEMA_ID")]
    schema_id: Option<String>,

    /// Ingestion host
    #[arg(long, env = "RELAY_BASE_URL", default_value = defaults::API_BASE_URL)]
    base_url: String,

    /// Seconds between readings
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Attempts per send
    #[arg(long, default_value_t = defaults::RETRY_ATTEMPTS)]
    retries: u32,

    /// Expire pulses from the main loop instead of timers
    #[arg(long)]
    poll: bool,

    /// Probe the ingest host and wait for it before each send
    #[arg(long)]
    managed_link: bool,

    /// Only log warnings and errors from the client
    #[arg(long)]
    quiet: bool,

    /// Dump requests and responses
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = ClientConfig {
        base_url: args.base_url.clone(),
        ..ClientConfig::default()
    };
    let expiry = if args.poll {
        ExpiryMode::Poll
    } else {
        ExpiryMode::Timer
    };

    let gpio = Arc::new(SimulatedGpio::new());
    let mut parts = Collaborators::host(&config, expiry)?;
    parts.gpio = gpio.clone();
    if args.managed_link {
        parts.link = Arc::new(TcpProbe::for_url(&config.base_url, true)?);
    }

    let mut client = DeviceClient::new(config, parts);
    client.set_verbose_logging(!args.quiet);
    client.set_debug_mode(args.debug);
    client.set_retry_attempts(args.retries);
    if let Some(schema_id) = &args.schema_id {
        client.set_schema_id(schema_id);
    }
    client.begin(&args.project_id, &args.api_key);

    gpio.configure_output(HEATER_PIN)?;
    gpio.write(HEATER_PIN, Level::Low)?;

    let heater = gpio.clone();
    client.on_command("heater_on", move |_: &relay_device::Arguments| {
        info!("Heater ON");
        if let Err(e) = heater.write(HEATER_PIN, Level::High) {
            error!("Failed to switch heater on: {}", e);
        }
    });

    let heater = gpio.clone();
    client.on_command("heater_off", move |_: &relay_device::Arguments| {
        info!("Heater OFF");
        if let Err(e) = heater.write(HEATER_PIN, Level::Low) {
            error!("Failed to switch heater off: {}", e);
        }
    });

    client.on_pulse_pin("pump_nutrients", PUMP_PIN, Some(PUMP_DURATION));

    info!("Hydroponic controller running, reporting every {}s", args.interval);

    let mut report = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut reading: u64 = 0;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = report.tick() => {
                reading += 1;
                let phase = reading as f64 * 0.4;
                let payload = json!({
                    "temperature": round1(21.0 + phase.sin() * 3.5),
                    "humidity": round1(60.0 + phase.cos() * 8.0),
                    "heater_on": gpio.level(HEATER_PIN) == Some(Level::High),
                    "pump_running": client.is_pulsing("pump_nutrients"),
                });

                if !client.send(serde_json::to_vec(&payload)?).await {
                    warn!("Reading {} not delivered", reading);
                }
            }
            _ = ticker.tick() => {
                client.tick();
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
