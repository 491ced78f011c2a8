//! Relay device runtime
//!
//! Reliable telemetry delivery to the ingest service, with the commands in
//! each response dispatched to toggle handlers or self-expiring pulses.

pub mod client;
pub mod clock;
pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod pulse;
pub mod slots;
pub mod transport;

pub use client::{AckHook, Collaborators, DeviceClient, DispatchOutcome, ExpiryMode};
pub use clock::{Clock, TokioClock};
pub use config::{ClientConfig, RetryPolicy};
pub use engine::{Delivery, TransmissionEngine};
pub use relay_shared::{Arguments, DeliveryError, DispatchError};
