//! Network connectivity checks before a send
//!
//! This module handles:
//! - Reporting whether the device currently has a usable link
//! - Best-effort reconnection within a time budget
//! - Reachability probing of the ingest host

mod manager;

pub use manager::{AlwaysOnline, Connectivity, TcpProbe};
