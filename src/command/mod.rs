//! Toggle command registry
//!
//! This module handles:
//! - Registering named toggle commands at setup time
//! - Dispatching server-sent commands to the first handler with that name

mod registry;

pub use registry::{CommandAction, CommandRegistry, Dispatch};
