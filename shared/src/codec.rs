//! Ingest response codec
//!
//! A successful ingest response may carry commands for the device:
//! ```text
//! { "commands": [ { "command": "<name>", "arguments": { ... }, "execution_id": "<id>" } ] }
//! ```
//!
//! Decoding is lenient: a missing or non-array `commands` field, and elements
//! without a usable `command` name, mean "nothing to do" rather than an error.
//! Only bytes that are not JSON at all produce a [`CodecError`].

use serde_json::Value;
use thiserror::Error;

use crate::{Arguments, DispatchedCommand};

/// Errors that can occur while decoding a response body
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode the commands carried by an ingest response body
///
/// Returns:
/// - `Ok(commands)` with zero or more usable commands, in response order
/// - `Err(...)` if the body is not JSON
pub fn decode_commands(body: &[u8]) -> Result<Vec<DispatchedCommand>, CodecError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let doc: Value = serde_json::from_slice(body)?;

    let items = match doc.get("commands") {
        Some(Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };

    Ok(items.iter().filter_map(decode_command).collect())
}

fn decode_command(item: &Value) -> Option<DispatchedCommand> {
    let name = item.get("command")?.as_str()?;
    if name.is_empty() {
        return None;
    }

    let arguments = match item.get("arguments") {
        Some(Value::Object(map)) => map.clone(),
        _ => Arguments::new(),
    };

    let execution_id = item
        .get("execution_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(DispatchedCommand {
        name: name.to_string(),
        arguments,
        execution_id,
    })
}
