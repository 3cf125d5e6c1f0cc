//! Envelope encode/decode.
//!
//! Canonical form is UTF-8 JSON. Decode tolerates unknown keys (they are
//! dropped, deterministically) and reports a human-readable reason on
//! malformed input. Encode prefers structured payloads; a value that cannot
//! be represented structurally falls back to its string rendering, and the
//! fallback is logged.

use super::Envelope;
use crate::types::{Error, Result};

/// Encode an envelope to its canonical UTF-8 form.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Decode an envelope from wire bytes.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| Error::decode(format!("malformed envelope: {}", e)))?;

    for (field, value) in [
        ("from_agent", &envelope.from_agent),
        ("to_agent", &envelope.to_agent),
        ("trace_id", &envelope.trace_id),
        ("conversation_id", &envelope.conversation_id),
    ] {
        if value.is_empty() {
            return Err(Error::decode(format!("envelope field {} is empty", field)));
        }
    }

    Ok(envelope)
}

/// Convert a value into a structured payload, falling back to its debug
/// rendering as a JSON string when structured encoding fails.
pub fn payload_or_string<T: serde::Serialize + std::fmt::Debug>(value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(structured) => structured,
        Err(e) => {
            tracing::warn!(error = %e, "payload not structurally encodable, falling back to string");
            serde_json::Value::String(format!("{:?}", value))
        }
    }
}
