use serde::Deserialize;
use serde_json::{json, Value};

use crate::Message;

/// Wire shape of one channel message.
///
/// ```json
/// { "channel": "greet", "payload": "hi" }
/// ```
///
/// An envelope is built immediately before a send and taken apart
/// immediately after a receive; it is never stored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build the transport-level value for `payload` on `channel`.
    ///
    /// No validation happens here; callers check the channel name first.
    pub fn encode(channel: &str, payload: Value) -> Value {
        json!({ "channel": channel, "payload": payload })
    }

    /// Extract the envelope carried by `message`, if any.
    ///
    /// Returns `None` when the data is not an object, or its `channel` is
    /// missing, not a string, or empty. A missing `payload` decodes as JSON
    /// `null`. Unrelated traffic on a shared transport ends up here and is
    /// simply not ours, so this never fails.
    pub fn decode(message: &Message) -> Option<Envelope> {
        // ---
        // Only objects; the derived impl would also accept a sequence.
        if !message.data.is_object() {
            return None;
        }

        let envelope = Envelope::deserialize(&message.data).ok()?;
        if envelope.channel.is_empty() {
            return None;
        }
        Some(envelope)
    }
}
