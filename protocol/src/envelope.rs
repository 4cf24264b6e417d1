//! Envelope (session_id, event_id) applied to every event leaving the Streaming Bus.

use crate::event::StreamEvent;
use serde_json::Value;

/// Envelope fields attached to each message: session id (constant for the stream) and a
/// per-message sequence number (monotonically increasing within one turn).
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub session_id: Option<String>,
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one turn: session_id plus the next event_id to hand out.
pub struct EnvelopeState {
    pub session_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            next_event_id: 1,
        }
    }

    /// Injects the envelope into the event value and advances `next_event_id`.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }
}

/// Converts a stream event to JSON and injects the envelope using the given state.
/// Returns the final value (type + payload + session_id, event_id).
pub fn to_json(
    event: &StreamEvent,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_inject_does_not_overwrite_existing_keys() {
        let mut obj = serde_json::json!({"type":"token","content":"hi","session_id":"keep-me"});
        let env = Envelope::new()
            .with_session_id("sess-1")
            .with_event_id(1);
        env.inject_into(&mut obj);
        assert_eq!(obj["session_id"], "keep-me");
        assert_eq!(obj["event_id"], 1);
    }

    #[test]
    fn to_json_injects_increasing_event_ids() {
        let mut state = EnvelopeState::new("sess-7".to_string());
        let a = to_json(&StreamEvent::Token { delta: "a".into() }, &mut state).unwrap();
        let b = to_json(&StreamEvent::Stop, &mut state).unwrap();
        assert_eq!(a["session_id"], "sess-7");
        assert_eq!(a["event_id"], 1);
        assert_eq!(b["event_id"], 2);
        assert_eq!(b["type"], "stop");
    }
}
