//! Streaming Bus: converts concurrent callback invocations — the Agent Runtime's token
//! callback and tool dispatch — into an ordered sequence of SSE-ready frames. An
//! `mpsc::Sender`-backed channel with non-blocking `try_send` (dropping events rather than
//! blocking the worker) feeds a `publish`/`close`/`iter`-shaped consumer side.

use std::time::Instant;

use okcvm_protocol::envelope::{to_json, EnvelopeState};
use okcvm_protocol::event::{truncate_for_stream, StreamEvent, ToolCompletionStatus};
use serde_json::Value;
use tokio::sync::mpsc;

/// Queue capacity for one chat request's event channel.
pub const EVENT_QUEUE_CAPACITY: usize = 128;

/// Producer handle. Cheaply cloneable; every clone publishes onto the same bound receiver.
#[derive(Clone)]
pub struct StreamingBus {
    tx: mpsc::Sender<StreamEvent>,
}

/// Consumer half: drains events in publish order and renders each as an SSE `data: ...\n\n`
/// frame, terminating after the first `final`/`error`/`stop` event.
pub struct BusReceiver {
    rx: mpsc::Receiver<StreamEvent>,
    envelope: EnvelopeState,
    done: bool,
}

impl StreamingBus {
    /// Builds a bound producer/consumer pair for one chat request.
    pub fn channel(session_id: impl Into<String>, capacity: usize) -> (Self, BusReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self { tx },
            BusReceiver {
                rx,
                envelope: EnvelopeState::new(session_id.into()),
                done: false,
            },
        )
    }

    /// Non-blocking from any thread; silently drops the event if the receiver has already been
    /// dropped or the queue is full rather than blocking the caller.
    pub fn publish(&self, event: StreamEvent) {
        if self.tx.try_send(event).is_err() {
            tracing::warn!("streaming bus full or closed, dropping event");
        }
    }

    pub fn token(&self, delta: impl Into<String>) {
        self.publish(StreamEvent::Token { delta: delta.into() });
    }

    pub fn tool_started(&self, invocation_id: impl Into<String>, tool_name: impl Into<String>, input: Value) {
        self.publish(StreamEvent::ToolStarted {
            invocation_id: invocation_id.into(),
            tool_name: Some(tool_name.into()),
            input: Some(input),
        });
    }

    /// Publishes a `tool_completed` event, truncating output/error to the soft cap.
    pub fn tool_completed(
        &self,
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        success: bool,
        started_at: Instant,
        output: Option<&str>,
        error: Option<&str>,
    ) {
        self.publish(StreamEvent::ToolCompleted {
            invocation_id: invocation_id.into(),
            tool_name: Some(tool_name.into()),
            status: if success {
                ToolCompletionStatus::Success
            } else {
                ToolCompletionStatus::Error
            },
            duration_ms: started_at.elapsed().as_millis() as u64,
            output: output.map(truncate_for_stream),
            error: error.map(truncate_for_stream),
        });
    }

    /// Same as [`tool_completed`](Self::tool_completed) but takes an already-measured duration
    /// rather than a start instant — used when the caller (e.g. an [`okcvm_agent::ToolEventSink`]
    /// implementation) only has the elapsed time, not the instant dispatch began.
    pub fn tool_completed_after(
        &self,
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        success: bool,
        duration: std::time::Duration,
        output: Option<&str>,
        error: Option<&str>,
    ) {
        self.publish(StreamEvent::ToolCompleted {
            invocation_id: invocation_id.into(),
            tool_name: Some(tool_name.into()),
            status: if success {
                ToolCompletionStatus::Success
            } else {
                ToolCompletionStatus::Error
            },
            duration_ms: duration.as_millis() as u64,
            output: output.map(truncate_for_stream),
            error: error.map(truncate_for_stream),
        });
    }

    pub fn final_event(&self, payload: Value) {
        self.publish(StreamEvent::Final { payload });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(StreamEvent::Error { message: message.into() });
    }

    /// Idempotent: schedules the sentinel. Safe to call after `final`/`error` has already
    /// terminated the receiver; the sentinel is simply never observed.
    pub fn close(&self) {
        self.publish(StreamEvent::Stop);
    }
}

impl BusReceiver {
    /// Yields the next SSE frame, or `None` once the stream has terminated.
    pub async fn next_frame(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let event = self.rx.recv().await?;
        if matches!(event, StreamEvent::Stop) {
            self.done = true;
            return None;
        }
        let terminal = event.is_terminal();
        let value = to_json(&event, &mut self.envelope).ok()?;
        if terminal {
            self.done = true;
        }
        Some(format!("data: {value}\n\n"))
    }

    /// Raw event variant of [`next_frame`], useful for tests and non-HTTP consumers that want
    /// the structured event rather than a pre-rendered frame.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        let event = self.rx.recv().await?;
        if event.is_terminal() {
            self.done = true;
        }
        if matches!(event, StreamEvent::Stop) {
            return None;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_terminate_after_final() {
        let (bus, mut rx) = StreamingBus::channel("sess-1", EVENT_QUEUE_CAPACITY);
        bus.token("hel");
        bus.token("lo");
        bus.final_event(serde_json::json!({"reply": "hi"}));
        bus.close();

        let first = rx.next_frame().await.unwrap();
        assert!(first.contains("\"type\":\"token\""));
        let second = rx.next_frame().await.unwrap();
        assert!(second.contains("\"delta\":\"lo\""));
        let third = rx.next_frame().await.unwrap();
        assert!(third.contains("\"type\":\"final\""));
        assert!(rx.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn stop_sentinel_alone_terminates_with_no_frame() {
        let (bus, mut rx) = StreamingBus::channel("sess-2", EVENT_QUEUE_CAPACITY);
        bus.close();
        assert!(rx.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn tool_completed_truncates_long_output() {
        let (bus, mut rx) = StreamingBus::channel("sess-3", EVENT_QUEUE_CAPACITY);
        let long = "x".repeat(1000);
        bus.tool_completed("call-1", "mshtools-shell", true, Instant::now(), Some(&long), None);
        bus.close();
        let frame = rx.next_frame().await.unwrap();
        assert!(frame.len() < 1000);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_panic_publisher() {
        let (bus, rx) = StreamingBus::channel("sess-4", EVENT_QUEUE_CAPACITY);
        drop(rx);
        bus.token("no one is listening");
    }
}
