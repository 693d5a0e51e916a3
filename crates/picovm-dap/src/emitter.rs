//! Outbound message sequencing.

use std::sync::Mutex;

use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::error;

use crate::error::BridgeError;
use crate::protocol::{Event, Message, Payload, Request};

/// Assigns every outbound message its place in the stream.
///
/// All responses and events funnel through here. The counter and the channel
/// enqueue happen under one lock, so delivery order always matches sequence
/// order: strictly increasing from 1, no gaps, no reuse.
pub struct Emitter {
    inner: Mutex<Inner>,
}

struct Inner {
    next_seq: i64,
    tx: UnboundedSender<Message>,
}

impl Emitter {
    pub fn new() -> (Self, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Mutex::new(Inner { next_seq: 1, tx }),
            },
            rx,
        )
    }

    fn send(&self, payload: Payload) {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.tx.send(Message { seq, payload }).is_err() {
            error!(seq, "outbound channel closed, message dropped");
        }
    }

    /// Success response correlated to `request`.
    pub fn respond(&self, request: &Request, body: Value) {
        self.send(Payload::Response {
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        });
    }

    /// Failure response correlated to `request`, carrying the human-readable
    /// message and the structured error body.
    pub fn respond_error(&self, request: &Request, err: &BridgeError) {
        let message = err.to_string();
        self.send(Payload::Response {
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.clone()),
            body: json!({"error": {"id": err.id(), "format": message}}),
        });
    }

    pub fn event(&self, event: Event) {
        self.send(Payload::Event {
            event: event.name().to_string(),
            body: event.body(),
        });
    }
}
