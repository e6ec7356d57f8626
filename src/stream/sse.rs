//! Server-Sent Events framing.
//!
//! Frames are separated by blank lines. `event:`, `data:` and `id:` fields are
//! collected per frame; comment lines (`:`) are ignored. Input may arrive in
//! arbitrary chunks, including chunks that split a UTF-8 sequence.

use super::{StreamItem, StreamedEvent};
use serde_json::Value;

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() && self.event.is_none() {
            self.id = None;
            return None;
        }
        let frame = SseFrame {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        };
        self.data.clear();
        Some(frame)
    }
}

impl StreamItem {
    /// Interprets a frame from the event API.
    ///
    /// Frames without an `event:` field are treated as events when their data
    /// is an object carrying an `event_name`.
    pub fn from_frame(frame: SseFrame) -> Self {
        let payload = serde_json::from_str::<Value>(&frame.data)
            .unwrap_or_else(|_| Value::String(frame.data.clone()));

        match frame.event.as_deref() {
            Some("event_created") if payload.is_object() => {
                Self::EventCreated(StreamedEvent::new(payload))
            }
            Some("heartbeat") => Self::Heartbeat,
            Some("error") => Self::Error(payload),
            None if payload.get("event_name").is_some() => {
                Self::EventCreated(StreamedEvent::new(payload))
            }
            Some(other) => Self::Unknown(other.to_string()),
            None => Self::Unknown("message".to_string()),
        }
    }
}

#[cfg(test)]
#[path = "tests/sse_tests.rs"]
mod tests;
