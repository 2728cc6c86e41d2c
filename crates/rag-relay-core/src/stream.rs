//! Server-sent event model for the frontend query stream.
//!
//! A successful query produces, in order: one `answer` event, one
//! `citation` event per citation, and a closing `done` event. A failed
//! query produces a single `error` event and nothing else.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Citation, SynthesisResponse};

/// Summary carried by the closing `done` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneSummary {
    pub latency_ms: f64,
    pub cost: f64,
    pub tokens: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Answer { text: String },
    Citation(Citation),
    Done(DoneSummary),
    Error { error: String },
}

impl StreamEvent {
    /// The SSE `event:` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Answer { .. } => "answer",
            StreamEvent::Citation(_) => "citation",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// The SSE `data:` payload.
    pub fn data(&self) -> Value {
        match self {
            StreamEvent::Answer { text } => json!({ "text": text }),
            StreamEvent::Citation(c) => serde_json::to_value(c).unwrap_or(Value::Null),
            StreamEvent::Done(d) => serde_json::to_value(d).unwrap_or(Value::Null),
            StreamEvent::Error { error } => json!({ "error": error }),
        }
    }

    /// Render as a raw `event:`/`data:` frame terminated by a blank line.
    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_name(), self.data())
    }

    /// Rebuild an event from a frame's name and JSON payload.
    pub fn from_parts(event: &str, data: Value) -> Option<Self> {
        match event {
            "answer" => Some(StreamEvent::Answer {
                text: data.get("text")?.as_str()?.to_string(),
            }),
            "citation" => serde_json::from_value(data).ok().map(StreamEvent::Citation),
            "done" => serde_json::from_value(data).ok().map(StreamEvent::Done),
            "error" => Some(StreamEvent::Error {
                error: data.get("error")?.as_str()?.to_string(),
            }),
            _ => None,
        }
    }
}

/// Events for a successful synthesis, in emission order.
pub fn events_for_response(response: &SynthesisResponse, latency_ms: f64) -> Vec<StreamEvent> {
    let mut events = Vec::with_capacity(response.citations.len() + 2);
    events.push(StreamEvent::Answer {
        text: response.answer.clone(),
    });
    events.extend(response.citations.iter().cloned().map(StreamEvent::Citation));
    events.push(StreamEvent::Done(DoneSummary {
        latency_ms,
        cost: response.cost_estimate,
        tokens: response.tokens_used,
    }));
    events
}

/// Parse a `text/event-stream` body into events.
///
/// Frames are separated by blank lines. Comment lines (keep-alives) and
/// frames with unknown names or undecodable data are skipped.
pub fn parse_event_stream(body: &str) -> Vec<StreamEvent> {
    let normalized = body.replace("\r\n", "\n");
    let mut events = Vec::new();

    for frame in normalized.split("\n\n") {
        let mut name = "message";
        let mut data_lines: Vec<&str> = Vec::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                name = rest.trim();
            } else if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if data_lines.is_empty() {
            continue;
        }
        let Ok(data) = serde_json::from_str::<Value>(&data_lines.join("\n")) else {
            continue;
        };
        if let Some(event) = StreamEvent::from_parts(name, data) {
            events.push(event);
        }
    }

    events
}
