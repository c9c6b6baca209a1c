//! JSON envelopes exchanged over `/api/ws`.
//!
//! Every text frame carries exactly one JSON object. The envelopes are
//! distinguished by which keys they carry rather than by a type tag, so
//! decoding is shape-based and first match wins:
//!
//! | Direction | Shape |
//! |---|---|
//! | producer → relay | `{"initialize": true, "source_command": "..."}` |
//! | viewer → relay | `{"subscribe": "<stream id>"}` |
//! | any → relay | `{"ping": "ping"}` |
//! | producer → relay | `{"payload": "<line>"}` |
//! | relay → producer | `{"stream_id": "<id>"}` |
//! | relay → viewer | `{"subscribe": "ok", "source_command": "..."}` |
//! | relay → any | `{"pong": "pong"}` / `{"error": {"short": "..", "msg": ".."}}` |
//! | relay → viewer | `{"payload": "<line>"}` |
//!
//! # Example
//!
//! ```rust
//! use shout::protocol::{ViewerInbound, ServerFrame};
//!
//! let frame = ServerFrame::payload("hello\n").to_json();
//! let inbound = ViewerInbound::decode(&frame).unwrap();
//! assert_eq!(inbound, ViewerInbound::Line { payload: "hello\n".to_string() });
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ShoutError};

/// Error codes reported by the relay.
pub mod codes {
    pub const NO_STREAM: &str = "NOSTREAM";
    pub const NOT_REGISTERED: &str = "NOTREGISTERED";
    pub const NO_DATA: &str = "NODATA";
    pub const BAD_JSON: &str = "BADJSON";
}

/// Body of an `{"error": ...}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Short machine-readable code, e.g. `NOSTREAM`.
    pub short: String,
    /// Human-readable message.
    pub msg: String,
}

impl ErrorBody {
    pub fn new(short: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            short: short.into(),
            msg: msg.into(),
        }
    }

    pub fn no_stream(stream_id: &str) -> Self {
        Self::new(
            codes::NO_STREAM,
            format!("That stream doesn't exist: {stream_id}"),
        )
    }

    pub fn not_registered() -> Self {
        Self::new(codes::NOT_REGISTERED, "You have not registered as a stream")
    }

    pub fn no_data() -> Self {
        Self::new(codes::NO_DATA, "Expected `payload` key with data")
    }

    pub fn bad_json(detail: impl std::fmt::Display) -> Self {
        Self::new(codes::BAD_JSON, format!("Could not decode frame: {detail}"))
    }

    /// Status line shown to a viewer: `[short] msg`.
    #[must_use]
    pub fn status_line(&self) -> String {
        format!("[{}] {}", self.short, self.msg)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client → relay
// ─────────────────────────────────────────────────────────────────────────────

/// Frames sent by producers and viewers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ClientFrame {
    Initialize {
        initialize: bool,
        source_command: Option<String>,
    },
    Subscribe {
        subscribe: String,
    },
    Ping {
        ping: String,
    },
    Payload {
        payload: String,
    },
}

impl ClientFrame {
    pub fn initialize(source_command: Option<String>) -> Self {
        Self::Initialize {
            initialize: true,
            source_command,
        }
    }

    pub fn subscribe(stream_id: impl Into<String>) -> Self {
        Self::Subscribe {
            subscribe: stream_id.into(),
        }
    }

    pub fn ping() -> Self {
        Self::Ping {
            ping: "ping".to_string(),
        }
    }

    pub fn payload(line: impl Into<String>) -> Self {
        Self::Payload {
            payload: line.into(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A client frame as classified by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayInbound {
    /// Register the sender as a producer.
    Initialize { source_command: Option<String> },
    /// Subscribe the sender to a stream.
    Subscribe { stream_id: String },
    /// Keep-alive.
    Ping,
    /// Anything else; only valid from a registered producer.
    Data { payload: Option<String> },
}

impl RelayInbound {
    pub fn decode(text: &str) -> Result<Self> {
        let map = decode_object(text)?;

        if map.get("initialize").is_some_and(is_truthy) {
            return Ok(Self::Initialize {
                source_command: map.get("source_command").and_then(text_of),
            });
        }

        if let Some(stream_id) = map
            .get("subscribe")
            .filter(|v| is_truthy(v))
            .and_then(text_of)
        {
            return Ok(Self::Subscribe { stream_id });
        }

        if map.get("ping").is_some_and(is_truthy) {
            return Ok(Self::Ping);
        }

        Ok(Self::Data {
            payload: map.get("payload").and_then(text_of),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relay → client
// ─────────────────────────────────────────────────────────────────────────────

/// Frames sent by the relay.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerFrame {
    StreamId {
        stream_id: String,
    },
    Subscribed {
        subscribe: String,
        source_command: Option<String>,
    },
    Pong {
        pong: String,
    },
    Payload {
        payload: String,
    },
    Error {
        error: ErrorBody,
    },
}

impl ServerFrame {
    pub fn stream_id(stream_id: impl Into<String>) -> Self {
        Self::StreamId {
            stream_id: stream_id.into(),
        }
    }

    pub fn subscribed(source_command: Option<String>) -> Self {
        Self::Subscribed {
            subscribe: "ok".to_string(),
            source_command,
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            pong: "pong".to_string(),
        }
    }

    pub fn payload(line: impl Into<String>) -> Self {
        Self::Payload {
            payload: line.into(),
        }
    }

    pub fn error(body: ErrorBody) -> Self {
        Self::Error { error: body }
    }

    /// Whether the relay hangs up after sending this frame.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Reply to `initialize`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StreamAssigned {
    pub stream_id: String,
}

/// A relay frame as classified by a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerInbound {
    /// Subscription confirmed.
    Subscribed { source_command: Option<String> },
    /// Relay-reported error.
    Error(ErrorBody),
    /// Any other object is a log line; a missing payload renders empty.
    Line { payload: String },
}

impl ViewerInbound {
    pub fn decode(text: &str) -> Result<Self> {
        let map = decode_object(text)?;

        if map.get("subscribe").and_then(Value::as_str) == Some("ok") {
            return Ok(Self::Subscribed {
                source_command: map
                    .get("source_command")
                    .filter(|v| is_truthy(v))
                    .and_then(text_of),
            });
        }

        if let Some(error) = map.get("error").filter(|v| is_truthy(v)) {
            return Ok(Self::Error(ErrorBody {
                short: error.get("short").and_then(text_of).unwrap_or_default(),
                msg: error.get("msg").and_then(text_of).unwrap_or_default(),
            }));
        }

        Ok(Self::Line {
            payload: map.get("payload").and_then(text_of).unwrap_or_default(),
        })
    }
}

fn decode_object(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(ShoutError::NotAnObject(other.to_string())),
    }
}

/// Loose truthiness: `null`, `false`, `0`, `""` are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text rendering of a JSON value; `null` has none.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
