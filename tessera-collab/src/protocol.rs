//! JSON wire protocol for the sync relay.
//!
//! Every frame is a JSON object discriminated by `type`:
//! ```text
//! {"type":"sync","elements":[]}                         client → server (request)
//! {"type":"sync","elements":[…]}                        server → client (baseline)
//! {"type":"update","elements":[…]}                      both directions
//! {"type":"currentState","mousePositions":{…},…}        server → client
//! {"type":"mouseMove","userId":"u1","x":10,"y":20}      both directions
//! {"type":"userDisconnect","userId":"u1"}               server → client
//! {"type":"error","error":"…"}                          server → client
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tessera_core::Element;

/// Frame types this client understands.
pub const KNOWN_TYPES: [&str; 6] = [
    "sync",
    "update",
    "currentState",
    "mouseMove",
    "userDisconnect",
    "error",
];

/// Cursor position in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Entry of the connected-user registry. Unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// `"elements": null` reads as an empty forest.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Element>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Element>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    /// Baseline request (empty `elements`) or the server's baseline.
    Sync {
        #[serde(default, deserialize_with = "null_as_empty")]
        elements: Vec<Element>,
    },
    /// Full-tree broadcast.
    Update {
        #[serde(default, deserialize_with = "null_as_empty")]
        elements: Vec<Element>,
    },
    /// Presence merge-patch. Absent maps are left alone.
    CurrentState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mouse_positions: Option<HashMap<String, CursorPosition>>,
        /// `null` values clear that user's selection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_elements: Option<HashMap<String, Option<String>>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        users: Option<HashMap<String, UserProfile>>,
    },
    MouseMove {
        user_id: String,
        x: f64,
        y: f64,
    },
    UserDisconnect {
        user_id: String,
    },
    Error {
        #[serde(default)]
        error: Value,
    },
}

impl Message {
    /// The `sync` request sent right after a connection opens.
    pub fn sync_request() -> Self {
        Message::Sync {
            elements: Vec::new(),
        }
    }

    pub fn update(elements: Vec<Element>) -> Self {
        Message::Update { elements }
    }

    pub fn mouse_move(user_id: impl Into<String>, position: CursorPosition) -> Self {
        Message::MouseMove {
            user_id: user_id.into(),
            x: position.x,
            y: position.y,
        }
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Sync { .. } => "sync",
            Message::Update { .. } => "update",
            Message::CurrentState { .. } => "currentState",
            Message::MouseMove { .. } => "mouseMove",
            Message::UserDisconnect { .. } => "userDisconnect",
            Message::Error { .. } => "error",
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse a text frame.
    ///
    /// Unknown `type`s are reported separately from malformed frames so
    /// callers can log them differently.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame).map_err(ProtocolError::InvalidJson)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|source| ProtocolError::InvalidFrame { kind, source })
    }
}

/// Human-readable text of an `error` frame payload.
pub fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Null => "unspecified error".to_string(),
        other => other.to_string(),
    }
}

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no `type` field")]
    MissingType,
    #[error("unknown frame type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` frame: {source}")]
    InvalidFrame {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
