// src/message.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity attached to generation failures.
pub const LEVEL_CRITICAL: &str = "critical";

/// A record pushed to preview clients.
///
/// Serialized as a JSON object with a `payload` discriminator:
/// - `{"payload":"raml","data":{...}}`
/// - `{"payload":"generating-json"}`
/// - `{"payload":"error","level":"critical","message":"..."}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "payload")]
pub enum Message {
    /// The regenerated document. `data` is omitted when there is no source.
    #[serde(rename = "raml")]
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Regeneration is in progress.
    #[serde(rename = "generating-json")]
    Generating,
    /// Regeneration failed.
    #[serde(rename = "error")]
    Error { level: String, message: String },
}

impl Message {
    /// An error notice with the `critical` level.
    pub fn critical(message: impl Into<String>) -> Self {
        Message::Error {
            level: LEVEL_CRITICAL.to_string(),
            message: message.into(),
        }
    }

    /// Wire name of the `payload` discriminator.
    pub fn payload(&self) -> &'static str {
        match self {
            Message::Document { .. } => "raml",
            Message::Generating => "generating-json",
            Message::Error { .. } => "error",
        }
    }

    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
