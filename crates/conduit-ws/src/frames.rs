use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client→server frames (§4.H). Unknown `type` values or malformed JSON
/// are handled by the caller — this type only covers the recognized shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Chat {
        message: String,
        #[serde(default)]
        context: Option<Value>,
    },
    Ping,
    GetStatus,
}

/// Server→client frames (§4.H, §4.G handler table).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    Pong,
    Error {
        message: String,
    },
    Status {
        #[serde(flatten)]
        data: Value,
    },
    ChatResponse {
        #[serde(flatten)]
        data: Value,
    },
    ProjectUpdate {
        #[serde(flatten)]
        data: Value,
    },
    GenerationComplete {
        #[serde(flatten)]
        data: Value,
    },
    ValidationIssues {
        #[serde(flatten)]
        data: Value,
    },
    Progress {
        #[serde(flatten)]
        data: Value,
    },
    ExternalUpdate {
        #[serde(flatten)]
        data: Value,
    },
    ConfirmationNeeded {
        #[serde(flatten)]
        data: Value,
    },
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame is always representable as JSON")
    }

    /// The reply for a frame the hub could not parse — §4.H: "Malformed
    /// frames reply with an error without disconnecting."
    pub fn invalid_json() -> Self {
        ServerFrame::Error { message: "Invalid JSON format".to_string() }
    }
}
