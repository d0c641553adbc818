use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};

/// Tag the server uses for the handshake message carrying the socket id.
pub const CONNECTION_SUCCESSFUL: &str = "ConnectionSuccessful";

/// Known tags of messages pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    ConnectionSuccessful,
    SimulationStatus,
    SimulationStatusInform,
    SimulationStatusError,
    SimulationStatusNeutral,
    SimulationOutput,
    SimulationDebug,
    SimulationDialog,
    SimulationErrorDialog,
    SimulationError,
    SimulationEnded,
    RuntimeError,
    GamaServerError,
    MalformedRequest,
    CommandExecutedSuccessfully,
    UnableToExecuteRequest,
    /// Tag this client does not know about.
    Other(String),
}

impl MessageType {
    /// Map a raw tag, falling back to `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            CONNECTION_SUCCESSFUL => MessageType::ConnectionSuccessful,
            "SimulationStatus" => MessageType::SimulationStatus,
            "SimulationStatusInform" => MessageType::SimulationStatusInform,
            "SimulationStatusError" => MessageType::SimulationStatusError,
            "SimulationStatusNeutral" => MessageType::SimulationStatusNeutral,
            "SimulationOutput" => MessageType::SimulationOutput,
            "SimulationDebug" => MessageType::SimulationDebug,
            "SimulationDialog" => MessageType::SimulationDialog,
            "SimulationErrorDialog" => MessageType::SimulationErrorDialog,
            "SimulationError" => MessageType::SimulationError,
            "SimulationEnded" => MessageType::SimulationEnded,
            "RuntimeError" => MessageType::RuntimeError,
            "GamaServerError" => MessageType::GamaServerError,
            "MalformedRequest" => MessageType::MalformedRequest,
            "CommandExecutedSuccessfully" => MessageType::CommandExecutedSuccessfully,
            "UnableToExecuteRequest" => MessageType::UnableToExecuteRequest,
            other => MessageType::Other(other.to_string()),
        }
    }

    /// Tag as sent by the server.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::ConnectionSuccessful => CONNECTION_SUCCESSFUL,
            MessageType::SimulationStatus => "SimulationStatus",
            MessageType::SimulationStatusInform => "SimulationStatusInform",
            MessageType::SimulationStatusError => "SimulationStatusError",
            MessageType::SimulationStatusNeutral => "SimulationStatusNeutral",
            MessageType::SimulationOutput => "SimulationOutput",
            MessageType::SimulationDebug => "SimulationDebug",
            MessageType::SimulationDialog => "SimulationDialog",
            MessageType::SimulationErrorDialog => "SimulationErrorDialog",
            MessageType::SimulationError => "SimulationError",
            MessageType::SimulationEnded => "SimulationEnded",
            MessageType::RuntimeError => "RuntimeError",
            MessageType::GamaServerError => "GamaServerError",
            MessageType::MalformedRequest => "MalformedRequest",
            MessageType::CommandExecutedSuccessfully => "CommandExecutedSuccessfully",
            MessageType::UnableToExecuteRequest => "UnableToExecuteRequest",
            MessageType::Other(tag) => tag,
        }
    }

    /// Whether the server uses this tag to report a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MessageType::SimulationStatusError
                | MessageType::SimulationErrorDialog
                | MessageType::SimulationError
                | MessageType::RuntimeError
                | MessageType::GamaServerError
                | MessageType::MalformedRequest
                | MessageType::UnableToExecuteRequest
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed JSON object received from the server.
///
/// The full payload is kept as-is; accessors only read the conventional
/// `type` and `content` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InboundMessage {
    payload: Map<String, Value>,
}

impl InboundMessage {
    /// Parse a text frame. Anything but a JSON object is rejected.
    pub fn parse(text: &str) -> ClientResult<Self> {
        let value = serde_json::from_str(text).map_err(|err| ClientError::malformed(err.to_string()))?;
        Self::from_value(value)
    }

    /// Parse a binary frame holding UTF-8 JSON.
    pub fn parse_bytes(bytes: &[u8]) -> ClientResult<Self> {
        let value =
            serde_json::from_slice(bytes).map_err(|err| ClientError::malformed(err.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> ClientResult<Self> {
        match value {
            Value::Object(payload) => Ok(Self { payload }),
            other => Err(ClientError::malformed(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Raw `type` tag, if present and a string.
    pub fn tag(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// Typed view of the `type` tag.
    pub fn message_type(&self) -> Option<MessageType> {
        self.tag().map(MessageType::from_tag)
    }

    /// The `content` payload, if any.
    pub fn content(&self) -> Option<&Value> {
        self.payload.get("content")
    }

    /// Look up any top-level key, e.g. an echoed `exp_id`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The whole parsed object.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Consume into a plain JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.payload)
    }

    /// Socket id carried by a handshake message with the given tag.
    pub(crate) fn handshake_socket_id(&self, tag: &str) -> Option<&str> {
        if self.tag()? != tag {
            return None;
        }
        self.content().and_then(Value::as_str)
    }
}
