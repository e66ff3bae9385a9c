//! Decoding of realtime change payloads.
//!
//! The backend's realtime channel delivers one JSON document per row
//! change. Only inserts into `messages` matter to the client; everything
//! else is rejected with a [`CodecError`] so callers can log and skip it.

use serde::{Deserialize, Serialize};

use crate::message::MessageRow;

/// Table name of the messages collection.
pub const MESSAGES_TABLE: &str = "messages";

/// Error type for realtime payload encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not valid JSON or does not match the expected shape.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The payload is well-formed but describes a change we do not consume.
    #[error("unexpected change: {event} on table {table}")]
    UnexpectedChange {
        /// The table named in the payload.
        table: String,
        /// The event type named in the payload.
        event: String,
    },
}

/// Kind of row change carried by a realtime payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A realtime change notification as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Database schema, normally `public`.
    pub schema: String,
    /// Table the change happened in.
    pub table: String,
    /// What happened to the row.
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    /// The row after the change; absent for deletes.
    #[serde(default)]
    pub new: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// Wraps a message row as an insert notification.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Serialization` if the row cannot be converted
    /// to JSON.
    pub fn message_insert(row: &MessageRow) -> Result<Self, CodecError> {
        let new =
            serde_json::to_value(row).map_err(|e| CodecError::Serialization(e.to_string()))?;
        Ok(Self {
            schema: "public".to_string(),
            table: MESSAGES_TABLE.to_string(),
            event_type: ChangeKind::Insert,
            new: Some(new),
        })
    }
}

/// Encodes a change notification as JSON bytes.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode(event: &ChangeEvent) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a change notification from JSON bytes.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes are not a valid
/// change notification.
pub fn decode(bytes: &[u8]) -> Result<ChangeEvent, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a payload and extracts the inserted message row.
///
/// # Errors
///
/// Returns `CodecError::UnexpectedChange` for changes other than inserts
/// into `messages`, and `CodecError::Serialization` for malformed payloads
/// or rows.
pub fn decode_message_insert(bytes: &[u8]) -> Result<MessageRow, CodecError> {
    let event = decode(bytes)?;
    if event.table != MESSAGES_TABLE || event.event_type != ChangeKind::Insert {
        return Err(CodecError::UnexpectedChange {
            table: event.table,
            event: event.event_type.to_string(),
        });
    }
    let new = event
        .new
        .ok_or_else(|| CodecError::Serialization("insert payload has no row".into()))?;
    serde_json::from_value(new).map_err(|e| CodecError::Serialization(e.to_string()))
}
