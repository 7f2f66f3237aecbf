//! Push channel message types
//!
//! Messages are JSON objects tagged by `action`:
//!
//! ```text
//! { "action": "sync",   "notes": [Note, ...] }
//! { "action": "create", "note": Note }
//! { "action": "update", "note": { "id": ..., <changed fields> } }
//! { "action": "delete", "note": { "id": ... } }
//! { "action": "tick",   "now": "2024-05-01T10:00:00" }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::models::{Note, NotePatch};

/// A partial note carried by an `update` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteUpdate {
    pub id: String,
    #[serde(flatten)]
    pub changes: NotePatch,
}

/// Reference to a note by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRef {
    pub id: String,
}

/// Messages received on the push channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PushMessage {
    /// Authoritative full snapshot
    Sync { notes: Vec<Note> },

    /// A note was created
    Create { note: Note },

    /// Some fields of a note changed
    Update { note: NoteUpdate },

    /// A note was deleted
    Delete { note: NoteRef },

    /// Server clock
    Tick { now: String },
}

impl PushMessage {
    /// Decode and validate a message from its JSON text
    pub fn decode(text: &str) -> Result<Self, MessageError> {
        let message: PushMessage = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// The wire name of this message's action
    pub fn action(&self) -> &'static str {
        match self {
            PushMessage::Sync { .. } => "sync",
            PushMessage::Create { .. } => "create",
            PushMessage::Update { .. } => "update",
            PushMessage::Delete { .. } => "delete",
            PushMessage::Tick { .. } => "tick",
        }
    }

    fn validate(&self) -> Result<(), MessageError> {
        let has_id = match self {
            PushMessage::Create { note } => !note.is_draft(),
            PushMessage::Update { note } => !note.id.is_empty(),
            PushMessage::Delete { note } => !note.id.is_empty(),
            PushMessage::Sync { .. } | PushMessage::Tick { .. } => true,
        };
        if has_id {
            Ok(())
        } else {
            Err(MessageError::MissingId {
                action: self.action(),
            })
        }
    }
}
