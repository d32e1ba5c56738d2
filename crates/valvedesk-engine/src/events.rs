use serde::{Deserialize, Serialize};

/// Events emitted while driving one conversational turn.
///
/// Ordering contract: `Meta` is always first; `Done` or `Error` is always
/// last and unique; the concatenation of `Content` deltas and `ToolNotice`
/// texts, in emission order, equals the persisted assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Meta {
        conversation_id: String,
        is_new_conversation: bool,
    },

    Content {
        delta: String,
    },

    /// Informational marker around a tool invocation; its text is part of
    /// the persisted assistant message like any content delta.
    ToolNotice {
        text: String,
    },

    Done {
        user_message_id: String,
        assistant_message_id: String,
    },

    Error {
        message: String,
    },
}

impl ChatEvent {
    /// Text this event contributes to the persisted assistant message
    pub fn response_text(&self) -> Option<&str> {
        match self {
            Self::Content { delta } => Some(delta),
            Self::ToolNotice { text } => Some(text),
            _ => None,
        }
    }
}
