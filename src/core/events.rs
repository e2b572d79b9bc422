//! Wire event vocabulary for the two server-push channels
//!
//! The chat stream and the sibling channel both deliver newline-delimited
//! frames whose `data:` payload is a JSON object discriminated by `type`.
//! The chat stream terminates with exactly one `done` or `error`; the
//! sibling channel is unbounded and only ends when the transport drops.

use serde::Deserialize;
use serde_json::Value;

use crate::core::character::CharacterState;

/// One decoded event from the primary chat stream.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full accumulated assistant text. Each occurrence replaces prior
    /// content; the backend may revise earlier tokens, so this is never a
    /// delta to append.
    Speak { content: String },
    /// A tool is now running on the backend.
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// The named tool finished. The content is informational only.
    ToolResult {
        #[serde(default)]
        name: String,
        #[serde(default)]
        content: String,
    },
    /// Introspection payload; fields beyond `emotion` are advisory.
    InnerState { data: InnerState },
    /// Wholesale replacement snapshot of the character's simulated state.
    State { data: CharacterState },
    /// Terminal success.
    Done,
    /// Terminal failure with a user-presentable message.
    Error { message: String },
}

impl StreamEvent {
    /// `done` and `error` both end a stream; no events are valid after
    /// either.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

/// Emotion/introspection payload carried by `inner_state`.
///
/// The backend treats this as open-ended; unknown fields are ignored and
/// every known field may be absent.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct InnerState {
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub emotions: Option<Vec<WeightedEmotion>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub energy: Option<String>,
    #[serde(default)]
    pub thought: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WeightedEmotion {
    pub name: String,
    /// 0.0 to 1.0
    #[serde(default)]
    pub intensity: f64,
}

/// One decoded event from the sibling channel.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SiblingEvent {
    /// The other companion said something within earshot.
    SiblingSpeak {
        content: String,
        #[serde(default)]
        timestamp: Option<String>,
        /// Stable speaker id, e.g. `"narin"`.
        #[serde(default)]
        speaker: Option<String>,
        /// Display name for rendering.
        #[serde(default)]
        speaker_name: Option<String>,
    },
    /// Reserved; currently produces no timeline mutation.
    SiblingTyping,
    /// Reserved; currently produces no timeline mutation.
    SiblingDone,
}
