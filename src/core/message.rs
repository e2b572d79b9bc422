use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::id::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    Sibling,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Sibling => "sibling",
        }
    }

    /// The history endpoint only ever returns `user` and `assistant`.
    pub fn from_api_role(role: &str) -> Result<Self, String> {
        Self::try_from(role)
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }

    pub fn is_sibling(self) -> bool {
        self == Role::Sibling
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "sibling" => Ok(Role::Sibling),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One timeline entry.
///
/// Exactly one message per timeline may have `is_streaming == true`, and
/// only while a send is outstanding; the session engine owns that
/// invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_streaming: bool,
    /// Emotion tag from the most recent `inner_state` event.
    #[serde(default)]
    pub emotion: Option<String>,
    /// Name of the tool currently running for this message, if any.
    #[serde(default)]
    pub tool_use: Option<String>,
    /// Marks a user message that carried an image attachment.
    #[serde(default)]
    pub has_image: bool,
    /// Stable id of the sibling speaker, for sibling-role messages.
    #[serde(default)]
    pub sibling_id: Option<String>,
    /// Display name of the sibling speaker.
    #[serde(default)]
    pub sibling_name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(""),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming: false,
            emotion: None,
            tool_use: None,
            has_image: false,
            sibling_id: None,
            sibling_name: None,
        }
    }

    pub fn user(content: impl Into<String>, has_image: bool) -> Self {
        let mut msg = Self::new(Role::User, content);
        msg.has_image = has_image;
        msg
    }

    /// Placeholder created at send time, filled in by stream events.
    pub fn assistant_placeholder() -> Self {
        let mut msg = Self::new(Role::Assistant, "");
        msg.is_streaming = true;
        msg
    }

    pub fn sibling(
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        sibling_id: Option<String>,
        sibling_name: Option<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Sibling, content);
        msg.id = generate_id("sib-");
        msg.timestamp = timestamp;
        msg.sibling_id = sibling_id;
        msg.sibling_name = sibling_name;
        msg
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn is_sibling(&self) -> bool {
        self.role.is_sibling()
    }
}
