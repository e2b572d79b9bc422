//! Chat Session Engine
//!
//! Owns one character's message timeline and everything the presentation
//! layer reads: the single-flight busy flag, the latest emotion, the latest
//! structured state snapshot, and the last error. The timeline is mutated
//! only through the operations here; stream tasks and the sibling channel
//! talk to the session exclusively via decoded events.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::fetch_conversation;
use crate::core::character::CharacterState;
use crate::core::chat_stream::ChatStreamUpdate;
use crate::core::events::{SiblingEvent, StreamEvent};
use crate::core::message::{Message, Role};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

pub struct ChatSession {
    pub messages: Vec<Message>,
    /// Single-flight flag: true from send-issued to stream close.
    pub is_streaming: bool,
    pub current_emotion: Option<String>,
    pub character_state: Option<CharacterState>,
    pub last_error: Option<String>,
    character_id: String,
    /// Monotonic per-send id. Updates carrying any other id are stale
    /// (superseded send, or a send issued before the timeline was cleared)
    /// and are discarded without touching the timeline.
    current_stream_id: u64,
    current_assistant_id: Option<String>,
}

impl ChatSession {
    pub fn new(character_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            is_streaming: false,
            current_emotion: None,
            character_state: None,
            last_error: None,
            character_id: character_id.into(),
            current_stream_id: 0,
            current_assistant_id: None,
        }
    }

    pub fn character_id(&self) -> &str {
        &self.character_id
    }

    /// Switch companions: the old timeline is destroyed wholesale.
    pub fn switch_character(&mut self, character_id: impl Into<String>) {
        self.character_id = character_id.into();
        self.clear_messages();
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.current_stream_id == stream_id
    }

    /// Start a send: append the user message and the streaming assistant
    /// placeholder in one atomic update, and reserve a new stream id.
    ///
    /// Returns `None` while another send is outstanding (single-flight).
    pub fn begin_send(&mut self, text: &str, image_base64: Option<&str>) -> Option<u64> {
        if self.is_streaming {
            return None;
        }
        self.last_error = None;

        let user = Message::user(text, image_base64.is_some());
        let placeholder = Message::assistant_placeholder();
        self.current_assistant_id = Some(placeholder.id.clone());
        // Both entries land together so no render ever sees one without
        // the other.
        self.messages.extend([user, placeholder]);

        self.is_streaming = true;
        self.current_stream_id += 1;
        Some(self.current_stream_id)
    }

    /// Apply one update from a chat stream task. Stale stream ids are
    /// dropped.
    pub fn apply_update(&mut self, update: ChatStreamUpdate, stream_id: u64) {
        if !self.is_current_stream(stream_id) {
            return;
        }
        match update {
            ChatStreamUpdate::Event(event) => self.apply_stream_event(&event),
            ChatStreamUpdate::Closed => {
                // Reached on every exit path of the stream task, including
                // EOF without a terminal event.
                self.is_streaming = false;
                if let Some(msg) = self.current_assistant_mut() {
                    msg.is_streaming = false;
                    msg.tool_use = None;
                }
            }
        }
    }

    fn current_assistant_mut(&mut self) -> Option<&mut Message> {
        let id = self.current_assistant_id.as_deref()?;
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn apply_stream_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Speak { content } => {
                // Full accumulated text: replace, never append.
                if let Some(msg) = self.current_assistant_mut() {
                    msg.content = content.clone();
                }
            }
            StreamEvent::ToolUse { name, .. } => {
                if let Some(msg) = self.current_assistant_mut() {
                    msg.tool_use = Some(name.clone());
                }
            }
            StreamEvent::ToolResult { .. } => {
                if let Some(msg) = self.current_assistant_mut() {
                    msg.tool_use = None;
                }
            }
            StreamEvent::InnerState { data } => {
                if let Some(emotion) = &data.emotion {
                    self.current_emotion = Some(emotion.clone());
                    if let Some(msg) = self.current_assistant_mut() {
                        msg.emotion = Some(emotion.clone());
                    }
                }
            }
            StreamEvent::State { data } => {
                self.character_state = Some(data.clone());
            }
            StreamEvent::Done => {
                self.is_streaming = false;
                if let Some(msg) = self.current_assistant_mut() {
                    msg.is_streaming = false;
                    msg.tool_use = None;
                }
            }
            StreamEvent::Error { message } => {
                self.is_streaming = false;
                self.last_error = Some(message.clone());
                if let Some(msg) = self.current_assistant_mut() {
                    msg.content = message.clone();
                    msg.is_streaming = false;
                    msg.tool_use = None;
                }
            }
        }
    }

    /// Timeline Reconciler: append cross-character events in arrival
    /// order. May interleave with an in-flight primary stream.
    pub fn push_sibling(&mut self, event: SiblingEvent) {
        match event {
            SiblingEvent::SiblingSpeak {
                content,
                timestamp,
                speaker,
                speaker_name,
            } => {
                let timestamp = timestamp
                    .as_deref()
                    .and_then(parse_timestamp)
                    .unwrap_or_else(Utc::now);
                self.messages
                    .push(Message::sibling(content, timestamp, speaker, speaker_name));
            }
            // Reserved events, no timeline effect yet.
            SiblingEvent::SiblingTyping | SiblingEvent::SiblingDone => {}
        }
    }

    /// Fetch recent history and replace the timeline wholesale. History
    /// unavailability never blocks chat: failures are logged and swallowed.
    pub async fn load_history(
        &mut self,
        client: &reqwest::Client,
        base_url: &str,
        token: &str,
        limit: usize,
    ) {
        match fetch_conversation(client, base_url, token, &self.character_id, limit).await {
            Ok(response) => self.replace_with_history(&response.conversation),
            Err(err) => {
                warn!("history load failed for {}: {err}", self.character_id);
            }
        }
    }

    pub fn replace_with_history(&mut self, conversation: &[crate::api::models::ConversationMessage]) {
        let mut loaded = Vec::with_capacity(conversation.len());
        for (i, entry) in conversation.iter().enumerate() {
            let role = match Role::from_api_role(&entry.role) {
                Ok(role) => role,
                Err(err) => {
                    warn!("skipping history entry {i}: {err}");
                    continue;
                }
            };
            let mut msg = Message::new(role, entry.content.clone());
            msg.id = format!("history-{i}");
            if let Some(ts) = entry.timestamp.as_deref().and_then(parse_timestamp) {
                msg.timestamp = ts;
            }
            loaded.push(msg);
        }
        self.messages = loaded;
    }

    /// Reset everything for a character switch. Bumping the stream id here
    /// makes any still-running send's updates stale, so they are discarded
    /// explicitly rather than mutating a cleared timeline.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.current_emotion = None;
        self.character_state = None;
        self.last_error = None;
        self.is_streaming = false;
        self.current_assistant_id = None;
        self.current_stream_id += 1;
    }

    /// Number of messages with the streaming flag set; the invariant is
    /// that this never exceeds one.
    pub fn streaming_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_streaming).count()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
