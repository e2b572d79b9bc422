use serde::{Deserialize, Serialize};

/// Body for `POST /api/chat`.
#[derive(Serialize, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub character_id: String,
}

/// Body for `POST /api/chat/image`.
#[derive(Serialize, Clone)]
pub struct ChatImageRequest {
    pub message: String,
    pub character_id: String,
    pub image_base64: String,
}

/// One entry from `GET /api/conversation`.
#[derive(Deserialize, Debug, Clone)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConversationResponse {
    #[serde(default)]
    pub conversation: Vec<ConversationMessage>,
}
