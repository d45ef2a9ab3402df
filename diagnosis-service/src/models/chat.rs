//! Conversational assistant request/response types.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// One prior turn of the conversation as the chat client sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `user`, or `model`/`assistant` for assistant turns.
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000, message = "Message cannot be empty or longer than 4000 characters"))]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub language: Option<String>,
}

impl ChatRequest {
    /// True when the message carries no visible text.
    pub fn is_blank(&self) -> bool {
        self.message.trim().is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}
