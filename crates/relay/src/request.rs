//! Request builder: system instruction plus bounded history.

use meshbridge_core::message::{ChatMessage, Turn};

/// Build the ordered message list for a chat request: the system prompt
/// first, then the session's turns as stored.
pub fn build_request(system_prompt: &str, history: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().map(ChatMessage::from));
    messages
}
