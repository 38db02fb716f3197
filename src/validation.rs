use crate::error::{QueryBridgeError, Result};
use crate::models::ConversationTurn;

/// Longest accepted chat message, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Validation utilities for chat input
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a new chat message
    pub fn validate_chat_message(message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(QueryBridgeError::InvalidInput("Message cannot be empty".to_string()));
        }

        let chars = message.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(QueryBridgeError::InvalidInput(format!(
                "Message too long ({chars} characters, max {MAX_MESSAGE_CHARS})"
            )));
        }

        if message.contains('\0') {
            return Err(QueryBridgeError::InvalidInput("Message contains invalid characters".to_string()));
        }

        Ok(())
    }

    /// Validate prior conversation turns
    pub fn validate_history(history: &[ConversationTurn]) -> Result<()> {
        if history.iter().any(|turn| turn.content.contains('\0')) {
            return Err(QueryBridgeError::InvalidInput("History contains invalid characters".to_string()));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }
}
