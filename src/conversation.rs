//! Conversation assembly
//!
//! Builds the ordered message list sent to the model: one system instruction,
//! the replayed history, then the new question.

use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;
use crate::models::{ConversationTurn, Role};

/// Marker that opens every SQL-bearing model response
pub const SQL_MARKER: &str = "SQL:";

/// Serialize an assistant turn that carried SQL.
///
/// Used both when replaying history and when documenting the response format
/// to the model, so the two never drift apart.
#[must_use]
pub fn format_sql_turn(sql: &str, explanation: &str) -> String {
    format!("{SQL_MARKER} {sql}\n{explanation}")
}

/// Maps a business term onto the table that stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub term: String,
    pub table: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Fixed parts of the system instruction
#[derive(Debug, Clone, Default)]
pub struct SystemPreamble {
    pub intro: String,
    pub vocabulary: Vec<VocabularyEntry>,
    pub rules: String,
}

impl SystemPreamble {
    /// Full system instruction around a compiled schema.
    pub fn system_instruction(&self, schema_prompt: &str) -> String {
        let mut sections = vec![self.intro.trim().to_string(), schema_prompt.trim().to_string()];

        if !self.vocabulary.is_empty() {
            let mut vocab = String::from("BUSINESS VOCABULARY:");
            for entry in &self.vocabulary {
                vocab.push_str(&format!("\n- \"{}\" is stored in the table {}", entry.term, entry.table));
                if let Some(note) = &entry.note {
                    vocab.push_str(&format!(" ({note})"));
                }
            }
            sections.push(vocab);
        }

        if !self.rules.trim().is_empty() {
            sections.push(self.rules.trim().to_string());
        }

        sections.push(response_format_section());
        sections.retain(|s| !s.is_empty());
        sections.join("\n\n")
    }
}

fn response_format_section() -> String {
    let example = format_sql_turn(
        "SELECT c.Name, c.Email FROM Customers c ORDER BY c.Id DESC LIMIT 10",
        "Most recently added customers.",
    );
    format!(
        "SQL RESPONSE FORMAT (IMPORTANT):\n\
         {SQL_MARKER} [your SQL query on ONE line, WITHOUT markdown fences]\n\
         [If needed: ONE short plain-language sentence]\n\n\
         Example:\n{example}"
    )
}

/// Produces the model input for one chat request
#[derive(Debug, Clone, Default)]
pub struct ConversationAssembler {
    preamble: SystemPreamble,
}

impl ConversationAssembler {
    pub fn new(preamble: SystemPreamble) -> Self {
        Self { preamble }
    }

    /// System instruction, then history in order, then the new message.
    pub fn build(
        &self,
        schema_prompt: &str,
        history: &[ConversationTurn],
        new_message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.preamble.system_instruction(schema_prompt)));
        messages.extend(history.iter().map(replay_turn));
        messages.push(ChatMessage::user(new_message));
        messages
    }
}

fn replay_turn(turn: &ConversationTurn) -> ChatMessage {
    match (turn.role, &turn.sql) {
        (Role::User, _) => ChatMessage::user(turn.content.clone()),
        (Role::Assistant, Some(sql)) => ChatMessage::assistant(format_sql_turn(sql, &turn.content)),
        (Role::Assistant, None) => ChatMessage::assistant(turn.content.clone()),
    }
}
