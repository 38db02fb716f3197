//! Model response interpretation
//!
//! A reply that starts with the `SQL:` marker carries a candidate statement,
//! either fenced in a markdown code block or on the marker line itself.
//! Anything else is a conversational answer.

use std::sync::LazyLock;

use regex::Regex;

use crate::conversation::SQL_MARKER;

/// What the model meant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelResponse {
    /// Plain-language answer, no database access needed
    Conversational { message: String },
    /// A statement to vet and run, with optional commentary
    SqlCandidate { statement: String, explanation: String },
}

#[allow(clippy::expect_used)]
static SQL_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n|(?i:sql)[ \t]+)?(.*?)```").expect("fence pattern is valid")
});

/// Interpret raw model output.
pub fn parse(raw: &str) -> ModelResponse {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix(SQL_MARKER) else {
        return ModelResponse::Conversational { message: text.to_string() };
    };

    let (first_line, remainder) = rest.split_once('\n').unwrap_or((rest, ""));

    // Backticks further down belong to the explanation unless the marker
    // line is empty or opens the fence itself.
    let marker_line = first_line.trim();
    if marker_line.is_empty() || marker_line.starts_with("```") {
        if let Some(caps) = SQL_FENCE.captures(rest) {
            let statement = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let after = caps.get(0).map_or(rest.len(), |m| m.end());
            let explanation = rest[after..].trim().to_string();
            return ModelResponse::SqlCandidate { statement, explanation };
        }
    }

    ModelResponse::SqlCandidate {
        statement: first_line.trim().to_string(),
        explanation: remainder.trim().to_string(),
    }
}
