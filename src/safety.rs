//! Read-only SQL gate
//!
//! A lexical check run on every candidate statement before it reaches the
//! database. It is deliberately broad: any forbidden keyword anywhere in the
//! text blocks the statement, even inside a literal or identifier. The
//! read-only connection in [`crate::db`] is the second, independent layer.

use crate::models::SafetyVerdict;

/// Substrings that block a statement wherever they appear (upper-cased match)
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE", "EXEC",
    "EXECUTE", "SP_", "XP_", "RESTORE", "BACKUP",
];

/// Accepted statement prefixes
pub const ALLOWED_PREFIXES: &[&str] = &["SELECT", "WITH"];

/// Lexical read-only gate
#[derive(Debug, Copy, Clone, Default)]
pub struct SqlSafetyGate;

impl SqlSafetyGate {
    /// Decide whether `statement` may be executed.
    #[must_use]
    pub fn check(statement: &str) -> SafetyVerdict {
        let upper = statement.to_uppercase();

        if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|k| upper.contains(*k)) {
            return SafetyVerdict::Blocked {
                reason: format!("statement contains the forbidden keyword {keyword}"),
            };
        }

        let trimmed = upper.trim_start();
        if !ALLOWED_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return SafetyVerdict::Blocked {
                reason: "only SELECT queries (optionally introduced by WITH) are allowed".to_string(),
            };
        }

        SafetyVerdict::Allowed
    }
}
