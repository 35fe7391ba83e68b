//! Follow-up prompt suggestions.
//!
//! Derived from the patient's data rather than a second model call; the
//! client fires the endpoint non-blocking after each exchange and on
//! the empty state.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;

/// Prompt suggestion for empty state / after an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSuggestion {
    pub text: String,
    pub category: String,
}

/// Default prompt suggestions shown before any data exists.
pub fn default_prompt_suggestions() -> Vec<PromptSuggestion> {
    vec![
        PromptSuggestion {
            text: "What do my most recent documents say?".into(),
            category: "documents".into(),
        },
        PromptSuggestion {
            text: "Summarize my latest lab results".into(),
            category: "labs".into(),
        },
        PromptSuggestion {
            text: "What should I ask my doctor at my next visit?".into(),
            category: "appointments".into(),
        },
        PromptSuggestion {
            text: "Explain my diagnosis in simple terms".into(),
            category: "general".into(),
        },
    ]
}

/// Suggestions contextual to the patient's data. Generic entries are
/// replaced when the record can support a more specific question.
/// Returns at most 4 suggestions.
pub fn contextual_suggestions(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<PromptSuggestion>, DatabaseError> {
    let mut suggestions = default_prompt_suggestions();

    let document_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM documents WHERE patient_id = ?1",
            rusqlite::params![patient_id.to_string()],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let has_conversations: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM conversations WHERE owner_id = ?1",
            rusqlite::params![patient_id.to_string()],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if document_count > 1 {
        suggestions[0] = PromptSuggestion {
            text: "What changed between my last two documents?".into(),
            category: "documents".into(),
        };
    }
    if has_conversations {
        suggestions[3] = PromptSuggestion {
            text: "Continue where we left off last time".into(),
            category: "general".into(),
        };
    }

    Ok(suggestions)
}
