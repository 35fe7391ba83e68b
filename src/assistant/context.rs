//! Bounded context assembly for the assistant.
//!
//! The gateway sees the patient's profile, the most recent documents
//! (each truncated to a fixed character budget), and the most recent
//! turns of the conversation - never the whole record.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{ChatMessage, PatientProfile};

/// How much of the record feeds one completion.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub max_documents: usize,
    pub chars_per_document: usize,
    pub max_turns: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_documents: 5,
            chars_per_document: 4000,
            max_turns: 10,
        }
    }
}

/// One document's contribution to the context.
#[derive(Debug, Clone)]
pub struct DocumentExcerpt {
    pub title: String,
    pub category: Option<String>,
    pub excerpt: String,
}

/// Everything the prompt builder needs for one exchange.
#[derive(Debug, Clone, Default)]
pub struct BoundedContext {
    pub profile: Option<PatientProfile>,
    pub documents: Vec<DocumentExcerpt>,
    pub history: Vec<ChatMessage>,
}

/// Truncate to at most `max_chars` characters on a UTF-8 boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Load the bounded context for one patient (and optionally the recent
/// turns of one conversation).
pub fn assemble(
    conn: &Connection,
    patient_id: &Uuid,
    conversation_id: Option<&Uuid>,
    budget: ContextBudget,
) -> Result<BoundedContext, DatabaseError> {
    let profile = db::get_profile(conn, patient_id)?;

    let documents = db::recent_documents(conn, patient_id, budget.max_documents)?
        .into_iter()
        .map(|doc| {
            let content = doc.content.as_deref().unwrap_or("");
            DocumentExcerpt {
                excerpt: truncate_chars(content, budget.chars_per_document).to_string(),
                title: doc.title,
                category: doc.category,
            }
        })
        .collect();

    let history = match conversation_id {
        Some(id) => db::recent_messages(conn, id, budget.max_turns)?,
        None => Vec::new(),
    };

    Ok(BoundedContext {
        profile,
        documents,
        history,
    })
}

impl BoundedContext {
    /// Render the profile + document sections as prompt text.
    pub fn context_text(&self) -> String {
        let mut text = String::new();

        if let Some(profile) = &self.profile {
            text.push_str("PATIENT:\n");
            text.push_str(&format!("Name: {}\n", profile.full_name));
            if let Some(age) = profile.age {
                text.push_str(&format!("Age: {age}\n"));
            }
            if let Some(insurer) = &profile.insurer_code {
                text.push_str(&format!("Insurer: {insurer}\n"));
            }
            text.push('\n');
        }

        if self.documents.is_empty() {
            text.push_str("DOCUMENTS: none on file.\n");
        } else {
            for doc in &self.documents {
                text.push_str(&format!("DOCUMENT: {}", doc.title));
                if let Some(category) = &doc.category {
                    text.push_str(&format!(" ({category})"));
                }
                text.push('\n');
                text.push_str(&doc.excerpt);
                text.push_str("\n\n");
            }
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{DocumentIdType, UserRole};
    use crate::models::{ClinicalDocument, User};
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn seed_patient(conn: &Connection) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            role: UserRole::Patient,
            email: None,
            full_name: "Ana Torres".into(),
            created_at: ts("2026-01-01 00:00:00"),
        };
        db::insert_user(conn, &user).unwrap();
        db::insert_profile(
            conn,
            &PatientProfile {
                user_id: user.id,
                document_type: DocumentIdType::Cc,
                document_number: "123".into(),
                full_name: "Ana Torres".into(),
                age: Some(41),
                insurer_code: Some("EPS-01".into()),
                phone: None,
                registry_payload: None,
                clinical_payload: None,
                created_at: ts("2026-01-01 00:00:00"),
            },
        )
        .unwrap();
        user.id
    }

    fn seed_doc(conn: &Connection, patient: Uuid, title: &str, content: &str, day: u32) {
        db::insert_document(
            conn,
            &ClinicalDocument {
                id: Uuid::new_v4(),
                patient_id: patient,
                title: title.into(),
                category: None,
                content: Some(content.into()),
                storage_url: None,
                uploaded_at: ts(&format!("2026-01-{day:02} 10:00:00")),
            },
        )
        .unwrap();
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters count as one each.
        assert_eq!(truncate_chars("señal", 3), "señ");
        assert_eq!(truncate_chars("日本語テキスト", 2), "日本");
    }

    #[test]
    fn document_budget_bounds_count_and_size() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn);
        for day in 1..=4 {
            seed_doc(&conn, patient, &format!("doc{day}"), &"x".repeat(100), day);
        }

        let context = assemble(
            &conn,
            &patient,
            None,
            ContextBudget {
                max_documents: 2,
                chars_per_document: 10,
                max_turns: 10,
            },
        )
        .unwrap();

        assert_eq!(context.documents.len(), 2);
        assert_eq!(context.documents[0].title, "doc4", "newest first");
        assert_eq!(context.documents[0].excerpt.len(), 10);
    }

    #[test]
    fn context_text_mentions_profile_and_documents() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn);
        seed_doc(&conn, patient, "Lab panel", "glucose 95 mg/dL", 3);

        let context = assemble(&conn, &patient, None, ContextBudget::default()).unwrap();
        let text = context.context_text();
        assert!(text.contains("Ana Torres"));
        assert!(text.contains("Lab panel"));
        assert!(text.contains("glucose 95"));
    }

    #[test]
    fn empty_record_is_explicit() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn);
        let context = assemble(&conn, &patient, None, ContextBudget::default()).unwrap();
        assert!(context.context_text().contains("none on file"));
    }
}
