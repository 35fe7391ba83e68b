//! Conversation lifecycle and message persistence.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AssistantError;
use crate::db::{self, DatabaseError};
use crate::models::enums::MessageRole;
use crate::models::{ChatMessage, Conversation};

/// Placeholder title until one is derived (or when derivation fails).
pub const DEFAULT_TITLE: &str = "New conversation";

/// Manages conversation lifecycle and message persistence.
pub struct ConversationManager<'a> {
    conn: &'a Connection,
}

impl<'a> ConversationManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Start a new conversation. Returns the conversation ID.
    pub fn start(
        &self,
        owner_id: Uuid,
        title: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Uuid, AssistantError> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            owner_id,
            title: title.map(|t| t.to_string()),
            started_at: now,
            updated_at: now,
        };
        db::insert_conversation(self.conn, &conversation)?;
        Ok(conversation.id)
    }

    /// Load a conversation and verify ownership. Fails closed: a foreign
    /// conversation id is indistinguishable from a missing one.
    pub fn ensure_owned(
        &self,
        conversation_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Conversation, AssistantError> {
        let conversation = db::get_conversation(self.conn, &conversation_id)?
            .ok_or(AssistantError::ConversationNotFound(conversation_id))?;
        if conversation.owner_id != owner_id {
            return Err(AssistantError::ConversationNotFound(conversation_id));
        }
        Ok(conversation)
    }

    /// Append the user's message.
    pub fn add_user_message(
        &self,
        conversation_id: Uuid,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<ChatMessage, AssistantError> {
        self.add_message(conversation_id, MessageRole::User, text, now)
    }

    /// Append the assembled assistant message.
    pub fn add_assistant_message(
        &self,
        conversation_id: Uuid,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<ChatMessage, AssistantError> {
        self.add_message(conversation_id, MessageRole::Assistant, text, now)
    }

    fn add_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<ChatMessage, AssistantError> {
        let msg = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: text.to_string(),
            created_at: now,
        };
        db::insert_message(self.conn, &msg)?;
        db::touch_conversation(self.conn, &conversation_id, now)?;
        Ok(msg)
    }

    /// Remove a just-written message again (rollback of a failed send).
    /// When that leaves a lazily-created conversation empty, the
    /// conversation goes too.
    pub fn rollback_message(
        &self,
        message_id: &Uuid,
        conversation_id: &Uuid,
    ) -> Result<(), AssistantError> {
        db::delete_message(self.conn, message_id)?;
        if db::count_messages(self.conn, conversation_id)? == 0 {
            db::delete_conversation(self.conn, conversation_id)?;
        }
        Ok(())
    }

    /// All messages, oldest first.
    pub fn history(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, AssistantError> {
        Ok(db::get_messages(self.conn, &conversation_id)?)
    }
}

// ═══════════════════════════════════════════
// Title generation
// ═══════════════════════════════════════════

/// Derive a conversation title locally from the first user message.
/// Truncates at 50 characters with "..." if longer, handling UTF-8
/// correctly. The gateway-derived title takes precedence when it works;
/// this is the fallback.
pub fn local_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let boundary = trimmed
        .char_indices()
        .take_while(|(i, _)| *i < 50)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(trimmed.len());

    if boundary >= trimmed.len() {
        trimmed.to_string()
    } else {
        format!("{}...", &trimmed[..boundary])
    }
}

// ═══════════════════════════════════════════
// Conversation list
// ═══════════════════════════════════════════

/// Conversation summary for the sidebar list. Count and preview are
/// derived via JOIN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_message_at: String,
    pub message_count: u32,
    pub last_message_preview: String,
}

/// List one owner's conversations with derived summary fields.
pub fn list_conversation_summaries(
    conn: &Connection,
    owner_id: &Uuid,
) -> Result<Vec<ConversationSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT
            c.id,
            COALESCE(c.title, 'New conversation') AS title,
            COALESCE(MAX(m.created_at), c.started_at) AS last_message_at,
            COUNT(m.id) AS message_count,
            COALESCE(
                (SELECT SUBSTR(m2.content, 1, 80) FROM messages m2
                 WHERE m2.conversation_id = c.id
                 ORDER BY m2.created_at DESC LIMIT 1),
                ''
            ) AS last_message_preview
         FROM conversations c
         LEFT JOIN messages m ON m.conversation_id = c.id
         WHERE c.owner_id = ?1
         GROUP BY c.id
         ORDER BY last_message_at DESC",
    )?;

    let rows = stmt.query_map(rusqlite::params![owner_id.to_string()], |row| {
        Ok(ConversationSummary {
            id: row.get(0)?,
            title: row.get(1)?,
            last_message_at: row.get(2)?,
            message_count: row.get::<_, i64>(3)? as u32,
            last_message_preview: row.get(4)?,
        })
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        summaries.push(row?);
    }
    Ok(summaries)
}
