//! Assistant chat sessions.
//!
//! Two variants share one wire contract. The authenticated owner
//! variant persists conversations: the user message is written before
//! the gateway call, the gateway's SSE stream is forked so the caller
//! sees tokens as they arrive while an internal reader reassembles the
//! full text and writes it as one durable row at end-of-stream. The
//! guest variant is ephemeral: the transcript lives on the client and
//! nothing durable is written.

pub mod context;
pub mod conversation;
pub mod gateway;
pub mod progress;
pub mod prompt;
pub mod sse;
pub mod stream;
pub mod suggestions;

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};

pub use context::{assemble, BoundedContext, ContextBudget};
pub use conversation::{ConversationManager, ConversationSummary, DEFAULT_TITLE};
pub use gateway::{ChatGateway, ChatTurn, CompletionRequest, DeltaByteStream, GatewayError};
pub use progress::{ProgressEvent, ProgressIndicator, ProgressStage};
pub use sse::{DeltaAccumulator, SseEvent};
pub use suggestions::PromptSuggestion;

/// Upper bound on one user message, counted in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("Message too long ({0} chars)")]
    MessageTooLong(usize),
    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A live exchange: the conversation it belongs to and the client's
/// copy of the token stream.
pub struct ChatExchange {
    pub conversation_id: Uuid,
    pub stream: DeltaByteStream,
}

/// Send one owner message and open the response stream.
///
/// The user message is durably written before the gateway call (the
/// ordering guarantee for the conversation); if the gateway refuses
/// before a stream opens, that write is rolled back so a failed send
/// leaves no rows. `persist_conn` is a second connection that the
/// internal stream consumer carries into its background task - the
/// caller's view of the stream and the durable write are independent.
pub async fn send_message(
    conn: &Connection,
    persist_conn: Connection,
    gateway: Arc<ChatGateway>,
    budget: ContextBudget,
    owner_id: Uuid,
    conversation_id: Option<Uuid>,
    text: &str,
    now: NaiveDateTime,
) -> Result<ChatExchange, AssistantError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AssistantError::EmptyMessage);
    }
    let chars = text.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(AssistantError::MessageTooLong(chars));
    }

    // Context is loaded before the user message is written, so the new
    // question appears exactly once in the request (appended last).
    let manager = ConversationManager::new(conn);
    let (conversation_id, bounded) = match conversation_id {
        Some(id) => {
            let id = manager.ensure_owned(id, owner_id)?.id;
            let bounded = context::assemble(conn, &owner_id, Some(&id), budget)?;
            (id, bounded)
        }
        // Lazy creation on first message; there is no history yet.
        None => {
            let bounded = context::assemble(conn, &owner_id, None, budget)?;
            (manager.start(owner_id, None, now)?, bounded)
        }
    };
    let first_exchange = db::count_messages(conn, &conversation_id)? == 0;
    let request = prompt::build_request(&bounded, text);

    let user_msg = manager.add_user_message(conversation_id, text, now)?;

    let upstream = match gateway.stream_chat(&request).await {
        Ok(stream) => stream,
        Err(e) => {
            // Roll back so the durable transcript matches the client's.
            manager.rollback_message(&user_msg.id, &conversation_id)?;
            return Err(e.into());
        }
    };

    let (client_rx, store_rx) = stream::tee(upstream);

    let first_message = text.to_string();
    tokio::spawn(async move {
        persist_exchange(
            persist_conn,
            gateway,
            conversation_id,
            store_rx,
            first_exchange,
            first_message,
        )
        .await;
    });

    Ok(ChatExchange {
        conversation_id,
        stream: Box::pin(stream::receiver_stream(client_rx)),
    })
}

/// Internal stream consumer: reassemble, persist, then (on a first
/// exchange) derive the title. Runs detached with its own error
/// boundary - nothing here surfaces to or blocks the sender.
async fn persist_exchange(
    conn: Connection,
    gateway: Arc<ChatGateway>,
    conversation_id: Uuid,
    mut store_rx: tokio::sync::mpsc::UnboundedReceiver<stream::StreamItem>,
    first_exchange: bool,
    first_message: String,
) {
    let mut acc = DeltaAccumulator::new();
    while let Some(item) = store_rx.recv().await {
        match item {
            Ok(chunk) => acc.push(&chunk),
            Err(e) => {
                // A truncated stream is not a completed assistant turn;
                // the partial text is discarded, prior turns stand.
                tracing::warn!(error = %e, %conversation_id, "Stream failed mid-transfer, discarding partial reply");
                return;
            }
        }
    }
    acc.finish();

    let full_text = acc.into_text();
    if full_text.is_empty() {
        tracing::warn!(%conversation_id, "Stream ended with no content, nothing persisted");
        return;
    }

    {
        let manager = ConversationManager::new(&conn);
        let now = Utc::now().naive_utc();
        if let Err(e) = manager.add_assistant_message(conversation_id, &full_text, now) {
            tracing::error!(error = %e, %conversation_id, "Failed to persist assistant message");
            return;
        }
    }

    if first_exchange {
        let title = derive_title(&gateway, &first_message).await;
        if let Err(e) = db::update_conversation_title(&conn, &conversation_id, &title) {
            tracing::warn!(error = %e, %conversation_id, "Failed to store conversation title");
        }
    }
}

/// Title for a first exchange: ask the gateway, fall back to local
/// truncation, fall back to the constant placeholder. Never fails.
async fn derive_title(gateway: &ChatGateway, first_message: &str) -> String {
    let (system, prompt) = prompt::title_prompt(first_message);
    match gateway.complete(system, &prompt).await {
        Ok(title) => {
            let title = title.trim().trim_matches('"').to_string();
            if title.is_empty() {
                conversation::local_title(first_message)
            } else {
                title
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "Title derivation failed, using local fallback");
            conversation::local_title(first_message)
        }
    }
}

/// Send one guest message. Permission (`allow_chat`) is re-derived by
/// the caller via the grant validation path; here the transcript comes
/// in from the request and nothing is persisted.
pub async fn send_guest_message(
    conn: &Connection,
    gateway: &ChatGateway,
    budget: ContextBudget,
    patient_id: Uuid,
    transcript: Vec<ChatTurn>,
) -> Result<DeltaByteStream, AssistantError> {
    let last_is_user = transcript
        .last()
        .map(|turn| turn.role == "user" && !turn.content.trim().is_empty())
        .unwrap_or(false);
    if !last_is_user {
        return Err(AssistantError::EmptyMessage);
    }

    // Bound the client-held transcript the same way stored history is.
    let skip = transcript.len().saturating_sub(budget.max_turns.max(1));
    let bounded: Vec<ChatTurn> = transcript.into_iter().skip(skip).collect();

    let context = context::assemble(conn, &patient_id, None, budget)?;
    let request = prompt::build_guest_request(&context, bounded);

    let upstream = gateway.stream_chat(&request).await?;
    Ok(upstream)
}
