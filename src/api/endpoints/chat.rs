//! Assistant chat endpoints (owner variant).

use axum::extract::{Path, State};
use axum::response::Response;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sse_response;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::assistant::{self, ConversationManager, ConversationSummary, PromptSuggestion};
use crate::db;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendRequest {
    pub message: String,
    pub conversation_id: Option<Uuid>,
}

/// `POST /api/chat/send` - send a message, stream the reply.
///
/// The response is the SSE delta stream; the conversation id (fresh on
/// a first message) travels in the `X-Conversation-Id` header so the
/// client can adopt it before the first token arrives.
pub async fn send(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(req): Json<ChatSendRequest>,
) -> Result<Response, ApiError> {
    let conn = ctx.open_db()?;
    let persist_conn = ctx.open_db()?;

    let exchange = assistant::send_message(
        &conn,
        persist_conn,
        ctx.gateway.clone(),
        ctx.budget(),
        user.user_id,
        req.conversation_id,
        &req.message,
        Utc::now().naive_utc(),
    )
    .await?;

    let conversation_id = exchange.conversation_id.to_string();
    Ok(sse_response(exchange.stream, Some(&conversation_id)))
}

#[derive(Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// `GET /api/chat/conversations` - the caller's conversation list.
pub async fn conversations(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let conversations =
        assistant::conversation::list_conversation_summaries(&conn, &user.user_id)?;
    Ok(Json(ConversationsResponse { conversations }))
}

#[derive(Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: &'static str,
    pub content: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ConversationDetailResponse {
    pub conversation_id: String,
    pub title: Option<String>,
    pub messages: Vec<ConversationMessage>,
}

/// `GET /api/chat/conversations/:id` - full message history.
pub async fn conversation(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let manager = ConversationManager::new(&conn);
    let conversation = manager.ensure_owned(conversation_id, user.user_id)?;
    let history = manager.history(conversation_id)?;

    Ok(Json(ConversationDetailResponse {
        conversation_id: conversation.id.to_string(),
        title: conversation.title,
        messages: history
            .into_iter()
            .map(|msg| ConversationMessage {
                id: msg.id.to_string(),
                role: msg.role.as_str(),
                content: msg.content,
                created_at: db::format_ts(msg.created_at),
            })
            .collect(),
    }))
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

#[derive(Serialize)]
pub struct RenameResponse {
    pub title: String,
}

/// `PATCH /api/chat/conversations/:id/title` - user-edited title.
pub async fn rename(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title must not be empty".into()));
    }
    if title.chars().count() > 120 {
        return Err(ApiError::BadRequest("Title too long".into()));
    }

    let conn = ctx.open_db()?;
    let manager = ConversationManager::new(&conn);
    manager.ensure_owned(conversation_id, user.user_id)?;
    db::update_conversation_title(&conn, &conversation_id, title)?;

    Ok(Json(RenameResponse {
        title: title.to_string(),
    }))
}

#[derive(Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<PromptSuggestion>,
}

/// `GET /api/chat/suggestions` - follow-up prompts for the caller's
/// data. The client fires this non-blocking after each exchange.
pub async fn suggestions(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let suggestions = assistant::suggestions::contextual_suggestions(&conn, &user.user_id)?;
    Ok(Json(SuggestionsResponse { suggestions }))
}
