//! Guest portal endpoints - unauthenticated, gated entirely by an
//! access grant's token and permission set.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{sse_response, DocumentView, PatientView};
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::assistant::{self, ChatTurn};
use crate::grants::{self, GuestAccess};
use crate::models::enums::GrantAction;
use crate::models::GrantPermissions;

#[derive(Serialize)]
pub struct GuestViewResponse {
    pub patient: PatientView,
    pub documents: Vec<DocumentView>,
    pub permissions: GrantPermissions,
    pub access_count: u32,
    pub expires_at: NaiveDateTime,
    pub remaining_seconds: i64,
}

fn view_response(access: GuestAccess, now: NaiveDateTime) -> GuestViewResponse {
    GuestViewResponse {
        patient: PatientView::from(&access.profile),
        documents: access.documents.iter().map(DocumentView::from).collect(),
        permissions: access.grant.permissions,
        access_count: access.grant.access_count,
        expires_at: access.grant.expires_at,
        remaining_seconds: grants::remaining_seconds(access.grant.expires_at, now),
    }
}

/// `GET /guest/:token` - resolve the share link into the patient's
/// record view. Every load consumes one access (the counter grows on
/// reloads too).
pub async fn view(
    State(ctx): State<ApiContext>,
    Path(token): Path<String>,
) -> Result<Json<GuestViewResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let now = Utc::now().naive_utc();
    let access = grants::validate_grant(&conn, &token, GrantAction::View, None, now)?;
    Ok(Json(view_response(access, now)))
}

/// `GET /guest/:token/notebook` - the note-taking view over the same
/// record, gated by `allow_notebook`.
pub async fn notebook(
    State(ctx): State<ApiContext>,
    Path(token): Path<String>,
) -> Result<Json<GuestViewResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let now = Utc::now().naive_utc();
    let access = grants::validate_grant(&conn, &token, GrantAction::Notebook, None, now)?;
    Ok(Json(view_response(access, now)))
}

#[derive(Serialize)]
pub struct GuestDownloadResponse {
    pub download_url: String,
}

/// `GET /guest/:token/documents/:doc_id` - resolve one document's
/// storage URL, gated by `allow_download`.
pub async fn download(
    State(ctx): State<ApiContext>,
    Path((token, doc_id)): Path<(String, Uuid)>,
) -> Result<Json<GuestDownloadResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let now = Utc::now().naive_utc();
    let access = grants::validate_grant(
        &conn,
        &token,
        GrantAction::DownloadDocument,
        Some(&doc_id.to_string()),
        now,
    )?;

    let document = crate::db::get_document(&conn, &doc_id)?
        // A foreign patient's document is indistinguishable from a
        // missing one.
        .filter(|doc| doc.patient_id == access.grant.patient_id)
        .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;

    let url = document
        .storage_url
        .ok_or_else(|| ApiError::NotFound("Document has no downloadable file".into()))?;

    Ok(Json(GuestDownloadResponse { download_url: url }))
}

#[derive(Deserialize)]
pub struct GuestTurn {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestChatRequest {
    pub guest_token: String,
    pub target_user_id: Uuid,
    pub messages: Vec<GuestTurn>,
}

/// `POST /guest/chat` - one ephemeral assistant exchange under the
/// grant's `allow_chat` permission. The transcript lives on the client;
/// nothing durable is written.
pub async fn chat(
    State(ctx): State<ApiContext>,
    Json(req): Json<GuestChatRequest>,
) -> Result<Response, ApiError> {
    let conn = ctx.open_db()?;
    let now = Utc::now().naive_utc();

    let access = grants::validate_grant(
        &conn,
        &req.guest_token,
        GrantAction::ChatMessage,
        req.messages.last().map(|m| m.content.as_str()),
        now,
    )?;

    // The token's patient and the requested target must agree.
    if access.grant.patient_id != req.target_user_id {
        return Err(ApiError::GrantForbidden);
    }

    let transcript = req
        .messages
        .into_iter()
        .map(|turn| match turn.role.as_str() {
            "user" => Ok(ChatTurn::user(turn.content)),
            "assistant" => Ok(ChatTurn::assistant(turn.content)),
            other => Err(ApiError::BadRequest(format!("Unknown role '{other}'"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let stream = assistant::send_guest_message(
        &conn,
        &ctx.gateway,
        ctx.budget(),
        access.grant.patient_id,
        transcript,
    )
    .await?;

    Ok(sse_response(stream, None))
}
