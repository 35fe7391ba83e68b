//! Access-grant endpoints (owner side).

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::grants;
use crate::models::enums::UserRole;
use crate::models::GrantPermissions;

#[derive(Deserialize)]
pub struct CreateGrantRequest {
    pub duration_minutes: u32,
    #[serde(default)]
    pub allow_download: bool,
    #[serde(default)]
    pub allow_chat: bool,
    #[serde(default)]
    pub allow_notebook: bool,
}

/// `POST /api/grants` - create a share link.
///
/// Duration must be one of the enumerated values; anything else is a
/// validation error before any row is written.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(req): Json<CreateGrantRequest>,
) -> Result<Json<grants::SharePayload>, ApiError> {
    user.require_role(UserRole::Patient)?;

    let duration = grants::GrantDuration::from_minutes(req.duration_minutes).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Duration must be one of 5, 15, 30, 60, 180 minutes (got {})",
            req.duration_minutes
        ))
    })?;

    let permissions = GrantPermissions {
        allow_download: req.allow_download,
        allow_chat: req.allow_chat,
        allow_notebook: req.allow_notebook,
    };

    let conn = ctx.open_db()?;
    let grant = grants::create_grant(
        &conn,
        user.user_id,
        duration,
        permissions,
        Utc::now().naive_utc(),
    )?;

    let share_url = ctx.config.share_url(&grant.token);
    Ok(Json(grants::build_share_payload(&grant, share_url)))
}

#[derive(Serialize)]
pub struct GrantListResponse {
    pub grants: Vec<grants::GrantSummary>,
}

/// `GET /api/grants` - the owner's share links, live flag included.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<GrantListResponse>, ApiError> {
    user.require_role(UserRole::Patient)?;
    let conn = ctx.open_db()?;
    let grants = grants::list_grants_with_status(&conn, user.user_id, Utc::now().naive_utc())?;
    Ok(Json(GrantListResponse { grants }))
}

#[derive(Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

/// `DELETE /api/grants/:token` - revoke a share link. Irreversible.
pub async fn revoke(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(token): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    user.require_role(UserRole::Patient)?;
    let conn = ctx.open_db()?;
    grants::revoke_grant(&conn, user.user_id, &token)?;
    Ok(Json(RevokeResponse { revoked: true }))
}
