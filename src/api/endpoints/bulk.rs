//! Bulk roster upload endpoint (clinic administrators).

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::bulk::{self, BatchSummary, RosterKind};
use crate::db;
use crate::models::enums::UserRole;

#[derive(Deserialize)]
pub struct RosterUploadRequest {
    pub kind: RosterKind,
    pub text: String,
}

/// `POST /api/clinics/:id/roster` - process a roster upload row by row.
/// The caller must administer the clinic. One bad row never aborts the
/// batch; the response carries every row's outcome plus the summary.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(clinic_id): Path<Uuid>,
    Json(req): Json<RosterUploadRequest>,
) -> Result<Json<BatchSummary>, ApiError> {
    user.require_role(UserRole::ClinicAdmin)?;

    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Roster text must not be empty".into()));
    }

    let mut conn = ctx.open_db()?;
    let member_of = db::clinics_for_user(&conn, &user.user_id)?;
    if !member_of.contains(&clinic_id) {
        return Err(ApiError::Forbidden);
    }

    let summary = bulk::process_roster(
        &mut conn,
        clinic_id,
        req.kind,
        &req.text,
        bulk::INTER_ROW_DELAY,
        Utc::now().naive_utc(),
    )
    .await;

    tracing::info!(
        %clinic_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Roster upload processed"
    );
    Ok(Json(summary))
}
