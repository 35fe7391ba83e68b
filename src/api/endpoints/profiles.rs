//! Own-profile endpoints (patient side).

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::PatientView;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;
use crate::models::AccessAuditEntry;

/// `GET /api/profile` - the caller's own profile.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<PatientView>, ApiError> {
    let conn = ctx.open_db()?;
    let profile = db::get_profile(&conn, &user.user_id)?
        .ok_or_else(|| ApiError::NotFound("No profile on file".into()))?;
    Ok(Json(PatientView::from(&profile)))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub phone: String,
}

/// `PUT /api/profile` - phone update (the only owner-editable field).
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<PatientView>, ApiError> {
    let phone = req.phone.trim();
    if phone.is_empty()
        || !phone
            .chars()
            .all(|c| c.is_ascii_digit() || c == '+' || c == ' ' || c == '-')
    {
        return Err(ApiError::BadRequest("Invalid phone number".into()));
    }

    let conn = ctx.open_db()?;
    if db::get_profile(&conn, &user.user_id)?.is_none() {
        return Err(ApiError::NotFound("No profile on file".into()));
    }
    db::update_profile_phone(&conn, &user.user_id, phone)?;
    let profile = db::get_profile(&conn, &user.user_id)?
        .ok_or_else(|| ApiError::Internal("profile vanished".into()))?;
    Ok(Json(PatientView::from(&profile)))
}

#[derive(Serialize)]
pub struct AccessListResponse {
    pub accesses: Vec<AccessAuditEntry>,
}

/// `GET /api/profile/accesses` - "who accessed my data": only entries
/// flagged auditable (cross-clinic or external resolutions).
pub async fn accesses(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<AccessListResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let accesses = db::list_patient_accesses(&conn, &user.user_id)?;
    Ok(Json(AccessListResponse { accesses }))
}
