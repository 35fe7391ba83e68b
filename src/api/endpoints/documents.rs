//! Document list endpoint (owner side).

use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use super::DocumentView;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db;

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentView>,
}

/// `GET /api/documents` - the caller's documents, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let documents = db::list_documents(&conn, &user.user_id)?;
    Ok(Json(DocumentListResponse {
        documents: documents.iter().map(DocumentView::from).collect(),
    }))
}
