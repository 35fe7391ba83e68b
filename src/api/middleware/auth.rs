//! Bearer session authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, hashes it, and checks the
//! sessions table (written by the external auth provider). On success a
//! `UserContext` lands in request extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{hash_token, ApiContext, UserContext};
use crate::db;

pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let session = {
        let conn = ctx.open_db()?;
        db::get_session(&conn, &hash_token(&token))?
    };
    let session = session.ok_or(ApiError::Unauthorized)?;

    if Utc::now().naive_utc() >= session.expires_at {
        return Err(ApiError::SessionExpired);
    }

    req.extensions_mut().insert(UserContext {
        user_id: session.user_id,
        role: session.role,
    });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}
