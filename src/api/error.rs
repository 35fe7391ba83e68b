//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::assistant::{AssistantError, GatewayError};
use crate::db::DatabaseError;
use crate::grants::GrantError;
use crate::resolver::ResolverError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
///
/// Authorization failures stay generic (fail closed); the grant variants
/// are the deliberate exception - the guest page renders distinct states
/// for a missing, expired, and forbidden link.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Session expired")]
    SessionExpired,
    #[error("Access denied")]
    Forbidden,
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Payment or credits required")]
    PaymentRequired,
    #[error("Share link not found")]
    GrantNotFound,
    #[error("Share link expired")]
    GrantExpired,
    #[error("Share link does not permit this action")]
    GrantForbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "SESSION_EXPIRED",
                "Session expired, sign in again".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have access to this resource".to_string(),
            ),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Rate limit exceeded. Retry after {retry_after}s"),
            ),
            ApiError::PaymentRequired => (
                StatusCode::PAYMENT_REQUIRED,
                "PAYMENT_REQUIRED",
                "The assistant is unavailable until credits are restored".to_string(),
            ),
            ApiError::GrantNotFound => (
                StatusCode::NOT_FOUND,
                "GRANT_NOT_FOUND",
                "This share link does not exist or was revoked".to_string(),
            ),
            ApiError::GrantExpired => (
                StatusCode::GONE,
                "GRANT_EXPIRED",
                "This share link has expired".to_string(),
            ),
            ApiError::GrantForbidden => (
                StatusCode::FORBIDDEN,
                "GRANT_FORBIDDEN",
                "This share link does not permit that action".to_string(),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<GrantError> for ApiError {
    fn from(err: GrantError) -> Self {
        match err {
            GrantError::NotFound => ApiError::GrantNotFound,
            GrantError::Expired => ApiError::GrantExpired,
            GrantError::Forbidden(_) => ApiError::GrantForbidden,
            GrantError::ProfileMissing => ApiError::Internal("grant without profile".into()),
            GrantError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ResolverError> for ApiError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::EmptyDocumentNumber => {
                ApiError::BadRequest("Document number must not be empty".into())
            }
            ResolverError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unauthorized => ApiError::Unauthorized,
            GatewayError::PaymentRequired => ApiError::PaymentRequired,
            GatewayError::RateLimited => ApiError::RateLimited { retry_after: 30 },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::EmptyMessage => {
                ApiError::BadRequest("Message must not be empty".into())
            }
            AssistantError::MessageTooLong(chars) => {
                ApiError::BadRequest(format!("Message too long ({chars} chars)"))
            }
            AssistantError::ConversationNotFound(id) => {
                ApiError::NotFound(format!("Conversation {id} not found"))
            }
            AssistantError::Gateway(e) => e.into(),
            AssistantError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn rate_limited_returns_429_with_retry_after() {
        let response = ApiError::RateLimited { retry_after: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "60");
    }

    #[tokio::test]
    async fn grant_states_are_distinguished() {
        assert_eq!(
            ApiError::GrantNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::GrantExpired.into_response().status(),
            StatusCode::GONE
        );
        assert_eq!(
            ApiError::GrantForbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("sqlite exploded".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn gateway_statuses_map_to_user_facing_errors() {
        let unauthorized: ApiError = GatewayError::Unauthorized.into();
        assert_eq!(
            unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        let payment: ApiError = GatewayError::PaymentRequired.into();
        assert_eq!(
            payment.into_response().status(),
            StatusCode::PAYMENT_REQUIRED
        );
        let limited: ApiError = GatewayError::RateLimited.into();
        assert_eq!(
            limited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn grant_error_conversion() {
        let err: ApiError = GrantError::Expired.into();
        assert_eq!(err.into_response().status(), StatusCode::GONE);
        let err: ApiError = GrantError::Forbidden("chat_message").into();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
