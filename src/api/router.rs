//! Portal API router.
//!
//! Two route groups: `/api/*` requires a bearer session (rate limit →
//! auth), `/guest/*` is unauthenticated and gated per-request by the
//! access grant itself (rate limit only). The shared `ApiContext` is
//! injected as the outermost Extension so middleware can reach it.

use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the portal router.
pub fn portal_router(ctx: ApiContext) -> Router {
    // Protected routes - bearer session required.
    let protected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/grants",
            post(endpoints::grants::create).get(endpoints::grants::list),
        )
        .route("/grants/:token", delete(endpoints::grants::revoke))
        .route("/chat/send", post(endpoints::chat::send))
        .route("/chat/conversations", get(endpoints::chat::conversations))
        .route(
            "/chat/conversations/:id",
            get(endpoints::chat::conversation),
        )
        .route(
            "/chat/conversations/:id/title",
            patch(endpoints::chat::rename),
        )
        .route("/chat/suggestions", get(endpoints::chat::suggestions))
        .route("/patients/resolve", post(endpoints::resolver::resolve))
        .route("/patients/select", post(endpoints::resolver::select))
        .route("/patients/context", get(endpoints::resolver::context))
        .route(
            "/patients/:id/registry-payload",
            get(endpoints::resolver::registry_payload),
        )
        .route(
            "/profile",
            get(endpoints::profiles::get).put(endpoints::profiles::update),
        )
        .route("/profile/accesses", get(endpoints::profiles::accesses))
        .route("/documents", get(endpoints::documents::list))
        .route("/clinics/:id/roster", post(endpoints::bulk::upload))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx.clone()));

    // Guest routes - the grant token is the credential.
    let guest = Router::new()
        .route("/guest/:token", get(endpoints::guest::view))
        .route("/guest/:token/notebook", get(endpoints::guest::notebook))
        .route(
            "/guest/:token/documents/:doc_id",
            get(endpoints::guest::download),
        )
        .route("/guest/chat", post(endpoints::guest::chat))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx));

    Router::new().nest("/api", protected).merge(guest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::hash_token;
    use crate::assistant::gateway::MockChatGateway;
    use crate::assistant::ChatGateway;
    use crate::config::AppConfig;
    use crate::db;
    use crate::grants;
    use crate::models::enums::{DocumentIdType, UserRole};
    use crate::models::{GrantPermissions, PatientProfile, User};
    use crate::registry::{IdentityRegistry, MockIdentityRegistry};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct TestHarness {
        _dir: tempfile::TempDir,
        ctx: ApiContext,
    }

    impl TestHarness {
        fn new() -> Self {
            Self::with_gateway(MockChatGateway::new().with_fragments(&["Hola ", "mundo"]))
        }

        fn with_gateway(gateway: MockChatGateway) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = AppConfig {
                db_path: dir.path().join("portal.db"),
                ..AppConfig::default()
            };
            // Run migrations once up front.
            db::open_database(&config.db_path).unwrap();

            let ctx = ApiContext::new(
                config,
                ChatGateway::Mock(gateway),
                IdentityRegistry::Mock(MockIdentityRegistry::new()),
                None,
            );
            Self { _dir: dir, ctx }
        }

        fn conn(&self) -> rusqlite::Connection {
            db::open_database(&self.ctx.config.db_path).unwrap()
        }

        fn router(&self) -> Router {
            portal_router(self.ctx.clone())
        }

        /// Seed a user with a live session; returns (user_id, bearer token).
        fn seed_session(&self, role: UserRole) -> (Uuid, String) {
            let conn = self.conn();
            let user = User {
                id: Uuid::new_v4(),
                role,
                email: None,
                full_name: "Test User".into(),
                created_at: Utc::now().naive_utc(),
            };
            db::insert_user(&conn, &user).unwrap();

            let token = format!("tok-{}", user.id);
            db::insert_session(
                &conn,
                &hash_token(&token),
                &user.id,
                role,
                Utc::now().naive_utc() + Duration::hours(1),
            )
            .unwrap();
            (user.id, token)
        }

        fn seed_profile(&self, user_id: Uuid, number: &str) {
            let conn = self.conn();
            db::insert_profile(
                &conn,
                &PatientProfile {
                    user_id,
                    document_type: DocumentIdType::Cc,
                    document_number: number.into(),
                    full_name: "Test User".into(),
                    age: None,
                    insurer_code: None,
                    phone: None,
                    registry_payload: None,
                    clinical_payload: None,
                    created_at: Utc::now().naive_utc(),
                },
            )
            .unwrap();
        }
    }

    fn get_request(path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn protected_routes_require_auth() {
        let harness = TestHarness::new();
        let response = harness
            .router()
            .oneshot(get_request("/api/profile", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stale_session_is_rejected() {
        let harness = TestHarness::new();
        let conn = harness.conn();
        let user = User {
            id: Uuid::new_v4(),
            role: UserRole::Patient,
            email: None,
            full_name: "Stale".into(),
            created_at: Utc::now().naive_utc(),
        };
        db::insert_user(&conn, &user).unwrap();
        db::insert_session(
            &conn,
            &hash_token("stale-token"),
            &user.id,
            UserRole::Patient,
            Utc::now().naive_utc() - Duration::minutes(1),
        )
        .unwrap();

        let response = harness
            .router()
            .oneshot(get_request("/api/profile", Some("stale-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
    }

    #[tokio::test]
    async fn guest_view_counts_every_load() {
        let harness = TestHarness::new();
        let (patient, _) = harness.seed_session(UserRole::Patient);
        harness.seed_profile(patient, "123456");

        let conn = harness.conn();
        let grant = grants::create_grant(
            &conn,
            patient,
            grants::GrantDuration::Minutes30,
            GrantPermissions::default(),
            Utc::now().naive_utc(),
        )
        .unwrap();

        let first = harness
            .router()
            .oneshot(get_request(&format!("/guest/{}", grant.token), None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let body = json_body(first).await;
        assert_eq!(body["access_count"], 1);
        assert_eq!(body["patient"]["document_number"], "123456");

        let second = harness
            .router()
            .oneshot(get_request(&format!("/guest/{}", grant.token), None))
            .await
            .unwrap();
        let body = json_body(second).await;
        assert_eq!(body["access_count"], 2, "counter grows on reload");
    }

    #[tokio::test]
    async fn guest_grant_failure_states() {
        let harness = TestHarness::new();
        let (patient, _) = harness.seed_session(UserRole::Patient);
        harness.seed_profile(patient, "123456");
        let conn = harness.conn();

        // Unknown token.
        let missing = harness
            .router()
            .oneshot(get_request("/guest/unknown-token", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        // Expired grant.
        let expired = grants::create_grant(
            &conn,
            patient,
            grants::GrantDuration::Minutes5,
            GrantPermissions::default(),
            Utc::now().naive_utc() - Duration::minutes(10),
        )
        .unwrap();
        let gone = harness
            .router()
            .oneshot(get_request(&format!("/guest/{}", expired.token), None))
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::GONE);

        // Download without the permission flag.
        let live = grants::create_grant(
            &conn,
            patient,
            grants::GrantDuration::Minutes30,
            GrantPermissions::default(),
            Utc::now().naive_utc(),
        )
        .unwrap();
        let forbidden = harness
            .router()
            .oneshot(get_request(
                &format!("/guest/{}/documents/{}", live.token, Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn grant_create_validates_duration() {
        let harness = TestHarness::new();
        let (patient, token) = harness.seed_session(UserRole::Patient);
        harness.seed_profile(patient, "123456");

        let bad = harness
            .router()
            .oneshot(post_json(
                "/api/grants",
                Some(&token),
                serde_json::json!({"duration_minutes": 45}),
            ))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let good = harness
            .router()
            .oneshot(post_json(
                "/api/grants",
                Some(&token),
                serde_json::json!({"duration_minutes": 15, "allow_chat": true}),
            ))
            .await
            .unwrap();
        assert_eq!(good.status(), StatusCode::OK);
        let body = json_body(good).await;
        assert!(body["share_url"]
            .as_str()
            .unwrap()
            .contains(body["token"].as_str().unwrap()));
        assert!(body["qr_svg"].as_str().unwrap().contains("<svg"));
        assert_eq!(body["permissions"]["allow_chat"], true);
    }

    #[tokio::test]
    async fn chat_send_streams_with_conversation_header() {
        let harness = TestHarness::new();
        let (patient, token) = harness.seed_session(UserRole::Patient);
        harness.seed_profile(patient, "123456");

        let response = harness
            .router()
            .oneshot(post_json(
                "/api/chat/send",
                Some(&token),
                serde_json::json!({"message": "¿Cómo están mis resultados?"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "text/event-stream"
        );
        assert!(response.headers().get("X-Conversation-Id").is_some());

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("data:"));
        assert!(text.contains("[DONE]"));
    }

    #[tokio::test]
    async fn chat_gateway_refusal_maps_to_status() {
        let harness = TestHarness::with_gateway(MockChatGateway::failing(402));
        let (patient, token) = harness.seed_session(UserRole::Patient);
        harness.seed_profile(patient, "123456");

        let response = harness
            .router()
            .oneshot(post_json(
                "/api/chat/send",
                Some(&token),
                serde_json::json!({"message": "hola"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        // Rollback left no rows behind.
        let conn = harness.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn guest_chat_requires_permission_and_matching_target() {
        let harness = TestHarness::new();
        let (patient, _) = harness.seed_session(UserRole::Patient);
        harness.seed_profile(patient, "123456");
        let conn = harness.conn();

        let no_chat = grants::create_grant(
            &conn,
            patient,
            grants::GrantDuration::Minutes30,
            GrantPermissions::default(),
            Utc::now().naive_utc(),
        )
        .unwrap();
        let refused = harness
            .router()
            .oneshot(post_json(
                "/guest/chat",
                None,
                serde_json::json!({
                    "guestToken": no_chat.token,
                    "targetUserId": patient,
                    "messages": [{"role": "user", "content": "hola"}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(refused.status(), StatusCode::FORBIDDEN);

        let chatty = grants::create_grant(
            &conn,
            patient,
            grants::GrantDuration::Minutes30,
            GrantPermissions {
                allow_chat: true,
                ..Default::default()
            },
            Utc::now().naive_utc(),
        )
        .unwrap();

        // Wrong target patient fails closed even with the permission.
        let mismatched = harness
            .router()
            .oneshot(post_json(
                "/guest/chat",
                None,
                serde_json::json!({
                    "guestToken": chatty.token,
                    "targetUserId": Uuid::new_v4(),
                    "messages": [{"role": "user", "content": "hola"}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(mismatched.status(), StatusCode::FORBIDDEN);

        let allowed = harness
            .router()
            .oneshot(post_json(
                "/guest/chat",
                None,
                serde_json::json!({
                    "guestToken": chatty.token,
                    "targetUserId": patient,
                    "messages": [{"role": "user", "content": "hola"}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed.headers().get("Content-Type").unwrap(),
            "text/event-stream"
        );
    }

    #[tokio::test]
    async fn resolve_gates_on_document_type() {
        let harness = TestHarness::new();
        let (_, token) = harness.seed_session(UserRole::Professional);

        let response = harness
            .router()
            .oneshot(post_json(
                "/api/patients/resolve",
                Some(&token),
                serde_json::json!({"documentNumber": "999999"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["requireDocumentType"], true);
        assert_eq!(body["level"], 3);
        assert!(body["patient"].is_null());

        // Unsupported type is a validation error, not a cascade outcome.
        let bad_type = harness
            .router()
            .oneshot(post_json(
                "/api/patients/resolve",
                Some(&token),
                serde_json::json!({"documentNumber": "999999", "documentType": "XX"}),
            ))
            .await
            .unwrap();
        assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn resolve_requires_professional_role() {
        let harness = TestHarness::new();
        let (_, token) = harness.seed_session(UserRole::Patient);

        let response = harness
            .router()
            .oneshot(post_json(
                "/api/patients/resolve",
                Some(&token),
                serde_json::json!({"documentNumber": "123"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn roster_upload_gated_to_clinic_admins() {
        let harness = TestHarness::new();
        let (_, patient_token) = harness.seed_session(UserRole::Patient);

        let response = harness
            .router()
            .oneshot(post_json(
                &format!("/api/clinics/{}/roster", Uuid::new_v4()),
                Some(&patient_token),
                serde_json::json!({"kind": "patients", "text": "CC 123"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let harness = TestHarness::new();
        let (_, token) = harness.seed_session(UserRole::Patient);
        let response = harness
            .router()
            .oneshot(get_request("/api/health", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
    }
}
