//! Shared types for the API layer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::assistant::{ChatGateway, ContextBudget};
use crate::config::AppConfig;
use crate::db;
use crate::models::enums::UserRole;
use crate::registry::{ClinicalRegistry, IdentityRegistry};

// ═══════════════════════════════════════════════════════════
// API context - shared state for the portal router
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes and middleware. Stateless between
/// requests apart from the rate limiter; every handler opens its own
/// database connection.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<ChatGateway>,
    pub registry: Arc<IdentityRegistry>,
    pub clinical_registry: Option<Arc<ClinicalRegistry>>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(
        config: AppConfig,
        gateway: ChatGateway,
        registry: IdentityRegistry,
        clinical_registry: Option<ClinicalRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            registry: Arc::new(registry),
            clinical_registry: clinical_registry.map(Arc::new),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
        }
    }

    /// Open a database connection for this request.
    pub fn open_db(&self) -> Result<Connection, ApiError> {
        db::open_database(&self.config.db_path)
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Context budget for assistant exchanges.
    pub fn budget(&self) -> ContextBudget {
        ContextBudget {
            max_documents: self.config.context_max_documents,
            chars_per_document: self.config.context_chars_per_document,
            max_turns: self.config.context_max_turns,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// User context - injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, injected into request extensions by the auth
/// middleware after the session row checks out.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl UserContext {
    /// Role gate. Fails closed with the generic permission error.
    pub fn require_role(&self, role: UserRole) -> Result<(), ApiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Hash a bearer token string using SHA-256 (hex). Sessions store only
/// the hash; the auth provider hands the raw token to the client.
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ═══════════════════════════════════════════════════════════
// Rate limiter
// ═══════════════════════════════════════════════════════════

/// Sliding-window requests per key per minute.
const MAX_PER_MINUTE: usize = 100;
const WINDOW: Duration = Duration::from_secs(60);

/// In-memory sliding-window rate limiter.
pub struct RateLimiter {
    hits: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            hits: HashMap::new(),
        }
    }

    /// Record a hit for `key`. `Err(retry_after_secs)` when over budget.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let window = self.hits.entry(key.to_string()).or_default();

        while let Some(front) = window.front() {
            if now.duration_since(*front) > WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= MAX_PER_MINUTE {
            let oldest = *window.front().expect("non-empty window");
            let retry_after = WINDOW
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        window.push_back(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_hex() {
        let a = hash_token("secret");
        let b = hash_token("secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash_token("other"), a);
    }

    #[test]
    fn rate_limiter_allows_under_budget() {
        let mut limiter = RateLimiter::new();
        for _ in 0..MAX_PER_MINUTE {
            assert!(limiter.check("key").is_ok());
        }
        assert!(limiter.check("key").is_err());
    }

    #[test]
    fn rate_limiter_keys_are_independent() {
        let mut limiter = RateLimiter::new();
        for _ in 0..MAX_PER_MINUTE {
            limiter.check("a").unwrap();
        }
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn role_gate_fails_closed() {
        let user = UserContext {
            user_id: Uuid::new_v4(),
            role: UserRole::Patient,
        };
        assert!(user.require_role(UserRole::Patient).is_ok());
        assert!(matches!(
            user.require_role(UserRole::Professional),
            Err(ApiError::Forbidden)
        ));
    }
}
