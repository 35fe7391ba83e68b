use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Vitalia";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "vitalia=info,tower_http=warn".to_string()
}

/// Get the application data directory (~/Vitalia/ on all platforms)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Vitalia")
}

/// Default database path under the data directory.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("vitalia.db")
}

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Public base URL used to build guest share links and QR codes.
    pub public_base_url: String,
    /// AI completion gateway base URL (OpenAI-style /chat/completions).
    pub gateway_base_url: String,
    /// API key sent as bearer token to the gateway.
    pub gateway_api_key: String,
    /// Model name requested from the gateway.
    pub gateway_model: String,
    /// National identity registry base URL.
    pub identity_registry_url: String,
    /// Clinical registry base URL (profile enrichment, best-effort).
    pub clinical_registry_url: String,
    /// How many recent documents feed the assistant context.
    pub context_max_documents: usize,
    /// Per-document character budget for assistant context.
    pub context_chars_per_document: usize,
    /// How many prior turns feed the assistant context.
    pub context_max_turns: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".parse().expect("static addr"),
            db_path: default_db_path(),
            public_base_url: "http://localhost:8787".to_string(),
            gateway_base_url: "https://gateway.invalid/v1".to_string(),
            gateway_api_key: String::new(),
            gateway_model: "assistant-default".to_string(),
            identity_registry_url: "https://registry.invalid/identity".to_string(),
            clinical_registry_url: "https://registry.invalid/clinical".to_string(),
            context_max_documents: 5,
            context_chars_per_document: 4000,
            context_max_turns: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(addr) = std::env::var("VITALIA_BIND_ADDR") {
            if let Ok(parsed) = addr.parse() {
                cfg.bind_addr = parsed;
            } else {
                tracing::warn!(%addr, "Invalid VITALIA_BIND_ADDR, using default");
            }
        }
        if let Ok(path) = std::env::var("VITALIA_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("VITALIA_PUBLIC_BASE_URL") {
            cfg.public_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("VITALIA_GATEWAY_URL") {
            cfg.gateway_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(key) = std::env::var("VITALIA_GATEWAY_API_KEY") {
            cfg.gateway_api_key = key;
        }
        if let Ok(model) = std::env::var("VITALIA_GATEWAY_MODEL") {
            cfg.gateway_model = model;
        }
        if let Ok(url) = std::env::var("VITALIA_IDENTITY_REGISTRY_URL") {
            cfg.identity_registry_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("VITALIA_CLINICAL_REGISTRY_URL") {
            cfg.clinical_registry_url = url.trim_end_matches('/').to_string();
        }

        cfg
    }

    /// Guest share URL for a grant token.
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/guest/{token}", self.public_base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Vitalia"));
    }

    #[test]
    fn default_db_under_app_data() {
        let db = default_db_path();
        assert!(db.starts_with(app_data_dir()));
    }

    #[test]
    fn share_url_embeds_token() {
        let cfg = AppConfig::default();
        assert_eq!(
            cfg.share_url("abc123"),
            "http://localhost:8787/guest/abc123"
        );
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
