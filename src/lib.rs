pub mod api;
pub mod assistant;
pub mod bulk;
pub mod config;
pub mod context_cache;
pub mod db;
pub mod grants;
pub mod models;
pub mod registry;
pub mod resolver;

use tracing_subscriber::EnvFilter;

use crate::api::{start_server, ApiContext};
use crate::assistant::gateway::HttpChatGateway;
use crate::assistant::ChatGateway;
use crate::config::AppConfig;
use crate::registry::{ClinicalRegistry, HttpIdentityRegistry, IdentityRegistry};

/// Gateway requests may stream for minutes.
const GATEWAY_TIMEOUT_SECS: u64 = 300;
/// Registry lookups are interactive; fail fast.
const REGISTRY_TIMEOUT_SECS: u64 = 15;

/// Run the portal server until interrupted.
pub async fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let app_config = AppConfig::from_env();

    if let Some(parent) = app_config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Cannot create data directory: {e}"))?;
    }
    // Open once up front so migrations run before the first request.
    db::open_database(&app_config.db_path).map_err(|e| format!("Database init failed: {e}"))?;

    let gateway = ChatGateway::Http(HttpChatGateway::new(
        &app_config.gateway_base_url,
        &app_config.gateway_api_key,
        &app_config.gateway_model,
        GATEWAY_TIMEOUT_SECS,
    ));
    let registry = IdentityRegistry::Http(HttpIdentityRegistry::new(
        &app_config.identity_registry_url,
        REGISTRY_TIMEOUT_SECS,
    ));
    let clinical = ClinicalRegistry::new(&app_config.clinical_registry_url, REGISTRY_TIMEOUT_SECS);

    let ctx = ApiContext::new(app_config, gateway, registry, Some(clinical));
    let mut server = start_server(ctx).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Signal handler failed: {e}"))?;
    tracing::info!("Interrupt received, shutting down");
    server.shutdown();
    server.join().await;
    Ok(())
}
