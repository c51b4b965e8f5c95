//! Server module for Courier
//!
//! Configuration loading, account seeding, and the axum runtime.

use crate::api;
use anyhow::{Context, Result};
use axum::{Extension, Router};
use chrono::Utc;
use config::{Config, Environment, File, FileFormat};
use courier_store::{Account, AccountState, Store};
use courier_whatsapp::{CloudClient, Engine, EventBus};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Embedded defaults; overridable via config files and COURIER_* env vars.
const DEFAULT_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 8080

[database]
path = "data/courier.db"
"#;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Bearer token for the operator status endpoint; unset locks it
    #[serde(default)]
    pub operator_token: Option<String>,
    /// Accounts to seed into the store at startup
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// One configured WhatsApp account
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSeed {
    pub name: String,
    pub phone_number_id: String,
    pub access_token: String,
    pub verify_token: String,
    #[serde(default)]
    pub waba_id: Option<String>,
}

/// Load configuration from embedded defaults, config files, and environment.
pub(crate) fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority);
        // COURIER_SERVER__PORT=9000 style
        .add_source(
            Environment::with_prefix("COURIER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to parse configuration")
}

/// Seed configured accounts into the store; already-registered
/// phone-number-ids are left untouched.
async fn seed_accounts(store: &Store, seeds: &[AccountSeed]) -> Result<()> {
    for seed in seeds {
        if store
            .find_account_by_phone_number_id(&seed.phone_number_id)
            .await?
            .is_some()
        {
            continue;
        }
        let account = Account {
            id: Uuid::new_v4().to_string(),
            name: seed.name.clone(),
            phone_number_id: seed.phone_number_id.clone(),
            access_token: seed.access_token.clone(),
            verify_token: seed.verify_token.clone(),
            waba_id: seed.waba_id.clone(),
            state: AccountState::Disconnected,
            active: true,
            created_at: Utc::now(),
        };
        match store.insert_account(&account).await {
            Ok(()) => info!(name = %seed.name, "Registered WhatsApp account"),
            Err(courier_store::Error::Conflict(msg)) => {
                warn!(name = %seed.name, %msg, "Skipping conflicting account seed");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Build the application router.
pub(crate) fn build_router(
    store: Store,
    engine: Arc<Engine>,
    config: Arc<AppConfig>,
) -> Router {
    Router::new()
        .merge(api::webhooks::routes())
        .merge(api::health::routes())
        .layer(Extension(store))
        .layer(Extension(engine))
        .layer(Extension(config))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the server until shutdown.
pub(crate) async fn run(config: AppConfig) -> Result<()> {
    info!("Starting Courier v{}", env!("CARGO_PKG_VERSION"));

    let store = Store::from_path(std::path::Path::new(&config.database.path)).await?;
    seed_accounts(&store, &config.accounts).await?;

    let engine = Arc::new(Engine::new(
        store.clone(),
        Arc::new(CloudClient::new()),
        EventBus::default(),
    ));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let app = build_router(store, engine, Arc::new(config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");
    axum::serve(listener, app).await.context("Server error")
}
