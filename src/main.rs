//! BETWATCH — Live-Match Betting Pool Watcher
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores every saved tenant from disk, and keeps the watchers
//! running until a shutdown signal arrives.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use betwatch::config::AppConfig;
use betwatch::providers::http::GameDataClient;
use betwatch::providers::log_sink::LogSink;
use betwatch::storage::Store;
use betwatch::watcher::registry::TenantRegistry;

const BANNER: &str = r#"
 ____  _____ _______        ___  _____ ____ _   _
| __ )| ____|_   _\ \      / / \|_   _/ ___| | | |
|  _ \|  _|   | |  \ \ /\ / / _ \ | || |   | |_| |
| |_) | |___  | |   \ V  V / ___ \| || |___|  _  |
|____/|_____| |_|    \_/\_/_/   \_\_| \____|_| |_|

  Live-Match Betting Pool Watcher
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        scan_interval_secs = cfg.watch.scan_interval_secs,
        resolve_interval_secs = cfg.watch.resolve_interval_secs,
        lock_threshold_secs = cfg.watch.lock_threshold_secs,
        data_dir = %cfg.storage.data_dir,
        "BETWATCH starting up"
    );

    // Missing credentials are fatal at startup, not at first request.
    let api_key = SecretString::from(AppConfig::resolve_env(&cfg.providers.api_key_env)?);
    let game_data = Arc::new(GameDataClient::new(cfg.providers.base_url.clone(), api_key)?);

    let registry = TenantRegistry::new(
        cfg.watch.clone(),
        Arc::clone(&game_data) as _,
        game_data as _,
        Arc::new(LogSink),
        Store::new(cfg.storage.data_dir.clone()),
    );

    // -- Restore tenants and run ------------------------------------------

    let restored = registry.restore_all().await?;
    info!(restored, "Watchers running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    registry.stop_all();
    info!("BETWATCH shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("betwatch=info"));

    let json_logging = std::env::var("BETWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
