//! simple_bank - ledger HTTP service
//!
//! Usage: simple_bank [--env <name>] [--port <n>]
//!
//! Reads `config/<env>.yaml` (default `dev`). With `postgres_url` set (or
//! `DB_SOURCE` in the environment) the ledger lives in PostgreSQL, otherwise
//! in process memory.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use simple_bank::config::AppConfig;
use simple_bank::db::Database;
use simple_bank::gateway::{self, state::AppState};
use simple_bank::service::LedgerService;
use simple_bank::store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let lock_timeout = config.transfer.lock_timeout_ms.map(Duration::from_millis);

    match config.postgres_url.as_deref() {
        Some(url) => {
            let db = Database::connect(url, config.postgres_max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.ensure_schema()
                .await
                .context("Failed to create ledger schema")?;
            let store = PgLedgerStore::new(db);
            let store = match lock_timeout {
                Some(limit) => store.with_lock_timeout(limit),
                None => store,
            };
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("postgres_url not set, using the in-memory ledger (data is not durable)");
            let store = match lock_timeout {
                Some(limit) => MemoryLedgerStore::with_lock_timeout(limit),
                None => MemoryLedgerStore::new(),
            };
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.server.port = port;
    }
    let _log_guard = simple_bank::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        version = env!("GIT_HASH"),
        "Starting simple_bank"
    );

    let store = open_store(&app_config).await?;
    tracing::info!(backend = store.name(), "Ledger store ready");

    let ledger = Arc::new(LedgerService::from_config(store, &app_config));
    let state = Arc::new(AppState::new(ledger));

    gateway::run_server(&app_config.bind_address(), state).await?;
    Ok(())
}
