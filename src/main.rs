//! ICRC Vault Daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start against a ledger gateway
//! icrc-vault --vault-principal ryjl3-tyaaa-aaaaa-aaaba-cai --deployer aaaaa-aa
//!
//! # Start with custom config
//! icrc-vault --config /path/to/config.toml
//!
//! # JSON logs
//! icrc-vault --log-format json
//! ```
//!
//! ## HTTP API
//!
//! - `GET  /health` - Health check
//! - `GET  /status` - Vault state, balances, recent transactions
//! - `POST /update_transaction_history` - Sync from the ledger
//! - `POST /transfer` - Send from the vault (admin)

use clap::Parser;
use icrc_vault::logging::{init_tracing, LogFormat};
use icrc_vault::{
    api, spawn_sync_task, Config, HttpLedgerClient, LedgerClient, MockLedger, Store, Vault,
    VaultSettings,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "icrc-vault")]
#[command(about = "Custodial vault that mirrors an ICRC-1 ledger")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(long, env = "VAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long)]
    http_port: Option<u16>,

    /// Deploying identity, admin on first start unless `init.admin_principal`
    /// is set; one of the two is required for a new store
    #[arg(long, env = "VAULT_DEPLOYER")]
    deployer: Option<String>,

    /// Ledger-visible principal of the vault account
    #[arg(long, env = "VAULT_PRINCIPAL")]
    vault_principal: Option<String>,

    /// Ledger gateway URL
    #[arg(long, env = "VAULT_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.data_dir {
        config.vault.data_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.vault.http_port = port;
    }
    if let Some(principal) = args.vault_principal {
        config.vault.vault_principal = Some(principal);
    }
    if let Some(url) = args.gateway_url {
        config.ledger.gateway_url = url;
    }
    config.validate()?;

    info!(
        data_dir = %config.vault.data_dir.display(),
        http_port = config.vault.http_port,
        mock_ledger = config.ledger.mock,
        "Starting icrc-vault"
    );

    tokio::fs::create_dir_all(&config.vault.data_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let vault_principal = config
        .vault
        .vault_principal
        .clone()
        .ok_or_else(|| anyhow::anyhow!("vault_principal is not configured"))?;

    let ledger: Arc<dyn LedgerClient> = if config.ledger.mock {
        info!("Using in-memory mock ledger");
        Arc::new(MockLedger::new(vault_principal.clone()))
    } else {
        Arc::new(HttpLedgerClient::new(
            &config.ledger.gateway_url,
            Duration::from_secs(config.ledger.request_timeout_secs),
        )?)
    };

    let store = Store::open(config.store_path())?;
    let deployer = args
        .deployer
        .unwrap_or_else(|| icrc_vault::principal::ANONYMOUS.to_string());
    let vault = Arc::new(Vault::open(
        store.clone(),
        ledger,
        VaultSettings {
            vault_principal,
            status_tx_limit: config.vault.status_tx_limit,
        },
        &config.init,
        &deployer,
    )?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let sync_handle = if config.sync.interval_secs > 0 {
        Some(spawn_sync_task(
            Arc::clone(&vault),
            Duration::from_secs(config.sync.interval_secs),
            shutdown_tx.subscribe(),
        ))
    } else {
        info!("Periodic sync disabled");
        None
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", config.vault.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API available at http://{}", addr);
    info!("Press Ctrl+C to stop.");

    let router = api::create_router(Arc::clone(&vault));
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %e, "HTTP server error");
    }

    // Signal the sync task to stop
    let _ = shutdown_tx.send(());
    if let Some(handle) = sync_handle {
        let _ = handle.await;
    }

    store.flush().await?;
    info!("Store flushed");

    Ok(())
}
