//! Bridge gateway demo server.
//!
//! Serves the security middleware over in-memory stores. An optional demo
//! account can be seeded from the command line so the CLI has someone to
//! authenticate as.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use bridge_gateway::config::{apply_rate_limit_updates, load_config, ConfigWatcher, GatewayConfig};
use bridge_gateway::http::{GatewayServer, Stores};
use bridge_gateway::observability::{init_logging, init_metrics};
use bridge_gateway::store::{
    MemoryKeyValueStore, MemoryNonceStore, MemoryPublicKeyStore, MemoryUserStore,
    PublicKeyRecord, StoreSweeper, User,
};

#[derive(Parser)]
#[command(name = "bridge-gateway")]
#[command(about = "Authentication and admission control gateway", long_about = None)]
struct Args {
    /// TOML configuration file; watched for rate-limit changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed a demo account with this id.
    #[arg(long)]
    demo_user: Option<String>,

    #[arg(long, default_value = "password")]
    demo_secret: String,

    #[arg(long, default_value = "user")]
    demo_role: String,

    /// Register this hex public key for the demo account.
    #[arg(long)]
    demo_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("bridge-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_enabled = config.rate_limit.enabled,
        rate_limit_total = config.rate_limit.total,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut stores = Stores::in_memory();
    let nonces = MemoryNonceStore::new(stores.clock.clone());
    let kv = MemoryKeyValueStore::new();
    stores.nonces = Arc::new(nonces.clone());
    stores.kv = Arc::new(kv.clone());

    let sweeper = StoreSweeper::new(
        nonces,
        kv,
        Duration::from_secs(config.security.nonce_retention_secs),
        Duration::from_secs(config.security.purge_interval_secs),
    );
    tokio::spawn(sweeper.run());
    if let Some(id) = &args.demo_user {
        let users = MemoryUserStore::new();
        users.insert(User::new(id.clone()).with_role(args.demo_role.clone()), &args.demo_secret);
        stores.users = Arc::new(users);

        if let Some(key) = &args.demo_key {
            let keys = MemoryPublicKeyStore::new();
            keys.insert(PublicKeyRecord {
                key: key.clone(),
                user: id.clone(),
                label: Some("demo".to_string()),
            });
            stores.keys = Arc::new(keys);
        }
        tracing::info!(user = %id, role = %args.demo_role, "Seeded demo account");
    }

    let server = GatewayServer::new(config.clone(), stores);

    // Keep the watcher alive for the life of the server.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            tokio::spawn(apply_rate_limit_updates(updates, server.rate_limiter()));
            Some(watcher.run()?)
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
