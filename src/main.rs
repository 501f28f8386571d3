use std::sync::Arc;

use clap::Parser;

use tsdb_federation::MemoryDb;
use tsdb_federation::admin::TsdbAdminService;
use tsdb_federation::admin::http::AdminServer;
use tsdb_federation::config::{CliArgs, FederationConfig, load_config};
use tsdb_federation::engine::Db;
use tsdb_federation::logging::TracingSink;
use tsdb_federation::metrics::Metrics;

#[tokio::main]
async fn main() {
    // Initialize tracing with configurable log level via RUST_LOG environment variable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let args = CliArgs::parse();

    let config = if let Some(config_path) = &args.config {
        match load_config(config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        tracing::info!("No configuration file provided, using defaults");
        FederationConfig::default()
    };

    tracing::info!(
        "Opening local storage with options: {:?}",
        config.storage
    );
    let db = MemoryDb::open(&config.storage, Arc::new(TracingSink));

    if !config.global.external_labels.is_empty() {
        tracing::info!(
            "External labels: {:?}",
            config.global.external_labels.to_labels()
        );
    }
    for remote in &config.remote_read {
        tracing::info!(
            url = %remote.url,
            read_recent = remote.read_recent,
            "remote read endpoint configured, queriers are built by the embedding query engine"
        );
    }

    let metrics = Arc::new(Metrics::admin());
    let port = args.port.unwrap_or(config.admin.port);
    let server = AdminServer::new(Arc::new(TsdbAdminService::new(db.clone())), metrics, port);

    if let Err(e) = server.run().await {
        tracing::error!("Admin server failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = db.close() {
        tracing::error!("Failed to close local storage: {}", e);
    }
}
