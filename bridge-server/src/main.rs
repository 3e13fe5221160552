use bridge_server::cli::Cli;
use bridge_server::config::{ConfigStore, RuntimeConfig};
use bridge_server::logging::init_logger;
use bridge_server::server::{self, AppState, OriginPolicy};
use bridge_server::supervisor::Supervisor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.log_level());

    let config_store = ConfigStore::from_default_location();
    let saved = config_store.load();
    let runtime = RuntimeConfig::from_sources(
        &saved,
        cli.restaurant_id.clone(),
        cli.device_name.clone(),
        cli.firebase_project.clone(),
    );

    tracing::info!("Print bridge starting...");
    tracing::info!(config = %config_store.path().display(), "Config file location");

    let supervisor = Arc::new(Supervisor::new(config_store, runtime));
    supervisor.restart_cloud().await;

    let state = AppState {
        supervisor: supervisor.clone(),
        origins: Arc::new(OriginPolicy::new(cli.allowed_origins.clone())),
        port: cli.port,
    };

    // A bind failure at startup is the one fatal error in the process
    let bind_addr = format!("{}:{}", cli.host, cli.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %bind_addr, error = %e, "Failed to bind command server");
            std::process::exit(1);
        }
    };

    let local_ip = local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(addr = %bind_addr, %local_ip, "WebSocket command server listening");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
            shutdown.cancel();
        });
    }

    if let Err(e) = server::serve(listener, state, shutdown).await {
        tracing::error!(error = %e, "Command server error");
    }

    supervisor.shutdown().await;
}
