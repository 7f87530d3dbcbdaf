//! busram server - MCP gateway for bus stop and arrival lookups

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use busram_utils::{BusramError, LogConfig, Result};

mod config;
mod gateway;
mod mcp;
mod observability;
mod session;
mod tools;
mod transit;

use config::{AppConfig, ConfigLoader};
use gateway::Gateway;
use session::SessionRegistry;
use tools::ToolAdapter;
use transit::{HttpTransitClient, TransitApi};

/// Resolve on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("interrupt received"),
        _ = terminate => info!("terminate received"),
    }
}

/// Run the gateway until a shutdown signal or a fatal accept error
async fn run_server(config: AppConfig) -> Result<()> {
    info!("busram server starting");

    if config.upstream.service_key.is_empty() {
        warn!("no transit service key configured; tool calls will fail until BUSRAM_SERVICE_KEY is set");
    }

    let api: Arc<dyn TransitApi> = Arc::new(HttpTransitClient::new(&config.upstream));
    let tools = Arc::new(ToolAdapter::new(tools::transit_registry(api)));
    let gateway = Arc::new(Gateway::new(&config, Arc::new(SessionRegistry::new()), tools));

    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .map_err(|source| BusramError::Bind {
            addr: config.server.listen_addr.clone(),
            source,
        })?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let result = gateway::run(listener, Arc::clone(&gateway), shutdown).await;

    gateway.registry().shutdown();
    match &result {
        Ok(()) => info!("busram server stopped"),
        Err(e) => error!("busram server stopped: {}", e),
    }
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load_and_validate()?;

    busram_utils::init_logging_with_config(LogConfig::server(
        config.logging.output,
        &config.logging.filter,
    ))?;

    run_server(config).await
}
