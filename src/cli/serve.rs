use std::path::PathBuf;

use crate::api::{self, AppState};
use crate::app::App;
use crate::cli::commands::ServeArgs;
use crate::config::parse_config;
use crate::errors::GuardError;
use tracing::info;

pub async fn handle_serve(args: ServeArgs) -> Result<(), GuardError> {
    let mut config = parse_config(&PathBuf::from(&args.config)).await?;
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    let addr = format!("{}:{}", config.api.host, config.api.port);

    let app = App::build(config)?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let router = api::build_router(AppState::from_app(&app));

    app.orchestrator.start().await;
    info!("Listening on {}", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GuardError::Internal(format!("Server error: {}", e)));

    info!("Waiting for in-flight agent runs");
    app.orchestrator.shutdown().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
