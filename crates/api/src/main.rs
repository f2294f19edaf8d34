//! The cubicler binary: load settings, wire services, serve HTTP.

use std::collections::HashMap;

use cubicler_api::{app, build_state, shutdown_state, Settings};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env()?;
    let bind_addr = format!("{}:{}", settings.host, settings.port);

    // No in-process agent implementations are bundled; direct agents are
    // registered here by embedders.
    let state = build_state(settings, HashMap::new()).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "cubicler listening");

    let serve_state = state.clone();
    axum::serve(listener, app(serve_state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    shutdown_state(&state).await;
    Ok(())
}
