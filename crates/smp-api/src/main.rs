//! # smp-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the SMP admin API.
//! Binds to configurable port (default 8080).

use smp_api::config::AppConfig;
use smp_api::state::AppState;
use smp_client::{ClientIdentity, SmlClient, SmlClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Build configuration from environment.
    let config = AppConfig::from_env();
    let port = config.port;
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, every caller is treated as administrator");
    }

    // The identity is shared by the SML and Directory clients.
    let identity = ClientIdentity::from_env().map_err(|e| {
        tracing::error!("Client identity is invalid: {e}");
        e
    })?;

    // SML client; absent means participant registration is unavailable.
    let sml_client = match SmlClientConfig::from_env() {
        Ok(sml_config) => match SmlClient::new(&sml_config) {
            Ok(client) => {
                tracing::info!(smp_id = %sml_config.smp_id, "SML client configured");
                Some(client)
            }
            Err(e) => {
                tracing::error!("Failed to create SML client: {e}");
                return Err(e.into());
            }
        },
        Err(e) => {
            tracing::warn!("SML client not configured: {e}. SML operations will fail.");
            None
        }
    };

    let state = AppState::open(config, sml_client, identity).map_err(|e| {
        tracing::error!("Opening the data directory failed: {e}");
        e
    })?;

    let app = smp_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("SMP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
