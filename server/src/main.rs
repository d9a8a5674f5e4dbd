//! Temperature Verifier Server
//!
//! Serves the verification page and runs the wallet/proof/contract pipeline
//! when its button is pressed.

use std::net::SocketAddr;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use temperature_verifier::{build_orchestrator, config::Config, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "temperature_verifier=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Temperature Verifier");
    tracing::info!("Chain: {} ({})", config.network.name, config.network.chain_id);
    tracing::info!("Verifier: {}", config.verifier_address);
    match &config.wallet_rpc_url {
        Some(url) => tracing::info!("Wallet: {}", url),
        None => tracing::warn!("WALLET_RPC_URL not set, runs will fail until a wallet is configured"),
    }
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        tracing::warn!("Proof service credentials missing: {}", missing.join(", "));
    }

    let orchestrator = build_orchestrator(&config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = handlers::AppState::new(config, orchestrator);

    // Build router
    let app = handlers::router(state)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
