//! isBIM site kernel
//!
//! HTTP server for locale routing, cache revalidation and the contact form.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use isbim_kernel::{AppState, Config, router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting isBIM site kernel");

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        port = config.port,
        locales = ?config.locales,
        default_locale = %config.default_locale,
        redis = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let state = AppState::new(&config).context("failed to initialize application state")?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    // Connect info feeds the contact form's per-client rate limit.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
