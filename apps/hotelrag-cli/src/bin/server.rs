use std::path::PathBuf;
use std::sync::Arc;

use hotelrag_cli::{router, AppState};
use hotelrag_core::config::Config;
use hotelrag_engine::build_engine;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let state = AppState::new();
    let loader = state.clone();
    tokio::spawn(async move {
        match build_engine(&settings, &base).await {
            Ok(engine) => {
                loader.publish(Arc::new(engine));
                tracing::info!("engine ready");
            }
            Err(e) => tracing::error!(error = %format!("{e:#}"), "engine failed to load; /chat stays unavailable"),
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
