use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use pageshot::cdp::CdpLauncher;
use pageshot::config::ServerConfig;
use pageshot::executable::resolve_executable;
use pageshot::server::{cors_layer, router, AppState};
use pageshot::{FontCache, Renderer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    info!(
        "Starting pageshot ({:?}) on {}",
        config.environment, config.bind
    );

    let executable = resolve_executable(config.environment, config.chrome_path.as_deref())
        .context("resolving browser executable")?;
    info!("Using browser at {}", executable.display());

    let fonts = FontCache::new(config.font_source());
    // Warm the cache so the first request does not pay for the read
    if let Err(e) = fonts.load().await {
        warn!("Font not preloaded, will retry on first capture: {}", e);
    }

    let renderer = Renderer::new(
        Arc::new(CdpLauncher),
        config.launch_settings(Some(executable)),
        config.render_policy(),
    );
    let state = Arc::new(AppState::new(renderer, fonts, config.diagnostics()));
    let app = router(state, cors_layer(&config.allowed_origins));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
