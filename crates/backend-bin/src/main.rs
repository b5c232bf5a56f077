// crates/backend-bin/src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use camwatch_backend::{config::Settings, sweeper, ws_router, AppState};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::time::interval;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Presence-tracking WebSocket relay with camera alert intake
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path of the TOML config file
    #[arg(short, long, default_value = camwatch_backend::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    init_tracing(&settings);

    let addr = settings.bind_addr;
    let state = Arc::new(AppState::from_settings(settings).context("initialising application state")?);

    // Expired snapshot cleanup
    let _sweeper = sweeper::spawn_sweeper(state.images.clone(), &state.settings.sweeper);

    // Forget idle rate limiter windows
    let rate_limiter = state.rate_limiter.clone();
    let cleanup_period = state.settings.rate_limit.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = interval(cleanup_period);
        loop {
            interval.tick().await;
            rate_limiter.cleanup();
        }
    });

    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    Ok(())
}
