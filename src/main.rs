use anyhow::{anyhow, Context, Result};
use splitpot::api::{create_api_router, AppState};
use splitpot::config::AppConfig;
use splitpot::db;
use splitpot::metrics::{Metrics, RequestTracker, DEFAULT_SKIP_PATHS};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal backend error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration from environment")?;
    let bind_addr = config.bind_addr()?;

    let pool = db::connect(&config).await?;
    let metrics = Metrics::new().context("register request metrics")?;
    let tracker = RequestTracker::new(metrics.clone(), DEFAULT_SKIP_PATHS.iter().copied());

    let state = AppState {
        pool,
        metrics: metrics.clone(),
    };
    let api_router = create_api_router(state, tracker, &config.frontend_origins())
        .context("assemble API router")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!(address = %bind_addr, "splitpot backend online");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, api_router).await {
            warn!(error = %err, "API server error");
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!(
                    requests_total = metrics.total_requests(),
                    "splitpot heartbeat"
                );
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!(error = %err, "ctrl_c listener error");
                }
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn,sqlx=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
