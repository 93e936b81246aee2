mod ai;
mod analytics;
mod api;
mod cache;
mod config;
mod error;
mod market;
mod predictor;
mod runner;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::ai::GeminiClient;
use crate::analytics::{AnalyticsClient, IndexWriter};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::cache::PredictionCache;
use crate::config::{Config, CACHE_WARMUP_DELAY_SECS, CHANNEL_CAPACITY, WORKER_POOL_SIZE};
use crate::error::Result;
use crate::market::MarketState;
use crate::predictor::Predictor;
use crate::runner::JobRunner;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    if cfg.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set — every generation will fail and the fallback payload will be served");
    }

    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Analytics store (best-effort; unreachable is not fatal) ---
    let analytics = Arc::new(AnalyticsClient::new(&cfg)?);
    if analytics.ping().await {
        health.set_analytics_connected(true);
        info!("Analytics store connected at {}", cfg.elastic_endpoint);
    } else {
        warn!(
            "Analytics store unreachable at {} — documents will be dropped until it recovers",
            cfg.elastic_endpoint
        );
    }

    // --- Shared state ---
    let market = Arc::new(MarketState::new());
    let cache = Arc::new(PredictionCache::new());
    let ai = Arc::new(GeminiClient::new(&cfg)?);

    // --- Background tasks ---
    let (writer_tx, writer_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = IndexWriter::new(Arc::clone(&analytics), writer_rx, Arc::clone(&health));
    tokio::spawn(async move { writer.run().await });

    let jobs = JobRunner::spawn(WORKER_POOL_SIZE);

    let predictor = Predictor::new(
        Arc::clone(&cache),
        jobs,
        ai,
        Arc::clone(&analytics),
        Arc::clone(&market),
        writer_tx,
        Arc::clone(&health),
        Arc::clone(&latency),
    );

    // Cache warmup (one-shot, runs shortly after startup): kick off the
    // first generation so early dashboard requests are less likely to see
    // the fallback.
    let warm = predictor.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(CACHE_WARMUP_DELAY_SECS)).await;
        info!("Warming AI prediction cache");
        let _ = warm.get_current();
    });

    // --- HTTP API server ---
    let api_state = ApiState {
        market,
        predictor,
        cache,
        analytics,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
