mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use cascade_common::config::HarnessConfig;
use cascade_engine::telemetry::{RedisTelemetrySink, TelemetrySink, TracingTelemetrySink};
use cascade_engine::ExecutionService;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub service: Arc<ExecutionService>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Redis when REDIS_URL is set and reachable, otherwise log-only
async fn telemetry_sink() -> Arc<dyn TelemetrySink> {
    match std::env::var("REDIS_URL") {
        Ok(url) => match RedisTelemetrySink::connect(&url).await {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, failure reports will only be logged");
                Arc::new(TracingTelemetrySink)
            }
        },
        Err(_) => {
            info!("REDIS_URL not set, failure reports will only be logged");
            Arc::new(TracingTelemetrySink)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Cascade API booting...");

    let config = HarnessConfig::load_default().context("Failed to load backend configuration")?;
    info!(
        backends = ?config.backend_names(),
        concurrency_limit = config.concurrency_limit,
        "Configuration loaded"
    );

    let telemetry = telemetry_sink().await;
    let service = ExecutionService::from_config(&config, telemetry)?;

    let state = Arc::new(AppState {
        service: Arc::new(service),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
