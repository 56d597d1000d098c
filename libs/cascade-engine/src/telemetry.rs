// Telemetry sinks for executions that produced diagnostics.
//
// Sinks are best effort. The executor never awaits them on the request path,
// so a slow or unavailable sink only loses reports.

use anyhow::{Context, Result};
use async_trait::async_trait;
use cascade_common::redis::{push_failure, FailureReport};
use redis::aio::ConnectionManager;
use tracing::{info, warn};

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn log_execution_failure(&self, report: &FailureReport) -> Result<()>;
}

/// Appends reports to the per-language failure log in Redis
pub struct RedisTelemetrySink {
    conn: ConnectionManager,
}

impl RedisTelemetrySink {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("Failed to connect to Redis")?;
        info!(redis_url = %redis_url, "Telemetry connected to Redis");
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl TelemetrySink for RedisTelemetrySink {
    async fn log_execution_failure(&self, report: &FailureReport) -> Result<()> {
        // ConnectionManager is a cheap handle onto one multiplexed connection
        let mut conn = self.conn.clone();
        push_failure(&mut conn, report)
            .await
            .context("Failed to push failure report")?;
        Ok(())
    }
}

/// Emits one warn line per report
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn log_execution_failure(&self, report: &FailureReport) -> Result<()> {
        let first_line = |field: &Option<String>| {
            field
                .as_deref()
                .and_then(|s| s.lines().next())
                .unwrap_or("")
                .to_string()
        };

        warn!(
            report_id = %report.id,
            language = %report.language,
            caller_id = report.caller_id.as_deref().unwrap_or("-"),
            status_id = report.result.status.id,
            stderr = %first_line(&report.result.stderr),
            compile_output = %first_line(&report.result.compile_output),
            "Execution produced diagnostics"
        );
        Ok(())
    }
}

pub struct NoopTelemetrySink;

#[async_trait]
impl TelemetrySink for NoopTelemetrySink {
    async fn log_execution_failure(&self, _report: &FailureReport) -> Result<()> {
        Ok(())
    }
}
