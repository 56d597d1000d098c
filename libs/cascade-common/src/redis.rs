use crate::types::ExecutionResult;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, RedisResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Redis key semantics for the execution-failure log.
/// Writers (telemetry sink) and readers (CLI) share these so keys never drift.

pub const FAILURE_PREFIX: &str = "cascade:failures";

/// Entries kept per language list
pub const FAILURE_LOG_CAP: isize = 1000;

/// List TTL, refreshed on every write
pub const FAILURE_LOG_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Snapshot of an execution that produced stderr or compile output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub language: String,
    pub source_code: String,
    pub caller_id: Option<String>,
    pub result: ExecutionResult,
}

impl FailureReport {
    pub fn new(
        language: impl Into<String>,
        source_code: impl Into<String>,
        caller_id: Option<String>,
        result: ExecutionResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            language: language.into(),
            source_code: source_code.into(),
            caller_id,
            result,
        }
    }
}

/// Deterministic failure-log key for a language
pub fn failure_log_key(language: &str) -> String {
    format!("{}:{}", FAILURE_PREFIX, language.trim().to_lowercase())
}

/// Append a report to its language list, newest last, trimmed to the cap
pub async fn push_failure(
    conn: &mut redis::aio::ConnectionManager,
    report: &FailureReport,
) -> RedisResult<()> {
    let key = failure_log_key(&report.language);
    let payload = serde_json::to_string(report)
        .map_err(|e| redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string())))?;

    let _: () = conn.rpush(&key, payload).await?;
    let _: () = conn.ltrim(&key, -FAILURE_LOG_CAP, -1).await?;
    let _: () = redis::cmd("EXPIRE")
        .arg(&key)
        .arg(FAILURE_LOG_TTL_SECONDS)
        .query_async(conn)
        .await?;

    Ok(())
}

/// Read up to `limit` most recent reports for a language, newest first
pub async fn recent_failures(
    conn: &mut redis::aio::ConnectionManager,
    language: &str,
    limit: usize,
) -> RedisResult<Vec<FailureReport>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let key = failure_log_key(language);
    let start = -(limit.min(FAILURE_LOG_CAP as usize) as isize);
    let payloads: Vec<String> = conn.lrange(&key, start, -1).await?;

    let mut reports = payloads
        .iter()
        .map(|data| {
            serde_json::from_str::<FailureReport>(data)
                .map_err(|e| redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string())))
        })
        .collect::<RedisResult<Vec<_>>>()?;

    reports.reverse();
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    #[test]
    fn test_failure_log_key() {
        assert_eq!(failure_log_key("python"), "cascade:failures:python");
        assert_eq!(failure_log_key(" C "), "cascade:failures:c");
    }

    #[test]
    fn test_report_roundtrips_through_json() {
        let mut result = ExecutionResult::with_status(Status::from_id(6));
        result.compile_output = Some("main.c:1: error".to_string());
        let report = FailureReport::new("c", "int main(", Some("user-1".to_string()), result);

        let json = serde_json::to_string(&report).unwrap();
        let back: FailureReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_push_and_read_back() {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let mut conn = client.get_connection_manager().await.unwrap();

        let language = format!("test-{}", Uuid::new_v4());
        for i in 0..3 {
            let mut result = ExecutionResult::with_status(Status::from_id(11));
            result.stderr = Some(format!("boom {}", i));
            push_failure(&mut conn, &FailureReport::new(&language, "src", None, result))
                .await
                .unwrap();
        }

        let reports = recent_failures(&mut conn, &language, 2).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].result.stderr.as_deref(), Some("boom 2"));
        assert_eq!(reports[1].result.stderr.as_deref(), Some("boom 1"));

        let _: () = conn.del(failure_log_key(&language)).await.unwrap();
    }
}
