/// Single-Submission Executor
///
/// **Core Responsibility:**
/// Run one request through the fallback chain and report diagnostics.
///
/// **Guarantees:**
/// - Never fails: the orchestrator always yields a result
/// - Telemetry is spawned, never awaited, and its errors are dropped
/// - A hung sink costs at most `max_pending` tasks, each cut off at the
///   report deadline; reports beyond that are shed
/// - The returned value is exactly what the orchestrator produced

use crate::orchestrator::FallbackOrchestrator;
use crate::telemetry::{NoopTelemetrySink, TelemetrySink};
use cascade_common::redis::FailureReport;
use cascade_common::types::{ExecutionRequest, ExecutionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, Instrument};

/// Longest a single sink call may run before its report is dropped
pub const TELEMETRY_DEADLINE: Duration = Duration::from_secs(5);

/// Reports allowed in flight at once
pub const MAX_PENDING_REPORTS: usize = 64;

pub struct Executor {
    orchestrator: FallbackOrchestrator,
    telemetry: Arc<dyn TelemetrySink>,
    report_deadline: Duration,
    pending: Arc<Semaphore>,
    max_pending: usize,
}

impl Executor {
    pub fn new(orchestrator: FallbackOrchestrator, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            orchestrator,
            telemetry,
            report_deadline: TELEMETRY_DEADLINE,
            pending: Arc::new(Semaphore::new(MAX_PENDING_REPORTS)),
            max_pending: MAX_PENDING_REPORTS,
        }
    }

    pub fn with_telemetry_limits(mut self, deadline: Duration, max_pending: usize) -> Self {
        self.report_deadline = deadline;
        self.pending = Arc::new(Semaphore::new(max_pending));
        self.max_pending = max_pending;
        self
    }

    /// Telemetry tasks currently holding a slot
    pub fn pending_reports(&self) -> usize {
        self.max_pending - self.pending.available_permits()
    }

    /// Executor that reports nowhere
    pub fn without_telemetry(orchestrator: FallbackOrchestrator) -> Self {
        Self::new(orchestrator, Arc::new(NoopTelemetrySink))
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    #[instrument(skip(self, request), fields(language = %request.language_key()))]
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let result = self.orchestrator.execute(request).await;

        if result.has_diagnostics() {
            self.report(request, &result);
        }

        result
    }

    fn report(&self, request: &ExecutionRequest, result: &ExecutionResult) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime available, dropping failure report");
            return;
        };

        let Ok(permit) = self.pending.clone().try_acquire_owned() else {
            debug!(max_pending = self.max_pending, "Telemetry backlog full, dropping failure report");
            return;
        };

        let report = FailureReport::new(
            request.language_key(),
            request.source_code.clone(),
            request.caller_id.clone(),
            result.clone(),
        );
        let sink = self.telemetry.clone();
        let deadline = self.report_deadline;

        runtime.spawn(
            async move {
                let _permit = permit;
                match tokio::time::timeout(deadline, sink.log_execution_failure(&report)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(report_id = %report.id, error = %e, "Telemetry sink failed, report dropped");
                    }
                    Err(_) => {
                        debug!(
                            report_id = %report.id,
                            deadline_ms = deadline.as_millis() as u64,
                            "Telemetry sink timed out, report dropped"
                        );
                    }
                }
            }
            .in_current_span(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{accepted, ScriptedBackend};
    use async_trait::async_trait;
    use cascade_common::types::{status_id, Status};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Sink that records reports, optionally blocking or failing first
    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<FailureReport>>,
        gate: Option<Arc<Notify>>,
        fail: bool,
        seen: Notify,
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn log_execution_failure(&self, report: &FailureReport) -> anyhow::Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reports.lock().push(report.clone());
            self.seen.notify_one();
            if self.fail {
                anyhow::bail!("redis unavailable");
            }
            Ok(())
        }
    }

    fn runtime_error_backend() -> ScriptedBackend {
        ScriptedBackend::new("judge0", &["python"], |_, _| {
            let mut result = ExecutionResult::with_status(Status::from_id(status_id::RUNTIME_ERROR_NZEC));
            result.stderr = Some("ZeroDivisionError: division by zero".to_string());
            Ok(result)
        })
    }

    fn executor(backend: ScriptedBackend, sink: Arc<RecordingSink>) -> Executor {
        Executor::new(FallbackOrchestrator::new(vec![Arc::new(backend)]), sink)
    }

    #[tokio::test]
    async fn test_reports_diagnostics_with_caller() {
        let sink = Arc::new(RecordingSink::default());
        let executor = executor(runtime_error_backend(), sink.clone());
        let request = ExecutionRequest::new("Python", "print(1/0)").with_caller(Some("user-42".to_string()));

        let result = executor.execute(&request).await;
        assert_eq!(result.status.id, status_id::RUNTIME_ERROR_NZEC);

        tokio::time::timeout(Duration::from_secs(1), sink.seen.notified())
            .await
            .unwrap();
        let reports = sink.reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].language, "python");
        assert_eq!(reports[0].caller_id.as_deref(), Some("user-42"));
        assert_eq!(reports[0].result, result);
    }

    #[tokio::test]
    async fn test_clean_output_is_not_reported() {
        let sink = Arc::new(RecordingSink::default());
        let executor = executor(ScriptedBackend::echo("piston", &["python"]), sink.clone());

        let result = executor
            .execute(&ExecutionRequest::new("python", "print(input())").with_stdin("ok"))
            .await;
        assert_eq!(result, accepted("ok"));

        tokio::task::yield_now().await;
        assert!(sink.reports.lock().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_sink_does_not_delay_result() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let executor = executor(runtime_error_backend(), sink.clone());

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            executor.execute(&ExecutionRequest::new("python", "print(1/0)")),
        )
        .await
        .unwrap();
        assert!(result.stderr.is_some());
        assert!(sink.reports.lock().is_empty());

        gate.notify_one();
        tokio::time::timeout(Duration::from_secs(1), sink.seen.notified())
            .await
            .unwrap();
        assert_eq!(sink.reports.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink_is_swallowed() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let executor = executor(runtime_error_backend(), sink.clone());

        let first = executor.execute(&ExecutionRequest::new("python", "print(1/0)")).await;
        tokio::time::timeout(Duration::from_secs(1), sink.seen.notified())
            .await
            .unwrap();
        let second = executor.execute(&ExecutionRequest::new("python", "print(1/0)")).await;
        tokio::time::timeout(Duration::from_secs(1), sink.seen.notified())
            .await
            .unwrap();

        // The sink ran and errored both times; results are untouched
        assert_eq!(first, second);
        assert_eq!(sink.reports.lock().len(), 2);
        assert_eq!(sink.reports.lock()[0].result, first);
    }

    /// Sink whose calls never complete
    #[derive(Default)]
    struct HangingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for HangingSink {
        async fn log_execution_failure(&self, _report: &FailureReport) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hanging_sink_tasks_are_capped_and_expire() {
        let sink = Arc::new(HangingSink::default());
        let executor = Executor::new(
            FallbackOrchestrator::new(vec![Arc::new(runtime_error_backend())]),
            sink.clone(),
        )
        .with_telemetry_limits(Duration::from_millis(50), 4);

        for _ in 0..20 {
            let result = executor.execute(&ExecutionRequest::new("python", "print(1/0)")).await;
            assert!(result.stderr.is_some());
        }
        assert_eq!(executor.pending_reports(), 4);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(executor.pending_reports(), 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);

        // Slots freed by the deadline accept new reports
        executor.execute(&ExecutionRequest::new("python", "print(1/0)")).await;
        assert_eq!(executor.pending_reports(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_reported() {
        let sink = Arc::new(RecordingSink::default());
        let executor = executor(ScriptedBackend::failing("judge0", &["python"]), sink.clone());

        let result = executor.execute(&ExecutionRequest::new("python", "print(1)")).await;
        assert_eq!(result.status.id, status_id::UNKNOWN);

        tokio::time::timeout(Duration::from_secs(1), sink.seen.notified())
            .await
            .unwrap();
        assert_eq!(sink.reports.lock()[0].result.status.id, status_id::UNKNOWN);
    }

    #[test]
    fn test_without_runtime_drops_report() {
        let executor = Executor::without_telemetry(FallbackOrchestrator::new(Vec::new()));
        let request = ExecutionRequest::new("python", "print(1)");
        let result = ExecutionResult::synthetic_failure("exhausted", "no backends");
        executor.report(&request, &result);
    }
}
