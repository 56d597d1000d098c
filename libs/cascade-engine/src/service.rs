use crate::backend::{build_backends, Backend};
use crate::executor::Executor;
use crate::harness::TestHarness;
use crate::orchestrator::FallbackOrchestrator;
use crate::telemetry::TelemetrySink;
use anyhow::Result;
use cascade_common::config::HarnessConfig;
use cascade_common::types::{ExecutionRequest, ExecutionResult, TestCase, TestRunResult};
use serde::Serialize;
use std::sync::Arc;

/// Capability listing for one backend in the chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendCapabilities {
    pub name: String,
    pub priority: usize,
    pub languages: Vec<String>,
}

/// Entry point wiring backends, executor and harness together
pub struct ExecutionService {
    executor: Arc<Executor>,
    harness: TestHarness,
}

impl ExecutionService {
    pub fn from_config(config: &HarnessConfig, telemetry: Arc<dyn TelemetrySink>) -> Result<Self> {
        config.validate()?;
        let backends = build_backends(config)?;
        Ok(Self::new(backends, telemetry, config.concurrency_limit))
    }

    pub fn new(
        backends: Vec<Arc<dyn Backend>>,
        telemetry: Arc<dyn TelemetrySink>,
        concurrency_limit: usize,
    ) -> Self {
        let executor = Arc::new(Executor::new(FallbackOrchestrator::new(backends), telemetry));
        let harness = TestHarness::new(executor.clone(), concurrency_limit);
        Self { executor, harness }
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.executor.execute(request).await
    }

    pub async fn run_tests(
        &self,
        language: &str,
        source_code: &str,
        tests: &[TestCase],
        caller_id: Option<&str>,
    ) -> TestRunResult {
        self.harness.run_tests(language, source_code, tests, caller_id).await
    }

    pub fn capabilities(&self) -> Vec<BackendCapabilities> {
        self.executor
            .orchestrator()
            .backends()
            .iter()
            .enumerate()
            .map(|(priority, backend)| BackendCapabilities {
                name: backend.name().to_string(),
                priority,
                languages: backend.languages(),
            })
            .collect()
    }

    /// Every language at least one backend accepts
    pub fn languages(&self) -> Vec<String> {
        self.executor.orchestrator().languages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopTelemetrySink;
    use crate::testing::ScriptedBackend;
    use cascade_common::types::TestRunStatus;

    #[tokio::test]
    async fn test_service_round_trip() {
        let service = ExecutionService::new(
            vec![
                Arc::new(ScriptedBackend::failing("judge0", &["python", "sql"])),
                Arc::new(ScriptedBackend::echo("piston", &["python"])),
            ],
            Arc::new(NoopTelemetrySink),
            3,
        );

        let result = service
            .execute(&ExecutionRequest::new("python", "print(input())").with_stdin("hi"))
            .await;
        assert_eq!(result.stdout.as_deref(), Some("hi"));

        let run = service
            .run_tests("python", "print(input())", &[TestCase::new("x", "x")], None)
            .await;
        assert_eq!(run.status, TestRunStatus::Passed);

        let caps = service.capabilities();
        assert_eq!(caps[0].name, "judge0");
        assert_eq!(caps[1].priority, 1);
        assert_eq!(service.languages(), vec!["python", "sql"]);
    }

    #[test]
    fn test_from_default_config() {
        let service = ExecutionService::from_config(&HarnessConfig::default(), Arc::new(NoopTelemetrySink)).unwrap();
        let names: Vec<String> = service.capabilities().into_iter().map(|c| c.name).collect();
        assert_eq!(names[0], "judge0-self-hosted");
        assert_eq!(names[1], "piston");
    }
}
