/// Fallback Orchestrator - Ordered Failover Across Backends
///
/// **Core Responsibility:**
/// Produce an ExecutionResult for every request, whatever the backends do.
///
/// **Rules:**
/// - Backends are tried in configured priority order
/// - A backend without a capability entry for the language is skipped, never called
/// - Any adapter error is logged and the next backend is tried
/// - The first backend to return a result wins, even if the program failed
/// - When nothing succeeds the result is synthetic (status id 0)

use crate::backend::{Backend, BackendError};
use cascade_common::types::{ExecutionRequest, ExecutionResult};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub struct FallbackOrchestrator {
    backends: Vec<Arc<dyn Backend>>,
}

impl FallbackOrchestrator {
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// Union of languages any backend can run, sorted
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self
            .backends
            .iter()
            .flat_map(|b| b.languages())
            .collect();
        languages.sort();
        languages.dedup();
        languages
    }

    #[instrument(skip(self, request), fields(language = %request.language_key()))]
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let language = request.language_key();
        let mut outcomes: Vec<(String, String)> = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let name = backend.name();

            if !backend.supports(&language) {
                debug!(backend = %name, language = %language, "Language not in capability table, skipping");
                outcomes.push((name.to_string(), "unsupported language".to_string()));
                continue;
            }

            info!(backend = %name, language = %language, "Attempting execution");
            match backend
                .execute(&language, &request.source_code, request.stdin.as_deref())
                .await
            {
                Ok(result) => {
                    info!(
                        backend = %name,
                        status_id = result.status.id,
                        status = %result.status.description,
                        "Execution completed"
                    );
                    return result;
                }
                Err(e) => {
                    warn!(backend = %name, kind = e.kind(), error = %e, "Backend failed, trying next");
                    outcomes.push((name.to_string(), describe(&e)));
                }
            }
        }

        error!(
            language = %language,
            backends = self.backends.len(),
            "All execution backends exhausted"
        );
        exhausted(&language, &outcomes)
    }
}

fn describe(err: &BackendError) -> String {
    match err {
        BackendError::UnsupportedLanguage { .. } => err.kind().to_string(),
        BackendError::Transport { message, .. } | BackendError::Timeout { message, .. } => {
            format!("{}: {}", err.kind(), message)
        }
    }
}

fn exhausted(language: &str, outcomes: &[(String, String)]) -> ExecutionResult {
    let message = if outcomes.is_empty() {
        "All execution backends exhausted: no backends configured".to_string()
    } else {
        let detail: Vec<String> = outcomes
            .iter()
            .map(|(name, reason)| format!("{} ({})", name, reason))
            .collect();
        format!("All execution backends exhausted: {}", detail.join("; "))
    };

    ExecutionResult::synthetic_failure(
        message,
        format!(
            "Execution failed for {}. All backends unavailable or do not support this language.",
            language
        ),
    )
}
