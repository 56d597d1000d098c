/// Backend Adapters - Uniform Contract over Remote Execution Services
///
/// **Core Responsibility:**
/// Run one program against one remote service and return its raw outcome.
///
/// **Critical Architectural Boundary:**
/// - Adapters know HOW to talk to a service (single round trip, submit/poll)
/// - Adapters do NOT know about fallback, grading, or telemetry
/// - Adapters never sandbox anything themselves
///
/// Protocol variants:
/// - `piston`: synchronous, one request per execution
/// - `judge0`: asynchronous, submit then poll (see `poll`)

pub mod judge0;
pub mod piston;
pub mod poll;

use async_trait::async_trait;
use cascade_common::config::{BackendConfig, HarnessConfig};
use cascade_common::types::ExecutionResult;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use judge0::Judge0Backend;
pub use piston::PistonBackend;
pub use poll::PollPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{backend}: language '{language}' is not supported")]
    UnsupportedLanguage { backend: String, language: String },

    #[error("{backend}: transport error: {message}")]
    Transport { backend: String, message: String },

    #[error("{backend}: timed out: {message}")]
    Timeout { backend: String, message: String },
}

impl BackendError {
    pub fn unsupported(backend: &str, language: &str) -> Self {
        BackendError::UnsupportedLanguage {
            backend: backend.to_string(),
            language: language.to_string(),
        }
    }

    pub fn transport(backend: &str, message: impl Into<String>) -> Self {
        BackendError::Transport {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub fn timeout(backend: &str, message: impl Into<String>) -> Self {
        BackendError::Timeout {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    /// Classify a reqwest failure; elapsed request timeouts become `Timeout`
    pub fn from_http(backend: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::timeout(backend, format!("request timed out: {}", err))
        } else {
            BackendError::transport(backend, err.to_string())
        }
    }

    /// Short label used in logs and exhaustion messages
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::UnsupportedLanguage { .. } => "unsupported language",
            BackendError::Transport { .. } => "transport error",
            BackendError::Timeout { .. } => "timeout",
        }
    }
}

/// Uniform execution contract implemented by every remote service adapter
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Whether the capability table has an entry for `language`
    fn supports(&self, language: &str) -> bool;

    /// Canonical language ids this backend can run
    fn languages(&self) -> Vec<String>;

    async fn execute(
        &self,
        language: &str,
        source_code: &str,
        stdin: Option<&str>,
    ) -> Result<ExecutionResult, BackendError>;
}

/// Turn a non-success HTTP response into a transport error carrying its body
pub(crate) async fn error_for_status(
    backend: &str,
    context: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let preview: String = body.chars().take(200).collect();
    Err(BackendError::transport(
        backend,
        format!("{} failed (status {}): {}", context, status, preview),
    ))
}

/// Build the HTTP client shared by every adapter
pub fn http_client(request_timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(request_timeout)
        .user_agent(concat!("cascade/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Instantiate the backend chain in configured priority order.
///
/// Authenticated backends without a usable key are left out of the chain.
pub fn build_backends(config: &HarnessConfig) -> anyhow::Result<Vec<Arc<dyn Backend>>> {
    let client = http_client(Duration::from_millis(config.request_timeout_ms))?;
    let poll = PollPolicy::from(config.poll);

    let mut backends: Vec<Arc<dyn Backend>> = Vec::new();
    for backend in &config.backends {
        match backend {
            BackendConfig::Judge0(judge0) => {
                let api_key = match &judge0.auth {
                    Some(auth) => match auth.resolved_key() {
                        Some(key) => Some(key),
                        None => {
                            warn!(
                                backend = %judge0.name,
                                key_env = %auth.key_env,
                                "API key not configured; backend disabled"
                            );
                            continue;
                        }
                    },
                    None => None,
                };
                backends.push(Arc::new(Judge0Backend::new(
                    judge0.clone(),
                    api_key,
                    poll,
                    client.clone(),
                )));
            }
            BackendConfig::Piston(piston) => {
                backends.push(Arc::new(PistonBackend::new(piston.clone(), client.clone())));
            }
        }
        info!(
            backend = %backend.name(),
            base_url = %backend.base_url(),
            languages = backend.languages().len(),
            "Backend registered"
        );
    }

    Ok(backends)
}
