//! Piston adapter (single round trip).
//!
//! Piston reports raw process outcomes (exit code, signal) instead of verdicts,
//! so results are mapped onto Judge0 status ids here.

use super::{error_for_status, Backend, BackendError};
use async_trait::async_trait;
use cascade_common::config::{PistonConfig, PistonRuntime};
use cascade_common::types::{status_id, ExecutionResult, Status};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Deserialize)]
struct RuntimeInfo {
    language: String,
    version: String,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<SourceFile<'a>>,
    stdin: &'a str,
}

#[derive(Debug, Serialize)]
struct SourceFile<'a> {
    name: String,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    run: Option<StageOutput>,
    compile: Option<StageOutput>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StageOutput {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    code: Option<i64>,
    signal: Option<String>,
    /// Milliseconds
    wall_time: Option<u64>,
    /// Bytes
    memory: Option<u64>,
}

impl StageOutput {
    fn failed(&self) -> bool {
        self.signal.is_some() || self.code.is_some_and(|c| c != 0)
    }
}

pub struct PistonBackend {
    config: PistonConfig,
    base_url: String,
    client: Client,
    runtimes: OnceCell<Vec<RuntimeInfo>>,
}

impl PistonBackend {
    pub fn new(config: PistonConfig, client: Client) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config,
            base_url,
            client,
            runtimes: OnceCell::new(),
        }
    }

    /// Concrete version for a runtime; `*` asks the instance once and caches
    async fn resolve_version(&self, runtime: &PistonRuntime) -> Result<String, BackendError> {
        if runtime.version != "*" {
            return Ok(runtime.version.clone());
        }

        let runtimes = self
            .runtimes
            .get_or_try_init(|| self.fetch_runtimes())
            .await?;

        runtimes
            .iter()
            .filter(|r| r.language == runtime.language || r.aliases.contains(&runtime.language))
            .max_by(|a, b| compare_versions(&a.version, &b.version))
            .map(|r| r.version.clone())
            .ok_or_else(|| {
                BackendError::transport(
                    self.name(),
                    format!("{} runtime not available", runtime.language),
                )
            })
    }

    async fn fetch_runtimes(&self) -> Result<Vec<RuntimeInfo>, BackendError> {
        let url = format!("{}/runtimes", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::from_http(self.name(), e))?;

        let response = error_for_status(self.name(), "runtime list", response).await?;
        let runtimes: Vec<RuntimeInfo> = response
            .json()
            .await
            .map_err(|e| BackendError::transport(self.name(), format!("invalid runtime list: {}", e)))?;

        debug!(backend = %self.name(), count = runtimes.len(), "Fetched runtimes");
        Ok(runtimes)
    }
}

#[async_trait]
impl Backend for PistonBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports(&self, language: &str) -> bool {
        self.config.languages.supports(language)
    }

    fn languages(&self) -> Vec<String> {
        self.config.languages.languages()
    }

    #[instrument(skip(self, source_code, stdin), fields(backend = %self.config.name))]
    async fn execute(
        &self,
        language: &str,
        source_code: &str,
        stdin: Option<&str>,
    ) -> Result<ExecutionResult, BackendError> {
        let runtime = self
            .config
            .languages
            .get(language)
            .ok_or_else(|| BackendError::unsupported(self.name(), language))?;

        let version = self.resolve_version(runtime).await?;

        let body = ExecuteRequest {
            language: &runtime.language,
            version: &version,
            files: vec![SourceFile {
                name: format!("main.{}", file_extension(language)),
                content: source_code,
            }],
            stdin: stdin.unwrap_or(""),
        };

        let url = format!("{}/execute", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_http(self.name(), e))?;

        let response = error_for_status(self.name(), "execution", response).await?;
        let payload: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| BackendError::transport(self.name(), format!("invalid execution response: {}", e)))?;

        into_result(self.name(), payload)
    }
}

fn into_result(backend: &str, payload: ExecuteResponse) -> Result<ExecutionResult, BackendError> {
    let compile_failed = payload.compile.as_ref().is_some_and(StageOutput::failed);

    // A successful compile (or none at all) must be followed by a run stage
    let run = match payload.run {
        Some(run) => run,
        None if compile_failed => StageOutput::default(),
        None => {
            return Err(BackendError::transport(
                backend,
                payload
                    .message
                    .unwrap_or_else(|| "response carried no run stage".to_string()),
            ))
        }
    };

    let status = if compile_failed {
        Status::from_id(status_id::COMPILATION_ERROR)
    } else {
        map_run_status(&run)
    };

    let compile_output = payload.compile.as_ref().and_then(|c| {
        non_empty(&c.stderr).or_else(|| if c.failed() { non_empty(&c.stdout) } else { None })
    });

    let message = run
        .signal
        .as_ref()
        .map(|s| format!("Signal: {}", s))
        .or(payload.message);

    Ok(ExecutionResult {
        stdout: non_empty(&run.stdout),
        stderr: non_empty(&run.stderr),
        compile_output,
        message,
        time: run.wall_time.map(|ms| format!("{:.3}", ms as f64 / 1000.0)),
        memory: run.memory.map(|bytes| bytes / 1024),
        status,
    })
}

fn map_run_status(run: &StageOutput) -> Status {
    if let Some(signal) = run.signal.as_deref() {
        let id = match signal {
            "SIGSEGV" => status_id::RUNTIME_ERROR_SIGSEGV,
            "SIGXFSZ" => status_id::RUNTIME_ERROR_SIGXFSZ,
            "SIGFPE" => status_id::RUNTIME_ERROR_SIGFPE,
            "SIGABRT" => status_id::RUNTIME_ERROR_SIGABRT,
            // Piston kills over-running processes
            "SIGKILL" => status_id::TIME_LIMIT_EXCEEDED,
            _ => status_id::RUNTIME_ERROR_OTHER,
        };
        return Status::from_id(id);
    }

    match run.code {
        Some(0) | None => Status::accepted(),
        Some(_) => Status::from_id(status_id::RUNTIME_ERROR_NZEC),
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Numeric-aware comparison of dotted version strings
fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parts = |v: &str| -> Vec<u64> {
        v.split(|c: char| !c.is_ascii_digit())
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.parse().ok())
            .collect()
    };
    parts(a).cmp(&parts(b))
}

/// Source file extension Piston uses to pick the entry file
pub fn file_extension(language: &str) -> &'static str {
    match language.trim().to_lowercase().as_str() {
        "c" => "c",
        "cpp" => "cpp",
        "java" => "java",
        "python" => "py",
        "javascript" => "js",
        "typescript" => "ts",
        "csharp" => "cs",
        "go" => "go",
        "rust" => "rs",
        "swift" => "swift",
        "ruby" => "rb",
        "php" => "php",
        "kotlin" => "kt",
        "perl" => "pl",
        _ => "txt",
    }
}
