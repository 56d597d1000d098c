//! Judge0 adapter (two-phase submit/poll protocol).
//!
//! Serves both the self-hosted instance and the RapidAPI-hosted one; the latter
//! only differs by its authentication headers. All payloads travel base64
//! encoded so arbitrary bytes in source, stdin, and output survive JSON.

use super::poll::{poll_until_terminal, PollPolicy};
use super::{error_for_status, Backend, BackendError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use cascade_common::config::{Judge0Config, Judge0Limits};
use cascade_common::types::{ExecutionResult, Status};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const RAPIDAPI_KEY_HEADER: &str = "X-RapidAPI-Key";
const RAPIDAPI_HOST_HEADER: &str = "X-RapidAPI-Host";

#[derive(Debug, Serialize)]
struct SubmissionRequest {
    language_id: u32,
    source_code: String,
    stdin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu_time_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wall_time_limit: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SubmissionToken {
    token: String,
}

/// Submission state as returned by `GET /submissions/{token}`
#[derive(Debug, Deserialize)]
struct Submission {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    time: Option<String>,
    memory: Option<u64>,
    status: Status,
}

pub struct Judge0Backend {
    config: Judge0Config,
    base_url: String,
    api_key: Option<String>,
    poll: PollPolicy,
    client: Client,
}

impl Judge0Backend {
    pub fn new(config: Judge0Config, api_key: Option<String>, poll: PollPolicy, client: Client) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config,
            base_url,
            api_key,
            poll,
            client,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.api_key, &self.config.auth) {
            (Some(key), Some(auth)) => request
                .header(RAPIDAPI_KEY_HEADER, key)
                .header(RAPIDAPI_HOST_HEADER, &auth.host),
            _ => request,
        }
    }

    async fn submit(&self, language_id: u32, source_code: &str, stdin: &str) -> Result<String, BackendError> {
        let limits = self.config.limits.unwrap_or(Judge0Limits {
            memory_limit: None,
            cpu_time_limit: None,
            wall_time_limit: None,
        });

        let body = SubmissionRequest {
            language_id,
            source_code: encode(source_code),
            stdin: encode(stdin),
            memory_limit: limits.memory_limit,
            cpu_time_limit: limits.cpu_time_limit,
            wall_time_limit: limits.wall_time_limit,
        };

        let url = format!("{}/submissions?base64_encoded=true&wait=false", self.base_url);
        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| BackendError::from_http(self.name(), e))?;

        let response = error_for_status(self.name(), "submission", response).await?;
        let SubmissionToken { token } = response
            .json()
            .await
            .map_err(|e| BackendError::transport(self.name(), format!("invalid submission response: {}", e)))?;

        Ok(token)
    }

    async fn fetch(&self, token: &str) -> Result<Submission, BackendError> {
        let url = format!("{}/submissions/{}?base64_encoded=true&fields=*", self.base_url, token);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| BackendError::from_http(self.name(), e))?;

        let response = error_for_status(self.name(), "result fetch", response).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::transport(self.name(), format!("invalid submission state: {}", e)))
    }
}

#[async_trait]
impl Backend for Judge0Backend {
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
        let language_id = *self
            .config
            .languages
            .get(language)
            .ok_or_else(|| BackendError::unsupported(self.name(), language))?;

        let token = self.submit(language_id, source_code, stdin.unwrap_or("")).await?;
        debug!(token = %token, language_id, "Submission accepted");

        let submission = poll_until_terminal(
            self.name(),
            self.poll,
            |attempt| {
                let token = token.as_str();
                async move {
                    let state = self.fetch(token).await?;
                    debug!(attempt, status_id = state.status.id, "Polled submission");
                    Ok(state)
                }
            },
            |state: &Submission| state.status.is_in_progress(),
        )
        .await?;

        Ok(ExecutionResult {
            stdout: decode(submission.stdout),
            stderr: decode(submission.stderr),
            compile_output: decode(submission.compile_output),
            message: decode(submission.message),
            time: submission.time.filter(|t| !t.is_empty()),
            memory: submission.memory,
            status: submission.status,
        })
    }
}

fn encode(text: &str) -> String {
    general_purpose::STANDARD.encode(text)
}

/// Decode a base64 field; Judge0 wraps encoded output every 60 columns.
/// Empty fields become `None`; undecodable fields pass through verbatim.
fn decode(field: Option<String>) -> Option<String> {
    let raw = field?;
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let text = match general_purpose::STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => raw,
    };
    Some(text).filter(|t| !t.is_empty())
}
