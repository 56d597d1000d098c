//! Scripted in-memory backends for orchestrator, executor and harness tests.

use crate::backend::{Backend, BackendError};
use async_trait::async_trait;
use cascade_common::types::{ExecutionResult, Status};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Script = dyn Fn(&str, Option<&str>) -> Result<ExecutionResult, BackendError> + Send + Sync;

/// Backend whose behavior is a closure over (source, stdin)
pub struct ScriptedBackend {
    name: String,
    languages: HashSet<String>,
    script: Box<Script>,
    latency: Box<dyn Fn(Option<&str>) -> Duration + Send + Sync>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl ScriptedBackend {
    pub fn new<F>(name: &str, languages: &[&str], script: F) -> Self
    where
        F: Fn(&str, Option<&str>) -> Result<ExecutionResult, BackendError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            script: Box::new(script),
            latency: Box::new(|_| Duration::ZERO),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Echo stdin back as stdout with ACCEPTED
    pub fn echo(name: &str, languages: &[&str]) -> Self {
        Self::new(name, languages, |_, stdin| Ok(accepted(stdin.unwrap_or(""))))
    }

    /// Always fail with a transport error
    pub fn failing(name: &str, languages: &[&str]) -> Self {
        let backend = name.to_string();
        Self::new(name, languages, move |_, _| {
            Err(BackendError::transport(&backend, "connection refused"))
        })
    }

    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(Option<&str>) -> Duration + Send + Sync + 'static,
    {
        self.latency = Box::new(latency);
        self
    }

    /// Record every attempt's backend name into a shared log
    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, language: &str) -> bool {
        self.languages.contains(language)
    }

    fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.languages.iter().cloned().collect();
        languages.sort();
        languages
    }

    async fn execute(
        &self,
        _language: &str,
        source_code: &str,
        stdin: Option<&str>,
    ) -> Result<ExecutionResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = (self.latency)(stdin);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = (self.script)(source_code, stdin);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn accepted(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        stdout: Some(stdout.to_string()),
        time: Some("0.010".to_string()),
        memory: Some(3200),
        ..ExecutionResult::with_status(Status::accepted())
    }
}
