// CLI commands for running code and inspecting the failure log
use anyhow::{bail, Context, Result};
use cascade_common::config::HarnessConfig;
use cascade_common::redis::recent_failures;
use cascade_common::types::{ExecutionRequest, ExecutionResult, TestCase, TestRunResult};
use cascade_engine::telemetry::TracingTelemetrySink;
use cascade_engine::ExecutionService;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Explicit path, or the API's lookup order; env overrides apply either way
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    match path {
        Some(path) => {
            let mut config = HarnessConfig::load(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
        None => HarnessConfig::load_default(),
    }
}

fn service(config: &HarnessConfig) -> Result<ExecutionService> {
    ExecutionService::from_config(config, Arc::new(TracingTelemetrySink))
}

fn read_source(file: &Path) -> Result<String> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file {}", file.display()))?;
    if source.trim().is_empty() {
        bail!("Source file {} is empty", file.display());
    }
    Ok(source)
}

/// Parse a test-case list from JSON text
pub fn parse_tests(content: &str) -> Result<Vec<TestCase>> {
    serde_json::from_str(content).context("Failed to parse test cases (expected a JSON array)")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(
    config: &HarnessConfig,
    language: &str,
    file: &Path,
    stdin: Option<String>,
    json: bool,
) -> Result<()> {
    let source = read_source(file)?;
    let mut request = ExecutionRequest::new(language, source);
    request.stdin = stdin;

    let result = service(config)?.execute(&request).await;

    if json {
        return print_json(&result);
    }
    print_execution(&result);
    Ok(())
}

fn print_execution(result: &ExecutionResult) {
    let marker = if result.status.is_accepted() { "✓" } else { "✗" };
    println!("{} {} (id: {})", marker, result.status.description, result.status.id);
    if let Some(time) = &result.time {
        println!("  Time: {}s", time);
    }
    if let Some(memory) = result.memory {
        println!("  Memory: {} KB", memory);
    }
    let sections = [
        ("stdout", &result.stdout),
        ("stderr", &result.stderr),
        ("compile output", &result.compile_output),
        ("message", &result.message),
    ];
    for (label, value) in sections {
        if let Some(text) = value.as_deref().filter(|s| !s.is_empty()) {
            println!();
            println!("── {} ──", label);
            println!("{}", text.trim_end());
        }
    }
}

pub async fn test(
    config: &HarnessConfig,
    language: &str,
    file: &Path,
    tests: &Path,
    json: bool,
) -> Result<()> {
    let source = read_source(file)?;
    let content = fs::read_to_string(tests)
        .with_context(|| format!("Failed to read test file {}", tests.display()))?;
    let cases = parse_tests(&content)?;

    let run = service(config)?.run_tests(language, &source, &cases, None).await;

    if json {
        return print_json(&run);
    }
    print_test_run(&run);
    Ok(())
}

fn print_test_run(run: &TestRunResult) {
    println!("→ {} test cases", run.total);
    for result in &run.results {
        let marker = if result.passed { "✓" } else { "✗" };
        let hidden = if result.is_hidden { " [hidden]" } else { "" };
        println!(
            "  {} Test {}{} → {}",
            marker,
            result.index + 1,
            hidden,
            result.status.description
        );
        if !result.passed {
            if let (Some(expected), Some(actual)) = (&result.expected, &result.actual) {
                println!("    Expected: \"{}\"", expected);
                println!("    Got:      \"{}\"", actual);
            }
            if let Some(error) = &result.error {
                println!("    Error: {}", error);
            }
        }
    }

    println!();
    println!("  Passed: {} / {}", run.passed, run.total);
    println!("  Status: {}", run.status);
    if let Some(compile_output) = &run.compile_output {
        println!();
        println!("── compile output ──");
        println!("{}", compile_output.trim_end());
    } else if let Some(stderr) = &run.stderr {
        println!();
        println!("── stderr (first failure) ──");
        println!("{}", stderr.trim_end());
    }
}

pub fn languages(config: &HarnessConfig, json: bool) -> Result<()> {
    let capabilities = service(config)?.capabilities();

    if json {
        return print_json(&capabilities);
    }

    for backend in &capabilities {
        println!("{}. {}", backend.priority + 1, backend.name);
        println!("   {}", backend.languages.join(", "));
    }

    let active: Vec<&str> = capabilities.iter().map(|b| b.name.as_str()).collect();
    for name in config.backend_names() {
        if !active.contains(&name.as_str()) {
            println!("-  {} (disabled: no API key)", name);
        }
    }
    Ok(())
}

pub async fn failures(language: &str, limit: usize, json: bool) -> Result<()> {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url.as_str()).context("Invalid REDIS_URL")?;
    let mut conn = client
        .get_connection_manager()
        .await
        .context("Failed to connect to Redis")?;

    let reports = recent_failures(&mut conn, language, limit)
        .await
        .context("Failed to read failure log")?;

    if json {
        return print_json(&reports);
    }

    if reports.is_empty() {
        println!("No failures recorded for {}", language);
        return Ok(());
    }

    for report in &reports {
        println!(
            "{}  {}  {} (id: {})  caller: {}",
            report.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            report.id,
            report.result.status.description,
            report.result.status.id,
            report.caller_id.as_deref().unwrap_or("-")
        );
        let detail = report
            .result
            .compile_output
            .as_deref()
            .or(report.result.stderr.as_deref())
            .and_then(|s| s.lines().next())
            .unwrap_or("");
        if !detail.is_empty() {
            println!("    {}", detail);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_tests_accepts_both_field_names() {
        let cases = parse_tests(
            r#"[
                {"stdin": "5", "expected_output": "120"},
                {"input": "3", "expected_output": "6", "is_hidden": true}
            ]"#,
        )
        .unwrap();

        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].stdin, "3");
        assert!(cases[1].is_hidden);
    }

    #[test]
    fn test_parse_tests_rejects_object() {
        assert!(parse_tests(r#"{"stdin": "5"}"#).is_err());
    }

    #[test]
    fn test_read_source_rejects_blank_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();
        assert!(read_source(file.path()).is_err());
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"backends": [{{"kind": "piston", "name": "local-piston",
                "base_url": "http://localhost:2000",
                "languages": {{"python": {{"language": "python3"}}}}}}]}}"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.backend_names(), vec!["local-piston"]);
        assert_eq!(config.concurrency_limit, 3);
    }
}
