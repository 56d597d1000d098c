use serde::{Deserialize, Serialize};

/// Judge0-compatible status identifiers.
///
/// Every backend maps its native outcome onto this numbering so callers can
/// branch on a single scheme. Id 0 is reserved for synthetic results produced
/// when no backend could be reached.
pub mod status_id {
    pub const UNKNOWN: u32 = 0;
    pub const IN_QUEUE: u32 = 1;
    pub const PROCESSING: u32 = 2;
    pub const ACCEPTED: u32 = 3;
    pub const WRONG_ANSWER: u32 = 4;
    pub const TIME_LIMIT_EXCEEDED: u32 = 5;
    pub const COMPILATION_ERROR: u32 = 6;
    pub const RUNTIME_ERROR_SIGSEGV: u32 = 7;
    pub const RUNTIME_ERROR_SIGXFSZ: u32 = 8;
    pub const RUNTIME_ERROR_SIGFPE: u32 = 9;
    pub const RUNTIME_ERROR_SIGABRT: u32 = 10;
    pub const RUNTIME_ERROR_NZEC: u32 = 11;
    pub const RUNTIME_ERROR_OTHER: u32 = 12;
    pub const INTERNAL_ERROR: u32 = 13;
    pub const EXEC_FORMAT_ERROR: u32 = 14;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: u32,
    pub description: String,
}

impl Status {
    pub fn new(id: u32, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
        }
    }

    /// Build a status from its id using the standard description
    pub fn from_id(id: u32) -> Self {
        let description = match id {
            status_id::IN_QUEUE => "In Queue",
            status_id::PROCESSING => "Processing",
            status_id::ACCEPTED => "Accepted",
            status_id::WRONG_ANSWER => "Wrong Answer",
            status_id::TIME_LIMIT_EXCEEDED => "Time Limit Exceeded",
            status_id::COMPILATION_ERROR => "Compilation Error",
            status_id::RUNTIME_ERROR_SIGSEGV => "Runtime Error (SIGSEGV)",
            status_id::RUNTIME_ERROR_SIGXFSZ => "Runtime Error (SIGXFSZ)",
            status_id::RUNTIME_ERROR_SIGFPE => "Runtime Error (SIGFPE)",
            status_id::RUNTIME_ERROR_SIGABRT => "Runtime Error (SIGABRT)",
            status_id::RUNTIME_ERROR_NZEC => "Runtime Error (NZEC)",
            status_id::RUNTIME_ERROR_OTHER => "Runtime Error (Other)",
            status_id::INTERNAL_ERROR => "Internal Error",
            status_id::EXEC_FORMAT_ERROR => "Exec Format Error",
            _ => "Unknown Error",
        };
        Self::new(id, description)
    }

    pub fn unknown() -> Self {
        Self::new(status_id::UNKNOWN, "Unknown Error")
    }

    pub fn accepted() -> Self {
        Self::from_id(status_id::ACCEPTED)
    }

    pub fn is_accepted(&self) -> bool {
        self.id == status_id::ACCEPTED
    }

    /// Queued or processing; anything else is terminal
    pub fn is_in_progress(&self) -> bool {
        matches!(self.id, status_id::IN_QUEUE | status_id::PROCESSING)
    }

    pub fn is_compile_error(&self) -> bool {
        self.id == status_id::COMPILATION_ERROR
    }

    pub fn is_runtime_error(&self) -> bool {
        (status_id::RUNTIME_ERROR_SIGSEGV..=status_id::RUNTIME_ERROR_OTHER).contains(&self.id)
    }
}

/// A single ungraded execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub source_code: String,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub caller_id: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source_code: source_code.into(),
            stdin: None,
            caller_id: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_caller(mut self, caller_id: Option<String>) -> Self {
        self.caller_id = caller_id;
        self
    }

    /// Canonical language id (lowercase, trimmed)
    pub fn language_key(&self) -> String {
        self.language.trim().to_lowercase()
    }
}

/// Outcome of one execution, in Judge0's field layout.
///
/// `status` is always present. When no backend produced a result the status
/// is the synthetic `Unknown Error` sentinel (id 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    /// Elapsed run time in seconds, as reported by the backend
    pub time: Option<String>,
    /// Peak memory in kilobytes
    pub memory: Option<u64>,
    pub status: Status,
}

impl ExecutionResult {
    pub fn with_status(status: Status) -> Self {
        Self {
            stdout: None,
            stderr: None,
            compile_output: None,
            message: None,
            time: None,
            memory: None,
            status,
        }
    }

    /// Synthetic infrastructure failure (status id 0)
    pub fn synthetic_failure(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stderr: Some(stderr.into()),
            message: Some(message.into()),
            ..Self::with_status(Status::unknown())
        }
    }

    /// True when stderr or compile output carries text
    pub fn has_diagnostics(&self) -> bool {
        non_empty(&self.stderr) || non_empty(&self.compile_output)
    }
}

fn non_empty(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default, alias = "input")]
    pub stdin: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
}

impl TestCase {
    pub fn new(stdin: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            stdin: stdin.into(),
            expected_output: expected_output.into(),
            is_hidden: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }
}

/// Verdict and evidence for one test case.
///
/// For hidden cases `stdout`, `stderr`, `expected` and `actual` are always
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerCaseResult {
    pub index: usize,
    pub passed: bool,
    pub is_hidden: bool,
    pub status: Status,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// Depends only on the source, so it is kept for hidden cases too
    pub compile_output: Option<String>,
    pub time: Option<String>,
    /// Infrastructure error raised while running this case
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestRunStatus {
    Passed,
    Partial,
    Failed,
    NoTests,
}

impl TestRunStatus {
    pub fn from_counts(passed: usize, total: usize) -> Self {
        if total == 0 {
            TestRunStatus::NoTests
        } else if passed == total {
            TestRunStatus::Passed
        } else if passed == 0 {
            TestRunStatus::Failed
        } else {
            TestRunStatus::Partial
        }
    }
}

impl std::fmt::Display for TestRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestRunStatus::Passed => "PASSED",
            TestRunStatus::Partial => "PARTIAL",
            TestRunStatus::Failed => "FAILED",
            TestRunStatus::NoTests => "NO_TESTS",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub failed_indices: Vec<usize>,
    pub status: TestRunStatus,
    /// stderr of the first failing visible case
    pub stderr: Option<String>,
    /// compile output of the first failing case that produced one
    pub compile_output: Option<String>,
    /// One entry per test case, in input order
    pub results: Vec<PerCaseResult>,
}
