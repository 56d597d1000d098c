/// Test Evaluator - Language-Agnostic Verdict Logic
///
/// **Core Responsibility:**
/// Compare an execution's stdout with a test case's expected output.
///
/// **Critical Properties:**
/// - Knows nothing about backends or fallback
/// - Pure functions: (execution result, test case) → verdict
///
/// **Verdict Rules:**
/// - passed ⇔ status is Accepted AND normalized outputs are equal
/// - Hidden cases never expose stdout, stderr, expected or actual
/// - overall status: PASSED if all passed, FAILED if none, PARTIAL otherwise
///
/// **Normalization Rules:**
/// - `\r\n` and lone `\r` become `\n`
/// - Leading and trailing whitespace is trimmed
/// - Internal whitespace and case are preserved

use cascade_common::types::{
    ExecutionResult, PerCaseResult, Status, TestCase, TestRunResult, TestRunStatus,
};

/// Canonical form of program output used for comparison
pub fn normalize(output: &str) -> String {
    output.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Build the verdict for one case from its execution result
pub fn evaluate_case(index: usize, test_case: &TestCase, result: &ExecutionResult) -> PerCaseResult {
    let actual = normalize(result.stdout.as_deref().unwrap_or(""));
    let expected = normalize(&test_case.expected_output);
    let passed = result.status.is_accepted() && actual == expected;

    let visible = |value: String| (!test_case.is_hidden).then_some(value);

    PerCaseResult {
        index,
        passed,
        is_hidden: test_case.is_hidden,
        status: result.status.clone(),
        stdout: result.stdout.clone().filter(|_| !test_case.is_hidden),
        stderr: result.stderr.clone().filter(|_| !test_case.is_hidden),
        expected: visible(expected),
        actual: visible(actual),
        compile_output: result.compile_output.clone(),
        time: result.time.clone(),
        error: None,
    }
}

/// Failed verdict for a case whose evaluation itself broke
pub fn failed_case(index: usize, test_case: &TestCase, error: impl Into<String>) -> PerCaseResult {
    PerCaseResult {
        index,
        passed: false,
        is_hidden: test_case.is_hidden,
        status: Status::unknown(),
        stdout: None,
        stderr: None,
        expected: (!test_case.is_hidden).then(|| normalize(&test_case.expected_output)),
        actual: None,
        compile_output: None,
        time: None,
        error: Some(error.into()),
    }
}

/// Assemble the run result from per-case verdicts in input order.
///
/// `passed` and `failed_indices` come from the workers' shared counters;
/// the aggregate diagnostics are taken from the lowest failing index.
pub fn aggregate(
    results: Vec<PerCaseResult>,
    passed: usize,
    mut failed_indices: Vec<usize>,
) -> TestRunResult {
    let total = results.len();
    failed_indices.sort_unstable();

    let failing = || failed_indices.iter().filter_map(|&i| results.get(i));

    let stderr = failing()
        .filter(|r| !r.is_hidden)
        .find_map(|r| r.stderr.clone().filter(|s| !s.is_empty()));
    let compile_output = failing().find_map(|r| r.compile_output.clone().filter(|s| !s.is_empty()));

    TestRunResult {
        total,
        passed,
        failed: total - passed,
        status: TestRunStatus::from_counts(passed, total),
        stderr,
        compile_output,
        failed_indices,
        results,
    }
}
