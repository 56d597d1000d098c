/// Concurrent Test Harness
///
/// **Core Responsibility:**
/// Run one program against many test cases and aggregate the verdicts.
///
/// **Execution Model:**
/// - Cases sit in a shared queue; `min(limit, cases)` workers pop from it
/// - Each verdict is written into the slot of its original index
/// - Pass count and failing indices are shared behind atomics/locks
/// - A panic while running a case fails that case only
///
/// The worker count is the only backpressure. Per-case latency is bounded by
/// the adapters' own request timeout and poll ceiling.

use crate::evaluator::{aggregate, evaluate_case, failed_case};
use crate::executor::Executor;
use cascade_common::types::{ExecutionRequest, PerCaseResult, TestCase, TestRunResult};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn, Instrument};

pub use cascade_common::config::DEFAULT_CONCURRENCY_LIMIT;

pub struct TestHarness {
    executor: Arc<Executor>,
    concurrency_limit: usize,
}

/// State shared by every worker of one run
struct RunState {
    language: String,
    source_code: String,
    caller_id: Option<String>,
    queue: Mutex<VecDeque<(usize, TestCase)>>,
    slots: Mutex<Vec<Option<PerCaseResult>>>,
    passed: AtomicUsize,
    failed_indices: Mutex<Vec<usize>>,
}

impl TestHarness {
    pub fn new(executor: Arc<Executor>, concurrency_limit: usize) -> Self {
        Self {
            executor,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    #[instrument(skip(self, source_code, tests, caller_id), fields(tests = tests.len()))]
    pub async fn run_tests(
        &self,
        language: &str,
        source_code: &str,
        tests: &[TestCase],
        caller_id: Option<&str>,
    ) -> TestRunResult {
        let started = Instant::now();
        let total = tests.len();

        let state = Arc::new(RunState {
            language: language.to_string(),
            source_code: source_code.to_string(),
            caller_id: caller_id.map(str::to_string),
            queue: Mutex::new(tests.iter().cloned().enumerate().collect()),
            slots: Mutex::new(vec![None; total]),
            passed: AtomicUsize::new(0),
            failed_indices: Mutex::new(Vec::new()),
        });

        let workers = self.concurrency_limit.min(total);
        info!(language = %language, tests = total, workers, "Starting test run");

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let state = state.clone();
            let executor = self.executor.clone();
            set.spawn(run_worker(worker, executor, state).in_current_span());
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Test worker terminated abnormally");
            }
        }

        let slots = std::mem::take(&mut *state.slots.lock());
        let mut failed_indices = std::mem::take(&mut *state.failed_indices.lock());
        let passed = state.passed.load(Ordering::SeqCst);

        // Any slot left empty belongs to a worker that died outside a case
        let results: Vec<PerCaseResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    failed_indices.push(index);
                    failed_case(index, &tests[index], "test case was not executed")
                })
            })
            .collect();

        let run = aggregate(results, passed, failed_indices);

        info!(
            language = %language,
            total = run.total,
            passed = run.passed,
            failed = run.failed,
            status = %run.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Test run complete"
        );

        run
    }
}

async fn run_worker(worker: usize, executor: Arc<Executor>, state: Arc<RunState>) {
    loop {
        // Release the queue lock before executing
        let next = state.queue.lock().pop_front();
        let Some((index, test_case)) = next else {
            break;
        };

        let outcome = AssertUnwindSafe(run_case(&executor, &state, index, &test_case))
            .catch_unwind()
            .await;

        let verdict = match outcome {
            Ok(verdict) => verdict,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(worker, case = index, error = %reason, "Test case panicked");
                failed_case(index, &test_case, format!("test case panicked: {}", reason))
            }
        };

        if verdict.passed {
            state.passed.fetch_add(1, Ordering::SeqCst);
        } else {
            state.failed_indices.lock().push(index);
        }

        debug!(
            worker,
            case = index,
            passed = verdict.passed,
            status_id = verdict.status.id,
            "Test case evaluated"
        );

        if let Some(slot) = state.slots.lock().get_mut(index) {
            *slot = Some(verdict);
        }
    }
}

async fn run_case(
    executor: &Executor,
    state: &RunState,
    index: usize,
    test_case: &TestCase,
) -> PerCaseResult {
    let request = ExecutionRequest::new(state.language.as_str(), state.source_code.as_str())
        .with_stdin(test_case.stdin.as_str())
        .with_caller(state.caller_id.clone());

    let result = executor.execute(&request).await;
    evaluate_case(index, test_case, &result)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
