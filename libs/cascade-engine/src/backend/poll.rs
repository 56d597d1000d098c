// Bounded polling for two-phase (submit/poll) backends.
//
// SUBMITTED -> QUEUED -> PROCESSING -> TERMINAL. The loop only distinguishes
// "still running" from "done"; terminal ids are passed through untouched.
// Both the attempt ceiling and the overall deadline bound one hung job.

use super::BackendError;
use cascade_common::config::PollConfig;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Worst-case time spent sleeping between attempts
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }

    /// Wall-clock budget for the whole poll phase: each attempt may spend
    /// one interval fetching on top of the interval it sleeps
    pub fn deadline(&self) -> Duration {
        self.interval * self.max_attempts.saturating_mul(2)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::from(PollConfig::default())
    }
}

impl From<PollConfig> for PollPolicy {
    fn from(config: PollConfig) -> Self {
        PollPolicy::new(Duration::from_millis(config.interval_ms), config.max_attempts)
    }
}

/// Call `fetch` until `in_progress` reports a terminal state.
///
/// Errors from `fetch` abort immediately. Exhausting `max_attempts`, or
/// spending longer than `policy.deadline()` in total, yields
/// `BackendError::Timeout`; no sleep follows the final attempt.
pub async fn poll_until_terminal<T, F, Fut, P>(
    backend: &str,
    policy: PollPolicy,
    mut fetch: F,
    in_progress: P,
) -> Result<T, BackendError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
    P: Fn(&T) -> bool,
{
    let attempts = async {
        for attempt in 1..=policy.max_attempts {
            let state = fetch(attempt).await?;
            if !in_progress(&state) {
                debug!(backend = %backend, attempt, "Job reached terminal state");
                return Ok(state);
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        Err(BackendError::timeout(
            backend,
            format!(
                "job still running after {} poll attempts at {}ms",
                policy.max_attempts,
                policy.interval.as_millis()
            ),
        ))
    };

    match tokio::time::timeout(policy.deadline(), attempts).await {
        Ok(outcome) => outcome,
        Err(_) => Err(BackendError::timeout(
            backend,
            format!("job not terminal within {}ms", policy.deadline().as_millis()),
        )),
    }
}
