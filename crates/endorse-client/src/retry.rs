//! Retry state machine for submissions.
//!
//! Every attempt re-drives the whole pipeline (build the invocation chain,
//! select endorsers, execute) against a fresh directory snapshot, so a peer
//! that failed in one attempt is considered again in the next.
//!
//! ```text
//! Building -> Selecting -> Executing -> Succeeded
//!     ^                         |
//!     +------ RetryPending <----+ (retryable failure)
//!                               |
//!                               +-> Failed (terminal, exhausted or deadline)
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use endorse_common::{EndorseError, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Retry configuration with exponential backoff.
///
/// Only errors classified retryable by [`EndorseError::is_retryable`] are
/// retried. Everything else ends the submission at once.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    ///
    /// 0 is treated as 1.
    /// Default: 3
    pub max_attempts: u32,
    /// Backoff multiplier between consecutive delays
    ///
    /// Default: 2.0 (doubles each time)
    pub backoff_factor: f64,
    /// Delay before the second attempt
    ///
    /// Default: 50ms
    pub initial_delay: Duration,
    /// Upper bound for any delay, jitter included
    ///
    /// Default: 5000ms (5 seconds)
    pub max_delay: Duration,
    /// Adds deterministic jitter of up to a quarter of the delay
    ///
    /// Default: true
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(5000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt and no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Delay to wait after failed attempt `attempt` (1-based) before the next.
///
/// `min(initial_delay * backoff_factor^(attempt-1), max_delay)`, plus jitter
/// when enabled, re-clamped to `max_delay`. A non-finite or negative factor
/// yields the clamped initial delay.
pub fn compute_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let initial = policy.initial_delay.as_millis() as f64;
    let max = policy.max_delay.as_millis() as u64;
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;

    let raw = initial * policy.backoff_factor.powi(exponent);
    let base = if raw.is_finite() && raw >= 0.0 {
        (raw as u64).min(max)
    } else if raw.is_nan() || raw < 0.0 {
        (initial as u64).min(max)
    } else {
        max
    };

    if !policy.jitter {
        return Duration::from_millis(base);
    }

    // Offset depends on the attempt number only; two submissions on the same
    // attempt wait the same time
    let quarter = base / 4;
    let jitter = if quarter > 0 {
        (u64::from(attempt).wrapping_mul(7919).wrapping_add(104_729)) % (quarter + 1)
    } else {
        0
    };
    Duration::from_millis(base.saturating_add(jitter).min(max))
}

/// Position of one submission in the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Building,
    Selecting,
    Executing,
    RetryPending,
    Succeeded,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::Failed)
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub attempt: u32,
    pub state: AttemptState,
    /// Error or backoff detail, when the state has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

type History = Arc<Mutex<Vec<Transition>>>;

fn record(history: &History, attempt: u32, state: AttemptState, detail: Option<String>) {
    match &detail {
        Some(detail) => debug!("Attempt {} -> {:?}: {}", attempt, state, detail),
        None => debug!("Attempt {} -> {:?}", attempt, state),
    }
    if let Ok(mut history) = history.lock() {
        history.push(Transition {
            attempt,
            state,
            detail,
        });
    }
}

/// Handle given to each attempt so it can report its pipeline phase.
#[derive(Debug, Clone)]
pub struct AttemptHandle {
    attempt: u32,
    history: History,
}

impl AttemptHandle {
    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn enter(&self, state: AttemptState) {
        record(&self.history, self.attempt, state, None);
    }
}

/// Drives attempts under a [`RetryPolicy`], an optional per-attempt timeout
/// and an optional caller deadline.
///
/// The loop is strictly sequential: the next attempt starts only after the
/// previous one finished and its backoff elapsed.
pub struct RetryOrchestrator {
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
    deadline: Option<Instant>,
    history: History,
}

impl RetryOrchestrator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt_timeout: None,
            deadline: None,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Every transition recorded so far, in order.
    pub fn history(&self) -> Vec<Transition> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Current state, or `None` before the first attempt.
    pub fn state(&self) -> Option<AttemptState> {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.last().map(|t| t.state))
    }

    /// Runs `attempt` until it succeeds, fails terminally, attempts run out
    /// or the deadline passes.
    ///
    /// Errors:
    /// - a non-retryable error is returned as-is
    /// - the last retryable error is wrapped in `RetriesExhausted` once
    ///   `max_attempts` attempts failed
    /// - when the deadline cuts an attempt or would cut a backoff, the last
    ///   attempt error is returned, or `DeadlineExceeded` if there is none
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(AttemptHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.effective_max_attempts();
        let mut last_error: Option<EndorseError> = None;
        let mut number = 0u32;

        loop {
            number += 1;
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.give_up(number, last_error));
            }

            record(&self.history, number, AttemptState::Building, None);
            let handle = AttemptHandle {
                attempt: number,
                history: Arc::clone(&self.history),
            };

            let (budget, bounded_by_deadline) = self.attempt_budget();
            let fut = attempt(handle);
            let outcome = match budget {
                Some(budget) => match tokio::time::timeout(budget, fut).await {
                    Ok(outcome) => outcome,
                    Err(_) if bounded_by_deadline => {
                        warn!("Attempt {} aborted by the caller deadline", number);
                        return Err(self.give_up(number, last_error));
                    }
                    Err(_) => Err(EndorseError::AttemptTimedOut(budget.as_millis() as u64)),
                },
                None => fut.await,
            };

            let error = match outcome {
                Ok(value) => {
                    record(&self.history, number, AttemptState::Succeeded, None);
                    if number > 1 {
                        info!("Submission succeeded on attempt {}", number);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                record(&self.history, number, AttemptState::Failed, Some(error.to_string()));
                warn!("Attempt {} failed with non-retryable error: {}", number, error);
                return Err(error);
            }

            if number >= max_attempts {
                record(&self.history, number, AttemptState::Failed, Some(error.to_string()));
                warn!("Giving up after {} attempt(s): {}", number, error);
                return Err(EndorseError::RetriesExhausted {
                    attempts: number,
                    last: Box::new(error),
                });
            }

            let delay = compute_delay(&self.policy, number);
            if self
                .deadline
                .is_some_and(|d| Instant::now() + delay >= d)
            {
                record(&self.history, number, AttemptState::Failed, Some(error.to_string()));
                warn!(
                    "Not retrying after attempt {}: backoff of {:?} would pass the deadline",
                    number, delay
                );
                return Err(error);
            }

            record(
                &self.history,
                number,
                AttemptState::RetryPending,
                Some(format!("{} (retrying in {:?})", error, delay)),
            );
            warn!(
                "Attempt {}/{} failed: {}, retrying in {:?}",
                number, max_attempts, error, delay
            );
            tokio::time::sleep(delay).await;
            last_error = Some(error);
        }
    }

    /// Time allowed for the next attempt, and whether the caller deadline is
    /// what bounds it.
    fn attempt_budget(&self) -> (Option<Duration>, bool) {
        let remaining = self
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()));
        match (self.attempt_timeout, remaining) {
            (Some(timeout), Some(remaining)) if remaining <= timeout => (Some(remaining), true),
            (Some(timeout), _) => (Some(timeout), false),
            (None, Some(remaining)) => (Some(remaining), true),
            (None, None) => (None, false),
        }
    }

    fn give_up(&self, attempt: u32, last_error: Option<EndorseError>) -> EndorseError {
        let error = last_error.unwrap_or(EndorseError::DeadlineExceeded);
        record(&self.history, attempt, AttemptState::Failed, Some(error.to_string()));
        error
    }
}
