//! Retry-timeout executor.
//!
//! Runs an async action against an ordered list of timeout budgets and keeps
//! the first defined result. Each invocation runs in its own task; when a
//! budget elapses the task is abandoned, not cancelled, since it may already
//! have side effects in flight. Abandoned handles are handed back to the
//! caller for reconciliation.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// How one attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// Produced a value within its budget
    Completed,
    /// Finished within its budget without a value, or panicked
    Unresolved,
    /// Budget elapsed first; the invocation was abandoned
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub index: usize,
    pub budget: Duration,
    pub elapsed: Duration,
    pub status: AttemptStatus,
}

/// An invocation still running after its budget elapsed
#[derive(Debug)]
pub struct AbandonedAttempt<T> {
    pub index: usize,
    pub handle: JoinHandle<Option<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed { value: T, attempt: usize },
    Exhausted,
}

#[derive(Debug)]
pub struct Execution<T> {
    pub outcome: Outcome<T>,
    pub attempts: Vec<AttemptRecord>,
    pub abandoned: Vec<AbandonedAttempt<T>>,
}

impl<T> Execution<T> {
    /// Index of the winning attempt, `None` when every budget was exhausted
    pub fn attempt(&self) -> Option<usize> {
        match &self.outcome {
            Outcome::Completed { attempt, .. } => Some(*attempt),
            Outcome::Exhausted => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, Outcome::Completed { .. })
    }

    /// `(value, attempt index)`, with `(None, -1)` on exhaustion
    pub fn into_parts(self) -> (Option<T>, i64) {
        match self.outcome {
            Outcome::Completed { value, attempt } => (Some(value), attempt as i64),
            Outcome::Exhausted => (None, -1),
        }
    }
}

/// Invoke `action` once per budget until an invocation yields `Some` within
/// its budget. The action is re-invoked on every retry, never resumed.
pub async fn execute_with_retries<F, Fut, T>(mut action: F, budgets: &[Duration]) -> Execution<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut attempts = Vec::with_capacity(budgets.len());
    let mut abandoned = Vec::new();

    for (index, &budget) in budgets.iter().enumerate() {
        let started = Instant::now();
        let mut handle = tokio::spawn(action());

        let status = match timeout(budget, &mut handle).await {
            Ok(Ok(Some(value))) => {
                attempts.push(AttemptRecord {
                    index,
                    budget,
                    elapsed: started.elapsed(),
                    status: AttemptStatus::Completed,
                });
                debug!(attempt = index, "action completed");
                return Execution {
                    outcome: Outcome::Completed { value, attempt: index },
                    attempts,
                    abandoned,
                };
            }
            Ok(Ok(None)) => AttemptStatus::Unresolved,
            Ok(Err(join_error)) => {
                warn!(attempt = index, error = %join_error, "action task failed");
                AttemptStatus::Unresolved
            }
            Err(_) => {
                abandoned.push(AbandonedAttempt { index, handle });
                AttemptStatus::TimedOut
            }
        };

        debug!(attempt = index, budget_ms = budget.as_millis() as u64, ?status, "attempt gave no result");
        attempts.push(AttemptRecord {
            index,
            budget,
            elapsed: started.elapsed(),
            status,
        });
    }

    Execution {
        outcome: Outcome::Exhausted,
        attempts,
        abandoned,
    }
}
