//! Retry budget decisions for failed task attempts.
//!
//! Kept separate from the task store so the rule can be tested without any
//! storage dependency. Pacing between attempts is the processor's concern,
//! not this module's: there is no backoff here.

use crate::models::TaskStatus;

/// Decision rule applied when an attempt at a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(self) -> u32 {
        self.max_retries
    }

    /// Account one more failed attempt on top of `prior_retries`.
    ///
    /// The returned count is always `prior_retries + 1`; the status is
    /// `PermanentFailure` once that count reaches the budget, `Pending`
    /// (claimable again) otherwise.
    pub fn after_failure(self, prior_retries: u32) -> RetryDecision {
        let retry_count = prior_retries.saturating_add(1);
        let status = if retry_count >= self.max_retries {
            TaskStatus::PermanentFailure
        } else {
            TaskStatus::Pending
        };
        RetryDecision {
            retry_count,
            status,
        }
    }
}

/// Outcome of recording one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Retry count after this failure.
    pub retry_count: u32,
    /// Status the task moves to.
    pub status: TaskStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_pending_below_budget() {
        let policy = RetryPolicy::new(3);
        assert_eq!(
            policy.after_failure(0),
            RetryDecision {
                retry_count: 1,
                status: TaskStatus::Pending
            }
        );
        assert_eq!(
            policy.after_failure(1),
            RetryDecision {
                retry_count: 2,
                status: TaskStatus::Pending
            }
        );
    }

    #[test]
    fn exhausts_at_budget() {
        let policy = RetryPolicy::new(3);
        let decision = policy.after_failure(2);
        assert_eq!(decision.retry_count, 3);
        assert_eq!(decision.status, TaskStatus::PermanentFailure);
    }

    #[test]
    fn exhausts_past_budget() {
        // retry_count can already sit at the budget if the budget was
        // lowered between runs; the task must not revive.
        let policy = RetryPolicy::new(2);
        assert_eq!(policy.after_failure(5).status, TaskStatus::PermanentFailure);
    }

    #[test]
    fn count_is_monotonic_over_any_sequence() {
        let policy = RetryPolicy::new(10);
        let mut count = 0;
        for _ in 0..25 {
            let decision = policy.after_failure(count);
            assert!(decision.retry_count > count);
            count = decision.retry_count;
        }
    }

    #[test]
    fn zero_budget_fails_on_first_attempt() {
        let policy = RetryPolicy::new(0);
        assert_eq!(policy.after_failure(0).status, TaskStatus::PermanentFailure);
    }
}
