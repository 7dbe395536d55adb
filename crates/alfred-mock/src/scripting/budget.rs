use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

const RUNNING: u8 = 0;
const COMMITTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Deadline and settlement of one hook invocation, shared by the caller and
/// the worker running it.
///
/// Exactly one side settles an invocation. The worker commits the script's
/// store writes before the deadline, or the caller abandons the invocation
/// and the writes are dropped.
#[derive(Debug)]
pub struct ScriptBudget {
    deadline: Instant,
    timeout_ms: u64,
    loop_iteration_limit: u64,
    state: AtomicU8,
}

impl ScriptBudget {
    /// A budget whose deadline starts counting now
    pub fn new(timeout_ms: u64, loop_iteration_limit: u64) -> Self {
        Self {
            deadline: Instant::now() + Duration::from_millis(timeout_ms),
            timeout_ms,
            loop_iteration_limit,
            state: AtomicU8::new(RUNNING),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn loop_iteration_limit(&self) -> u64 {
        self.loop_iteration_limit
    }

    /// Past the deadline, or given up by the caller
    pub fn is_exhausted(&self) -> bool {
        self.state.load(Ordering::Acquire) == ABANDONED || Instant::now() >= self.deadline
    }

    /// Claim the invocation for the worker. Fails once the budget is exhausted.
    pub fn try_commit(&self) -> bool {
        Instant::now() < self.deadline
            && self
                .state
                .compare_exchange(RUNNING, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Claim the invocation for the caller. False when the worker committed first.
    pub fn abandon(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_within_budget() {
        let budget = ScriptBudget::new(5000, 10);
        assert!(!budget.is_exhausted());
        assert!(budget.try_commit());
        assert!(!budget.abandon());
    }

    #[test]
    fn test_abandoned_budget_cannot_commit() {
        let budget = ScriptBudget::new(5000, 10);
        assert!(budget.abandon());
        assert!(budget.is_exhausted());
        assert!(!budget.try_commit());
    }

    #[test]
    fn test_expired_budget_cannot_commit() {
        let budget = ScriptBudget::new(0, 10);
        assert!(budget.is_exhausted());
        assert!(!budget.try_commit());
        assert!(budget.abandon());
    }
}
