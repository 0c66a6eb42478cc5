//! Global admission budget for concurrently running jobs.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps how many jobs run at once. A permit is held for the lifetime of a
/// job's task; dropping it frees the slot.
pub struct JobLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl JobLimiter {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        let max = max_concurrent_jobs.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Try to admit one job. `None` when the budget is exhausted.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_enforced() {
        let limiter = JobLimiter::new(2);
        let first = limiter.try_acquire().expect("slot 1");
        let second = limiter.try_acquire().expect("slot 2");
        assert!(limiter.try_acquire().is_none(), "budget exhausted");

        drop(first);
        assert_eq!(limiter.available(), 1);
        let third = limiter.try_acquire().expect("slot freed");
        drop(second);
        drop(third);
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn zero_budget_is_clamped_to_one() {
        let limiter = JobLimiter::new(0);
        assert_eq!(limiter.max(), 1);
        assert!(limiter.try_acquire().is_some());
    }
}
