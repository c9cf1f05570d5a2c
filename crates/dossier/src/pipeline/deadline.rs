use std::time::{Duration, Instant};

use crate::pipeline::error::PipelineError;

/// Wall-clock budget of one job attempt, fixed at job start and handed to
/// every stage.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> i64 {
        i64::try_from(self.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Fails with `Timeout` once the budget is spent. `stage` names the
    /// checkpoint in the error message.
    pub fn check(&self, stage: &str) -> Result<(), PipelineError> {
        if self.is_expired() {
            Err(PipelineError::Timeout {
                stage: stage.to_string(),
                elapsed: self.elapsed(),
                budget: self.budget,
            })
        } else {
            Ok(())
        }
    }

    /// Smaller of `limit` and what is left of the budget.
    pub fn cap(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline_has_budget() {
        let deadline = Deadline::start(Duration::from_secs(120));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(119));
        assert!(deadline.check("extracting").is_ok());
    }

    #[test]
    fn test_zero_budget_is_expired() {
        let deadline = Deadline::start(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        match deadline.check("analyzing") {
            Err(PipelineError::Timeout { stage, .. }) => assert_eq!(stage, "analyzing"),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_cap_uses_smaller_limit() {
        let deadline = Deadline::start(Duration::from_secs(10));
        assert_eq!(deadline.cap(Duration::from_secs(3)), Duration::from_secs(3));
        assert!(deadline.cap(Duration::from_secs(90)) <= Duration::from_secs(10));
    }

    #[test]
    fn test_expires_after_sleep() {
        let deadline = Deadline::start(Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(40));
        assert!(deadline.is_expired());
    }
}
