//! Time budget helpers shared by the frame codec, handshake and request pipeline

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{FinsError, FinsResult};

/// A fixed time budget started at construction
///
/// Every blocking phase that shares a budget draws from the same
/// `Deadline`, so connect + send + receive together never exceed it.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a budget of `budget` now
    pub fn after(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Time left before the budget is spent
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Run `fut` with whatever is left of the budget
    ///
    /// Expiry maps to [`FinsError::Timeout`] naming `operation`.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> FinsResult<T>
    where
        F: Future<Output = FinsResult<T>>,
    {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(FinsError::timeout(operation, self.budget));
        }
        match tokio::time::timeout(remaining, fut).await {
            Ok(result) => result,
            Err(_) => Err(FinsError::timeout(operation, self.budget)),
        }
    }
}

/// Format bytes as space separated hex for frame logging
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x46, 0x49, 0x4E, 0x53]), "46 49 4E 53");
        assert_eq!(hex_dump(&[]), "");
    }

    #[tokio::test]
    async fn test_deadline_run_times_out() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let result: FinsResult<()> = deadline
            .run("sleep", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        match result {
            Err(FinsError::Timeout { operation, timeout_ms }) => {
                assert_eq!(operation, "sleep");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_run_passes_result_through() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let value = deadline.run("ready", async { Ok(7u8) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() <= deadline.budget());
    }

    #[test]
    fn test_zero_budget_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
