//! Policy-driven retries for remote calls.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::ui::prelude::{Level, emit};

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Errors that know whether trying again can help.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

pub trait Backoff: Send + Sync + fmt::Debug {
    /// Delay before attempt `attempt + 1`, given that `attempt` just failed.
    fn delay(&self, attempt: u32) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `None` retries transient failures forever.
    max_attempts: Option<u32>,
    backoff: Arc<dyn Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Some(DEFAULT_MAX_ATTEMPTS),
            FixedBackoff::new(DEFAULT_BACKOFF),
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: Option<u32>, backoff: impl Backoff + 'static) -> Self {
        Self {
            max_attempts: max_attempts.map(|n| n.max(1)),
            backoff: Arc::new(backoff),
        }
    }

    /// Config form: `max_attempts = 0` means unbounded.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let limit = (max_attempts > 0).then_some(max_attempts);
        Self::new(limit, FixedBackoff::new(delay))
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. The closure receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && self.allows(attempt + 1) => {
                    let delay = self.backoff.delay(attempt);
                    emit(
                        Level::Warn,
                        "dub.retry.scheduled",
                        &format!(
                            "{label} failed on attempt {attempt}: {err}. Retrying in {}s...",
                            delay.as_secs()
                        ),
                        Some(serde_json::json!({
                            "label": label,
                            "attempt": attempt,
                            "delay_secs": delay.as_secs_f64(),
                        })),
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
