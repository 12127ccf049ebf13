//! Retry coordinator for supervised CLI invocations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;

use super::runner::{Invocation, ProcessOutput, ProcessRunner};
use crate::error::ProcessError;

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base delay; attempt `n` waits `delay * n` before the next try.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// A policy that runs exactly once.
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Total number of attempts, including the first.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }
}

/// Wraps a process runner with retry on transient failures.
///
/// Only a timeout that ended on the graceful-signal path is retried; every
/// other failure is returned on the attempt that produced it.
pub struct RetryWrapper {
    inner: Arc<dyn ProcessRunner>,
    policy: RetryPolicy,
}

impl RetryWrapper {
    pub fn new(inner: Arc<dyn ProcessRunner>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl ProcessRunner for RetryWrapper {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        let policy = self.policy;
        let attempts = policy.attempts();
        let backoff = (1..=policy.retries).map(move |n| policy.backoff(n));
        let mut attempt = 1;

        tracing::debug!(
            executable = %invocation.executable,
            attempts,
            "Running CLI invocation"
        );

        (|| self.inner.run(invocation))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(ProcessError::is_transient)
            .notify(|err: &ProcessError, wait: Duration| {
                tracing::warn!(
                    "Attempt {}/{} of '{}' failed ({}); retrying in {:?}",
                    attempt,
                    attempts,
                    invocation.executable,
                    err,
                    wait
                );
                attempt += 1;
            })
            .await
    }
}
