//! Retry engine
//!
//! An explicit loop over a [`RetryableOperation`]. Each attempt yields a
//! [`Classification`]; retries back off exponentially and give the operation
//! a chance to repair state (refresh a token, resynchronize a session) before
//! the next attempt.

use crate::error::VehicleError;
use crate::fault::{Classification, RetryReason};
use crate::wire::RoutableMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

/// Retry budget and backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_timeout: Duration,
    /// Upper bound on any single delay
    pub max_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_timeout: Duration::from_millis(1000),
            max_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_timeout
            .saturating_mul(1u32 << exponent)
            .min(self.max_timeout)
    }
}

/// One logical request that may be sent several times
#[async_trait]
pub trait RetryableOperation: Send {
    /// Perform attempt number `attempt` (1-based) and classify its outcome
    async fn attempt(&mut self, attempt: u32) -> Classification;

    /// Repair state before the next attempt; an error ends the loop
    async fn prepare_retry(&mut self, _reason: &RetryReason) -> Result<(), VehicleError> {
        Ok(())
    }
}

/// Drives a [`RetryableOperation`] under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryEngine {
    policy: RetryPolicy,
}

impl RetryEngine {
    /// Create an engine with `policy`
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy in force
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails terminally, or the budget runs out
    ///
    /// Attempts are strictly sequential. With `max_retries = n` at most `n + 1`
    /// attempts are made.
    pub async fn execute<O>(&self, operation: &mut O) -> Result<RoutableMessage, VehicleError>
    where
        O: RetryableOperation + ?Sized,
    {
        let mut retries: u32 = 0;
        loop {
            let attempt = retries + 1;
            let reason = match operation.attempt(attempt).await {
                Classification::Success(response) => return Ok(response),
                Classification::Fatal(err) => {
                    error!(attempt, error = %err, "Vehicle request failed");
                    return Err(err);
                }
                Classification::Retry(reason) => reason,
            };

            retries += 1;
            if retries > self.policy.max_retries {
                error!(attempt, reason = %reason, "Vehicle request out of retries");
                return Err(VehicleError::OutOfRetries {
                    attempts: attempt,
                    last: Box::new(reason.into_error()),
                });
            }

            let delay = self.policy.backoff_delay(retries);
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                reason = %reason,
                "Retrying vehicle request"
            );

            operation.prepare_retry(&reason).await?;
            tokio::time::sleep(delay).await;
        }
    }
}
