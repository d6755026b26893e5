//! Per-token send with retry and dead-token cleanup.

use std::time::Duration;

use {
    herald_config::PushConfig,
    herald_repository::Repository,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, histogram, labels, push as push_metrics};

use crate::{
    error::{DeliveryError, ErrorClass, PushError},
    gateway::PushGateway,
    payload::PushPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PushConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            base_backoff: config.base_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Delay before retry number `retry` (0-based): `min(base * 2^retry, max)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// How a token ended up when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    Delivered { attempts: u32 },
    /// The gateway rejected the token and it was removed.
    Unregistered { attempts: u32 },
}

/// Deliver `payload` to one device token.
///
/// Dead tokens are unregistered and reported as [`TokenOutcome::Unregistered`].
/// Retryable failures (including an attempt exceeding its timeout) are retried
/// with backoff until the attempt budget runs out.
pub async fn send_with_retry(
    gateway: &dyn PushGateway,
    repo: &dyn Repository,
    policy: &RetryPolicy,
    token: &str,
    payload: &PushPayload,
) -> Result<TokenOutcome, DeliveryError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(policy.attempt_timeout, gateway.send(token, payload))
            .await
            .unwrap_or(Err(PushError::Timeout));

        #[cfg(feature = "metrics")]
        {
            counter!(push_metrics::SEND_ATTEMPTS_TOTAL).increment(1);
            histogram!(push_metrics::SEND_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }

        let err = match result {
            Ok(()) => {
                debug!(attempt, "push delivered");
                return Ok(TokenOutcome::Delivered { attempts: attempt });
            },
            Err(err) => err,
        };

        match err.class() {
            ErrorClass::Unregister => {
                info!(error = %err, "unregistering rejected device token");
                repo.unregister_device(token)
                    .await
                    .map_err(DeliveryError::Unregister)?;
                #[cfg(feature = "metrics")]
                counter!(push_metrics::UNREGISTERED_TOTAL).increment(1);
                return Ok(TokenOutcome::Unregistered { attempts: attempt });
            },
            ErrorClass::Retry if attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt - 1);
                debug!(attempt, error = %err, ?delay, "push failed, retrying");
                tokio::time::sleep(delay).await;
            },
            ErrorClass::Retry => {
                warn!(attempts = attempt, error = %err, "push retries exhausted");
                return Err(DeliveryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            },
            ErrorClass::Abort => {
                warn!(attempt, error = %err, "push failed");
                return Err(DeliveryError::Rejected(err));
            },
        }
    }
}

/// Record a per-token result on the token outcome counter.
#[cfg(feature = "metrics")]
pub(crate) fn record_outcome(result: &Result<TokenOutcome, DeliveryError>) {
    let outcome = match result {
        Ok(TokenOutcome::Delivered { .. }) => "delivered",
        Ok(TokenOutcome::Unregistered { .. }) => "unregistered",
        Err(e) => e.kind(),
    };
    counter!(push_metrics::TOKENS_TOTAL, labels::OUTCOME => outcome).increment(1);
}
