use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::DeliveryConfig;
use crate::transport::{TransportError, TransportErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailureKind {
    TransientNetwork,
    PayloadRejected,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    DeliveryFailed {
        kind: DeliveryFailureKind,
        detail: String,
    },
}

/// Attempt count and backoff schedule for outbound sends
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_base: f64,
    pub max_backoff: Duration,
    pub other_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            backoff_base: config.backoff_base,
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            other_backoff: Duration::from_secs(config.other_backoff_secs),
        }
    }

    /// Wait after a transient failure of 1-based `attempt`:
    /// `backoff_base ^ attempt` seconds, capped at `max_backoff`.
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base.powi(attempt as i32);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Run `operation` until it succeeds or the policy gives up.
///
/// Transient failures back off exponentially; unclassified failures back
/// off by the short fixed delay. When the server names a wait (flood
/// control), we never come back sooner than that. Payload rejections and permission errors
/// cannot be fixed by resending the same request, so they end the loop at
/// once and the caller picks a fallback.
pub async fn send_with_retries<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> DeliveryOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(_) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return DeliveryOutcome::Delivered;
            }
            Err(err) => err,
        };

        if err.kind.is_terminal() {
            warn!("{} rejected, not retrying: {}", label, err.detail);
            return failed(&err);
        }

        if attempt >= attempts {
            warn!("{} failed after {} attempts: {}", label, attempt, err.detail);
            return failed(&err);
        }

        let mut delay = if err.kind.is_transient() {
            policy.transient_delay(attempt)
        } else {
            policy.other_backoff
        };
        // A server-mandated wait is a floor, and is not subject to the cap.
        if let Some(after) = err.retry_after {
            delay = delay.max(after);
        }
        warn!(
            "{} attempt {}/{} failed ({:?}), retrying in {:.1}s",
            label,
            attempt,
            attempts,
            err.kind,
            delay.as_secs_f64()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn failed(err: &TransportError) -> DeliveryOutcome {
    let kind = match err.kind {
        TransportErrorKind::Network
        | TransportErrorKind::Timeout
        | TransportErrorKind::RateLimited => DeliveryFailureKind::TransientNetwork,
        TransportErrorKind::PayloadRejected => DeliveryFailureKind::PayloadRejected,
        TransportErrorKind::Permission | TransportErrorKind::Other => DeliveryFailureKind::Other,
    };
    DeliveryOutcome::DeliveryFailed {
        kind,
        detail: err.detail.clone(),
    }
}
