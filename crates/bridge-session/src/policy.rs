//! Retry policies per operation class.
//!
//! Whether a failed call may be repeated depends on two things: is the
//! operation idempotent, and does the failure mean "not delivered" or "maybe
//! delivered". Each runner below encodes one answer to that question.

use std::{future::Future, time::Duration};

use bridge_core::{
    BridgeError, BridgeErrorCategory, ClientError, FailureKind, RetryPolicy, classify_client_error,
};
use tracing::{debug, warn};

use crate::guard::SessionGuard;

/// Upper bound on submissions of one code, whatever the policy allows.
pub const MAX_CODE_SUBMISSIONS: u32 = 2;

/// Run an idempotent read.
///
/// Connection-like failures drop the stale socket, wait `base * attempt`,
/// reconnect through the guard and try again, up to `max_attempts` calls in
/// total. Any other failure is returned immediately.
pub async fn retry_idempotent<T, F, Fut>(
    guard: &SessionGuard,
    policy: RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let result = match guard.ensure_ready().await {
            Ok(()) => call().await,
            Err(err) => Err(err),
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let kind = classify_client_error(&err);
        if !kind.is_transient_for_reads() {
            debug!(operation, error = %err, "read failed with non-connection error");
            return Err(BridgeError::from_client(&err));
        }
        if !policy.allows_retry_after(attempt) {
            return Err(BridgeError::new(
                BridgeErrorCategory::Network,
                "retries_exhausted",
                format!("{operation} failed after {attempt} attempts: {err}"),
            )
            .with_retry_after(policy.delay_for_attempt(attempt)));
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "connection lost during read; reconnecting"
        );
        guard.reset_connection();
        tokio::time::sleep(delay).await;
    }
}

/// Submit a one-time code.
///
/// The code may already have reached the server when the reply is lost, so:
/// an explicit rejection or an ambiguous send both end the attempt and ask
/// the host for a fresh code; only a failure that definitely happened before
/// delivery is retried, after a reconnect.
pub async fn submit_code<F, Fut>(
    guard: &SessionGuard,
    policy: RetryPolicy,
    connect_settle: Duration,
    mut submit: F,
) -> Result<(), BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ClientError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        if !guard.client().is_connected() {
            debug!("connection lost before code submission; reconnecting");
            guard
                .connect_with_retry(policy.delay_for_attempt(1))
                .await
                .map_err(|err| BridgeError::from_client(&err))?;
            tokio::time::sleep(connect_settle).await;
        }

        let err = match submit().await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        match classify_client_error(&err) {
            FailureKind::RejectedInput => {
                warn!(error = %err, "server rejected the code");
                return Err(BridgeError::new(
                    BridgeErrorCategory::Rejected,
                    "code_rejected",
                    err.to_string(),
                ));
            }
            FailureKind::AmbiguousDelivery => {
                warn!(error = %err, "code delivery unconfirmed; not resending");
                guard.reset_connection();
                return Err(BridgeError::new(
                    BridgeErrorCategory::AmbiguousDelivery,
                    "code_delivery_unconfirmed",
                    format!(
                        "{err}: connection dropped while submitting the code; \
                         request a new code and try again"
                    ),
                ));
            }
            FailureKind::Connection
                if attempt < MAX_CODE_SUBMISSIONS && policy.allows_retry_after(attempt) =>
            {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "connection error before code delivery; reconnecting"
                );
                guard.reset_connection();
                tokio::time::sleep(delay).await;
                guard.reconnect().await.map_err(|reconnect| {
                    BridgeError::new(
                        BridgeErrorCategory::Network,
                        "reconnect_failed",
                        format!("reconnection failed: {reconnect}"),
                    )
                    .with_retry_after(delay)
                })?;
                tokio::time::sleep(connect_settle).await;
            }
            _ => return Err(BridgeError::from_client(&err)),
        }
    }
}

/// Run a state-sensitive membership operation (join group/channel).
///
/// Connection or session failures trigger a full client cleanup and a
/// `base * attempt` pause before the next try; the last error is surfaced
/// once attempts run out.
pub async fn retry_membership<T, F, Fut>(
    guard: &SessionGuard,
    policy: RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let result = match guard.ensure_ready().await {
            Ok(()) => call().await,
            Err(err) => Err(err),
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let retryable = matches!(
            classify_client_error(&err),
            FailureKind::Connection | FailureKind::AmbiguousDelivery
        );
        if !retryable || !policy.allows_retry_after(attempt) {
            return Err(BridgeError::from_client(&err));
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "membership call failed; cleaning up client before retry"
        );
        guard.cleanup().await;
        tokio::time::sleep(delay).await;
    }
}
