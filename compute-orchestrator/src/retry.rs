//! Retry wrapper for control-plane calls.
//!
//! Failures are reduced to an HTTP-style code first: timeouts become 504 and
//! anything without a code becomes 500. Codes >= 500 and 429 are retried with
//! exponential backoff; every other code fails immediately.

use crate::control_plane::{RemoteFailure, RemoteResult};
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TIMEOUT_CODE: u16 = 504;
pub const UNKNOWN_FAILURE_CODE: u16 = 500;
pub const TOO_MANY_REQUESTS: u16 = 429;
pub const NOT_FOUND: u16 = 404;

/// How a call is used, which only changes how failures are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    /// Read issued while polling a resource that may not exist yet. A 404 is
    /// expected and logged quietly.
    Poll,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

pub fn failure_code(failure: &RemoteFailure) -> u16 {
    match failure {
        RemoteFailure::Status { code, .. } => *code,
        RemoteFailure::Timeout(_) => TIMEOUT_CODE,
        RemoteFailure::Connect(_) | RemoteFailure::Other(_) => UNKNOWN_FAILURE_CODE,
    }
}

pub fn is_retryable(code: u16) -> bool {
    code >= 500 || code == TOO_MANY_REQUESTS
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails permanently, or runs out of
    /// attempts. `operation` names the call in logs and errors.
    pub async fn execute<T, F, Fut>(&self, kind: CallKind, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match call().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            let code = failure_code(&failure);
            if !is_retryable(code) {
                return Err(permanent_failure(kind, operation, code, failure));
            }

            if attempt >= max_attempts {
                warn!(
                    operation,
                    code,
                    attempts = attempt,
                    error = %failure,
                    "control plane call failed after retries"
                );
                return Err(OrchestratorError::RemoteUnavailable {
                    code,
                    attempts: attempt,
                    message: failure.message().to_string(),
                });
            }

            let delay = self.policy.backoff_for(attempt);
            info!(
                operation,
                code,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying control plane call"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn permanent_failure(
    kind: CallKind,
    operation: &str,
    code: u16,
    failure: RemoteFailure,
) -> OrchestratorError {
    if code == NOT_FOUND && kind == CallKind::Poll {
        debug!(operation, "resource not found yet");
    } else {
        warn!(operation, code, error = %failure, "control plane call failed");
    }

    let message = match failure {
        RemoteFailure::Status { message, .. }
        | RemoteFailure::Timeout(message)
        | RemoteFailure::Connect(message)
        | RemoteFailure::Other(message) => message,
    };
    if code == NOT_FOUND {
        OrchestratorError::NotFound(format!("{operation}: {message}"))
    } else {
        OrchestratorError::Remote { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn run_failing(failure: RemoteFailure, kind: CallKind) -> (Result<()>, u32) {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::immediate(3));
        let result = executor
            .execute(kind, "test_call", || {
                calls.fetch_add(1, Ordering::SeqCst);
                let failure = failure.clone();
                async move { Err::<(), _>(failure) }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_service_unavailable_retried_to_max_attempts() {
        let (result, calls) =
            run_failing(RemoteFailure::status(503, "down"), CallKind::Mutation).await;
        assert_eq!(calls, 3);
        match result.unwrap_err() {
            OrchestratorError::RemoteUnavailable {
                code,
                attempts,
                message,
            } => {
                assert_eq!(code, 503);
                assert_eq!(attempts, 3);
                assert_eq!(message, "down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_request_never_retried() {
        let (result, calls) =
            run_failing(RemoteFailure::status(400, "bad disk size"), CallKind::Mutation).await;
        assert_eq!(calls, 1);
        assert!(matches!(
            result.unwrap_err(),
            OrchestratorError::Remote { code: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_timeout_treated_as_gateway_timeout() {
        let (result, calls) =
            run_failing(RemoteFailure::Timeout("read timed out".into()), CallKind::Read).await;
        assert_eq!(calls, 3);
        assert_eq!(result.unwrap_err().status_code(), Some(504));
    }

    #[tokio::test]
    async fn test_too_many_requests_is_retried() {
        let (_, calls) = run_failing(RemoteFailure::status(429, "slow down"), CallKind::Read).await;
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_not_found_during_poll() {
        let (result, calls) =
            run_failing(RemoteFailure::status(404, "no such runtime"), CallKind::Poll).await;
        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy::immediate(3));
        let value = executor
            .execute(CallKind::Read, "flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RemoteFailure::Connect("refused".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(3));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(3));
    }

    #[test]
    fn test_failure_codes() {
        assert_eq!(failure_code(&RemoteFailure::status(409, "")), 409);
        assert_eq!(failure_code(&RemoteFailure::Timeout(String::new())), 504);
        assert_eq!(failure_code(&RemoteFailure::Other(String::new())), 500);
        assert!(is_retryable(500));
        assert!(is_retryable(429));
        assert!(!is_retryable(403));
    }
}
