//! Bounded retry for optimistic-concurrency conflicts
//!
//! Wraps a whole transition attempt. Each attempt opens its own transaction
//! and reloads the row, so a retry observes the state the competing writer
//! committed. Only `VersionConflict` is retried; every other error, and a
//! conflict on the last attempt, surfaces to the caller.

use std::future::Future;
use std::time::Duration;

use crate::error::{ErrorCode, ServiceError, ServiceResult};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

pub async fn with_conflict_retry<T, F, Fut>(
    max_attempts: u32,
    backoff: Duration,
    mut op: F,
) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(ServiceError::App(err))
                if err.code == ErrorCode::VersionConflict && attempt < max_attempts =>
            {
                tracing::debug!(attempt, "Version conflict, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// [`with_conflict_retry`] with the default bounds.
pub async fn retry_transition<T, F, Fut>(op: F) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    with_conflict_retry(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_conflict_retry(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::conflict().into())
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_conflict() {
        let calls = AtomicU32::new(0);
        let result: ServiceResult<()> = with_conflict_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::conflict().into()) }
        })
        .await;
        match result {
            Err(ServiceError::App(err)) => assert_eq!(err.code, ErrorCode::VersionConflict),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ServiceResult<()> = with_conflict_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::new(ErrorCode::InsufficientStock).into()) }
        })
        .await;
        match result {
            Err(ServiceError::App(err)) => assert_eq!(err.code, ErrorCode::InsufficientStock),
            other => panic!("expected stock error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let result = with_conflict_retry(3, Duration::from_millis(1), || async { Ok("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }
}
