//! Observable concurrency limiting for transfer part uploads/downloads.
//!
//! `nrp_http::HttpClientConfig::rate_limit` already bounds concurrent HTTP
//! requests inside one [`crate::Connection`]; this wraps a second, coarser
//! semaphore around whole *parts* (each part may itself issue one or more
//! HTTP requests via retry), so callers can cap how many parts are
//! in flight for a single transfer independent of the HTTP-layer limit.
//! Grounded in `modkit-http`'s `RateLimitConfig` (a plain semaphore, no
//! custom scheduling) generalized to expose the free-permit count for tests.

use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// A semaphore-backed limiter for concurrent transfer parts.
#[derive(Clone, Debug)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
}

impl Limiter {
    /// Create a limiter allowing up to `max_concurrent` parts in flight.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrent` is zero.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be nonzero");
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Acquire a permit, waiting if the limit is currently saturated.
    ///
    /// # Panics
    ///
    /// Panics if the underlying semaphore has been closed, which never
    /// happens for a `Limiter` since it never calls `close()`.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("limiter semaphore is never closed")
    }

    /// Number of permits currently available (for tests/observability).
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_reduces_available_permits() {
        let limiter = Limiter::new(2);
        assert_eq!(limiter.available_permits(), 2);
        let permit = limiter.acquire().await;
        assert_eq!(limiter.available_permits(), 1);
        drop(permit);
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test]
    async fn acquire_blocks_when_saturated() {
        let limiter = Limiter::new(1);
        let first = limiter.acquire().await;
        let limiter2 = limiter.clone();
        let mut fut = Box::pin(limiter2.acquire());
        assert!(
            futures_util::poll!(&mut fut).is_pending(),
            "second acquire should block while first permit is held"
        );
        drop(first);
        let _second = fut.await;
    }
}
