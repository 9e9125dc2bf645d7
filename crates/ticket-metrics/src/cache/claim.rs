//! In-flight recomputation claims
//!
//! A claim marks a key as being recomputed. The owner's work runs in a spawned
//! task; every caller that finds the claim awaits the same shared completion
//! future, so they all observe one result.

use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::entry::CacheEntry;
use crate::error::MetricsResult;

pub(crate) type Completion = Shared<BoxFuture<'static, MetricsResult<Arc<CacheEntry>>>>;

pub(crate) struct Claim {
    id: u64,
    /// Generation of the entry that was in the table when the claim started
    base_generation: Option<u64>,
    completion: Completion,
    started_at: Instant,
    stale_served: bool,
    invalidated: bool,
}

impl Claim {
    pub(crate) fn new(id: u64, base_generation: Option<u64>, completion: Completion) -> Self {
        Self {
            id,
            base_generation,
            completion,
            started_at: Instant::now(),
            stale_served: false,
            invalidated: false,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn base_generation(&self) -> Option<u64> {
        self.base_generation
    }

    pub(crate) fn completion(&self) -> Completion {
        self.completion.clone()
    }

    pub(crate) fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns true exactly once per claim.
    pub(crate) fn take_stale_serve(&mut self) -> bool {
        !std::mem::replace(&mut self.stale_served, true)
    }

    /// Flag the claim so its result is installed already stale.
    /// Returns true if the flag was newly set.
    pub(crate) fn invalidate(&mut self) -> bool {
        !std::mem::replace(&mut self.invalidated, true)
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn claim() -> Claim {
        let completion = async { Err(crate::error::MetricsError::internal("unused")) }
            .boxed()
            .shared();
        Claim::new(1, None, completion)
    }

    #[test]
    fn test_stale_serve_granted_once() {
        let mut claim = claim();
        assert!(claim.take_stale_serve());
        assert!(!claim.take_stale_serve());
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let mut claim = claim();
        assert!(!claim.is_invalidated());
        assert!(claim.invalidate());
        assert!(!claim.invalidate());
        assert!(claim.is_invalidated());
    }
}
