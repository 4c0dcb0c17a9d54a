//! Worker-matching boundary (`FindMatchingWorker`, §4.6).
//!
//! Candidate search against the worker pool (geo radius, category,
//! availability) lives outside this repo; `WorkerMatcher` is the seam a real
//! implementation plugs into, the same way `jobflow_payments::PaymentProcessor`
//! is the seam for the payment rail.

use async_trait::async_trait;
use jobflow_types::{Job, UserId};

#[async_trait]
pub trait WorkerMatcher: Send + Sync {
    /// Looks for one available worker for `job`. `None` means no match was
    /// found on this attempt, not that none will ever be found — the
    /// lifecycle workflow retries per `WorkflowConfig::worker_match_backoff`.
    async fn find_match(&self, job: &Job) -> Option<UserId>;
}

/// Matcher that always reports no availability. Useful as a safe default
/// and for exercising the `no_worker_available` exhaustion path in tests.
#[derive(Default)]
pub struct NullMatcher;

#[async_trait]
impl WorkerMatcher for NullMatcher {
    async fn find_match(&self, _job: &Job) -> Option<UserId> {
        None
    }
}
