//! Deployment-time knobs for the lifecycle workflow (§6). Fee figures live
//! in `jobflow_payments::FeeSchedule`; everything timing-related lives here.

use chrono::Duration;
use jobflow_payments::FeeSchedule;

#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowConfig {
    pub fee_schedule: FeeSchedule,
    pub offer_response_timeout: Duration,
    pub worker_match_max_attempts: u32,
    pub worker_match_backoff_unit: Duration,
    pub review_timeout: Duration,
    pub authorization_validity: Duration,
    /// Backoff before the first payment capture retry; doubles each attempt.
    pub payment_retry_initial_backoff: Duration,
    /// Ceiling a single payment retry backoff is clamped to.
    pub payment_retry_max_backoff: Duration,
    /// Total wall-clock window the retry loop runs before giving up and
    /// voiding the authorization (§4.6's `PaymentRetryWorkflow`).
    pub payment_retry_budget: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            fee_schedule: FeeSchedule::default(),
            offer_response_timeout: Duration::hours(24),
            worker_match_max_attempts: 5,
            worker_match_backoff_unit: Duration::minutes(5),
            review_timeout: Duration::days(7),
            authorization_validity: Duration::days(7),
            payment_retry_initial_backoff: Duration::minutes(10),
            payment_retry_max_backoff: Duration::hours(4),
            payment_retry_budget: Duration::hours(24),
        }
    }
}

impl WorkflowConfig {
    /// Backoff before worker-match attempt `attempt` (1-indexed): `5 * attempt` minutes.
    pub fn worker_match_backoff(&self, attempt: u32) -> Duration {
        self.worker_match_backoff_unit * attempt as i32
    }

    /// Backoff before payment retry attempt `attempt` (1-indexed):
    /// `initial * 2^(attempt - 1)`, clamped to `payment_retry_max_backoff`,
    /// plus up to 10% jitter so a fleet of stuck jobs doesn't retry in lockstep.
    pub fn payment_retry_backoff(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let doubled = self.payment_retry_initial_backoff * 2i32.saturating_pow(attempt.saturating_sub(1));
        let capped = doubled.min(self.payment_retry_max_backoff);
        let jitter_millis = (capped.num_milliseconds() as f64) * jitter_fraction.clamp(0.0, 1.0) * 0.1;
        capped + Duration::milliseconds(jitter_millis as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_match_backoff_scales_with_attempt() {
        let config = WorkflowConfig::default();
        assert_eq!(config.worker_match_backoff(1), Duration::minutes(5));
        assert_eq!(config.worker_match_backoff(5), Duration::minutes(25));
    }

    #[test]
    fn payment_retry_backoff_doubles_then_clamps() {
        let config = WorkflowConfig::default();
        assert_eq!(config.payment_retry_backoff(1, 0.0), Duration::minutes(10));
        assert_eq!(config.payment_retry_backoff(2, 0.0), Duration::minutes(20));
        assert_eq!(config.payment_retry_backoff(10, 0.0), config.payment_retry_max_backoff);
    }

    #[test]
    fn payment_retry_backoff_jitter_only_adds_time() {
        let config = WorkflowConfig::default();
        let base = config.payment_retry_backoff(2, 0.0);
        let jittered = config.payment_retry_backoff(2, 1.0);
        assert!(jittered > base);
        assert!(jittered <= base + Duration::milliseconds(base.num_milliseconds() / 10 + 1));
    }
}
