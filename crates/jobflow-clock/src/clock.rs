use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Source of wall-clock time and durable sleeps for a workflow execution.
///
/// Every `now()`/`sleep_until()` call a workflow function makes is a
/// nondeterminism boundary: the value must be captured once (live) and
/// replayed verbatim thereafter (recovery), exactly as
/// `jobflow_journal`'s `ReplayCache` replays `InvokeCompleted` results.
/// `jobflow-engine`'s `WorkflowCtx` is the only caller — workflow code never
/// touches a `Clock` directly.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend until `deadline`. Returns immediately if `deadline` has
    /// already passed.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Live clock backed by the OS. Used for executions that are actually
/// running, as opposed to being replayed from history.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let now = Utc::now();
        if deadline <= now {
            return;
        }
        let remaining = (deadline - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(remaining).await;
    }
}

/// Clock that answers from a pre-recorded sequence of timestamps instead of
/// the OS, so that replaying a journal reproduces the exact `now()` values
/// and timer fire times the original execution observed.
///
/// Values are consumed in the same order the live execution recorded them
/// (`TimerFired` journal entries, in sequence order). A `sleep_until` call
/// during replay never actually sleeps — it resolves the instant the
/// matching `TimerFired` entry is popped.
pub struct ReplayClock {
    recorded: Mutex<VecDeque<DateTime<Utc>>>,
}

impl ReplayClock {
    /// Build a replay clock from the timestamps recorded during the
    /// original execution, in the order they were produced.
    pub fn new(recorded: Vec<DateTime<Utc>>) -> Self {
        Self {
            recorded: Mutex::new(recorded.into()),
        }
    }

    fn pop(&self) -> DateTime<Utc> {
        self.recorded
            .lock()
            .expect("ReplayClock mutex poisoned")
            .pop_front()
            .expect(
                "replay nondeterminism: workflow made more now()/sleep_until() calls than the journal recorded",
            )
    }

    /// Number of recorded timestamps not yet consumed. Used by callers to
    /// detect that replay finished short of the live execution's history.
    pub fn remaining(&self) -> usize {
        self.recorded.lock().expect("ReplayClock mutex poisoned").len()
    }
}

#[async_trait]
impl Clock for ReplayClock {
    fn now(&self) -> DateTime<Utc> {
        self.pop()
    }

    async fn sleep_until(&self, _deadline: DateTime<Utc>) {
        self.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_clock_sleep_until_past_deadline_returns_immediately() {
        let clock = SystemClock;
        let past = Utc::now() - chrono::Duration::seconds(10);
        clock.sleep_until(past).await;
    }

    #[tokio::test]
    async fn replay_clock_pops_recorded_values_in_order() {
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(5);
        let clock = ReplayClock::new(vec![t1, t2]);

        assert_eq!(clock.now(), t1);
        assert_eq!(clock.remaining(), 1);
        assert_eq!(clock.now(), t2);
        assert_eq!(clock.remaining(), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "replay nondeterminism")]
    async fn replay_clock_panics_when_exhausted() {
        let clock = ReplayClock::new(vec![]);
        clock.now();
    }

    #[tokio::test]
    async fn replay_clock_sleep_until_does_not_block() {
        let far_future = Utc::now() + chrono::Duration::days(365);
        let clock = ReplayClock::new(vec![far_future]);
        clock.sleep_until(far_future).await;
    }
}
