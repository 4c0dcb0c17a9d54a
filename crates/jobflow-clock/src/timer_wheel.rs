use chrono::{DateTime, Utc};
use jobflow_types::{EventType, JournalEntry, PromiseId};
use std::collections::HashMap;

/// A timer that was scheduled but has not yet fired, as reconstructed from
/// a journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTimer {
    pub promise_id: PromiseId,
    pub fire_at: DateTime<Utc>,
}

/// Reconstructs the set of outstanding timers for an execution from its
/// journal, so that a restarted process can rearm them.
///
/// A timer is outstanding if it has a `TimerScheduled` entry and no
/// matching `TimerFired` entry. Timers whose `fire_at` has already passed
/// are still returned — `jobflow-engine` is responsible for firing those
/// immediately rather than scheduling a future wakeup, mirroring how a
/// `SystemClock`-backed `sleep_until` resolves instantly for a past
/// deadline.
#[derive(Debug, Default)]
pub struct TimerWheel;

impl TimerWheel {
    /// Scan `entries` and return every timer still awaiting its fire event.
    ///
    /// Scan complexity: O(n).
    pub fn recover(entries: &[JournalEntry]) -> Vec<PendingTimer> {
        let mut scheduled: HashMap<PromiseId, DateTime<Utc>> = HashMap::new();

        for entry in entries {
            match &entry.event {
                EventType::TimerScheduled {
                    promise_id,
                    fire_at,
                    ..
                } => {
                    scheduled.insert(promise_id.clone(), *fire_at);
                }
                EventType::TimerFired { promise_id } => {
                    scheduled.remove(promise_id);
                }
                _ => {}
            }
        }

        let mut pending: Vec<PendingTimer> = scheduled
            .into_iter()
            .map(|(promise_id, fire_at)| PendingTimer {
                promise_id,
                fire_at,
            })
            .collect();
        pending.sort_by_key(|t| t.fire_at);
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jobflow_types::{Codec, Payload};

    fn pid(tag: u8) -> PromiseId {
        PromiseId::new([tag; 32])
    }

    fn entry(sequence: u64, event: EventType) -> JournalEntry {
        JournalEntry {
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }

    fn started() -> EventType {
        EventType::ExecutionStarted {
            component_digest: vec![],
            input: Payload::new(vec![], Codec::Json),
            idempotency_key: "k".into(),
        }
    }

    #[test]
    fn recover_returns_timers_without_matching_fired() {
        let p1 = pid(1);
        let p2 = pid(2);
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(30);

        let entries = vec![
            entry(0, started()),
            entry(
                1,
                EventType::TimerScheduled {
                    promise_id: p1.clone(),
                    duration: Duration::seconds(10),
                    fire_at: t1,
                },
            ),
            entry(
                2,
                EventType::TimerScheduled {
                    promise_id: p2.clone(),
                    duration: Duration::seconds(30),
                    fire_at: t2,
                },
            ),
            entry(3, EventType::TimerFired { promise_id: p1 }),
        ];

        let pending = TimerWheel::recover(&entries);

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].promise_id, p2);
        assert_eq!(pending[0].fire_at, t2);
    }

    #[test]
    fn recover_is_empty_when_no_timers_scheduled() {
        let entries = vec![entry(0, started())];
        assert!(TimerWheel::recover(&entries).is_empty());
    }

    #[test]
    fn recover_sorts_pending_timers_by_fire_at() {
        let p1 = pid(1);
        let p2 = pid(2);
        let earlier = Utc::now();
        let later = earlier + Duration::minutes(5);

        let entries = vec![
            entry(0, started()),
            entry(
                1,
                EventType::TimerScheduled {
                    promise_id: p2.clone(),
                    duration: Duration::minutes(5),
                    fire_at: later,
                },
            ),
            entry(
                2,
                EventType::TimerScheduled {
                    promise_id: p1.clone(),
                    duration: Duration::seconds(0),
                    fire_at: earlier,
                },
            ),
        ];

        let pending = TimerWheel::recover(&entries);
        assert_eq!(pending[0].promise_id, p1);
        assert_eq!(pending[1].promise_id, p2);
    }
}
