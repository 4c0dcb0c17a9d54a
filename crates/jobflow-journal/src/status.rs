use std::collections::HashSet;

use jobflow_types::{AwaitKind, EventType, ExecutionStatus, JournalEntry, PromiseId};

/// Derive a job's current execution status by replaying its journal events left-to-right.
///
/// This is the canonical recovery path: when the server restarts, load the
/// persisted history for a job and fold it into the latest `ExecutionStatus`
/// to decide whether it needs to be resumed into `run_lifecycle` or
/// `run_payment_retry`.
///
/// Complexity: O(n) over `entries.len()`.
///
/// Precondition: journal invariants are enforced upstream (S-2 guarantees the
/// first event is `ExecutionStarted`), so an empty journal is treated as misuse.
pub fn derive_status(entries: &[JournalEntry]) -> ExecutionStatus {
    debug_assert!(
        !entries.is_empty(),
        "derive_status expects non-empty journal (S-2: starts_with_started)"
    );
    debug_assert!(
        matches!(
            entries.first().map(|e| &e.event),
            Some(EventType::ExecutionStarted { .. })
        ),
        "S-2 violated: first event must be ExecutionStarted"
    );
    entries
        .iter()
        .fold(ExecutionStatus::Running, |status, entry| {
            derive_next_status(status, &entry.event)
        })
}

/// Apply a single-event status transition.
///
/// Use this in append-time paths where status is already known and a new event
/// arrives; this gives O(1) incremental updates instead of re-folding the journal.
///
/// Semantics match one step of `derive_status`: events that do not affect status
/// return the previous `current_status` unchanged.
pub(crate) fn derive_next_status(
    current_status: ExecutionStatus,
    event_type: &EventType,
) -> ExecutionStatus {
    match event_type {
        EventType::ExecutionStarted { .. } => ExecutionStatus::Running,
        EventType::ExecutionAwaiting { waiting_on, kind } => ExecutionStatus::Blocked {
            waiting_on: waiting_on.clone(),
            kind: kind.clone(),
        },
        EventType::ExecutionResumed => ExecutionStatus::Running,
        EventType::CancelRequested { .. } => ExecutionStatus::Cancelling,
        EventType::ExecutionCancelled { .. } => ExecutionStatus::Cancelled,
        EventType::ExecutionCompleted { .. } => ExecutionStatus::Completed,
        EventType::ExecutionFailed { .. } => ExecutionStatus::Failed,
        _ => current_status,
    }
}

/// Collect promise IDs that have produced a completed/cached result in the journal.
///
/// This is the resolver set used to populate the replay cache:
/// - `InvokeCompleted` (an activity — price, match, assign, schedule, charge — finished)
/// - `TimerFired` (a scheduled sleep, e.g. the review window, elapsed)
/// - `SignalReceived` (the workflow consumed a worker/client confirmation or cancellation signal)
///
/// Intended use:
/// - Replay/cache population and inspection.
pub fn completed_promises(entries: &[JournalEntry]) -> HashSet<PromiseId> {
    entries
        .iter()
        .filter_map(|entry| match &entry.event {
            EventType::InvokeCompleted { promise_id, .. } => Some(promise_id.clone()),
            EventType::TimerFired { promise_id } => Some(promise_id.clone()),
            EventType::SignalReceived { promise_id, .. } => Some(promise_id.clone()),
            _ => None,
        })
        .collect()
}

/// Returns the resolver set used for wait satisfaction in `can_resume`.
///
/// Identical to [`completed_promises`] today — kept as a distinct name
/// because the two sets have historically diverged (e.g. when a journal
/// category produced a cached value without being wait-satisfying) and
/// `can_resume` should not need to change if that happens again.
pub fn wait_resolvers(entries: &[JournalEntry]) -> HashSet<PromiseId> {
    completed_promises(entries)
}

/// Returns whether a job blocked on worker/client confirmation (or any other
/// pending promise) can resume, based on resolved promises.
///
/// `resolved` should be the resolver set for wait satisfaction:
/// - InvokeCompleted
/// - TimerFired
/// - SignalReceived
///
/// For non-blocked statuses, this returns `false`.
pub fn can_resume(status: &ExecutionStatus, resolved: &HashSet<PromiseId>) -> bool {
    match status {
        ExecutionStatus::Blocked { waiting_on, kind } => match kind {
            AwaitKind::Single | AwaitKind::All => {
                waiting_on.iter().all(|pid| resolved.contains(pid))
            }
            AwaitKind::Any => waiting_on.iter().any(|pid| resolved.contains(pid)),
            AwaitKind::Signal { .. } => {
                debug_assert_eq!(
                    waiting_on.len(),
                    1,
                    "CF-4 violated: AwaitKind::Signal must have exactly one waiting_on promise"
                );
                if waiting_on.len() != 1 {
                    return false;
                }
                resolved.contains(&waiting_on[0])
            }
        },
        _ => false,
    }
}
