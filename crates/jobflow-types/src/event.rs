use crate::execution_error::ExecutionError;
use crate::payload::Payload;
use crate::promise_id::PromiseId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Categorizes the type of side-effect invocation scheduled by a running
/// job-lifecycle workflow.
///
/// Extensible: new side-effect types are added as variants here, not as new
/// event types. All share the same 3-phase Scheduled -> Started -> Completed
/// structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeKind {
    /// A workflow-scheduled activity (`PriceJob`, `FindMatchingWorker`,
    /// `AssignWorker`, `ScheduleJob`, `ProcessJobPayment`, `RequestReviews`,
    /// `CloseJob`, ...).
    Activity,
}

/// Determines the wait satisfaction condition for `ExecutionAwaiting`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwaitKind {
    /// Wait for a single promise.
    Single,
    /// Wait for any one of the promises (selector semantics).
    Any,
    /// Wait for all promises.
    All,
    /// Wait for a named signal. `promise_id` is the single promise CF-4
    /// requires `waiting_on` to carry.
    Signal { name: String, promise_id: PromiseId },
}

/// Classifies which invoke error kinds should not be retried.
///
/// Mirrors `jobflow_payments::PaymentErrorKind` at the boundary: the engine
/// only needs to know whether a given failure short-circuits the retry
/// loop, not the full payment taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonRetryableKind {
    PermanentRejected,
    InvalidRequest,
    AlreadyApplied,
}

/// Retry policy for activity invocations.
///
/// Default mirrors the orchestrator's documented default: 1s initial
/// interval, 2x backoff, 60s max interval, 3 attempts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
    pub non_retryable_error_kinds: Vec<NonRetryableKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::seconds(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::seconds(60),
            max_attempts: 3,
            non_retryable_error_kinds: vec![
                NonRetryableKind::PermanentRejected,
                NonRetryableKind::InvalidRequest,
                NonRetryableKind::AlreadyApplied,
            ],
        }
    }
}

impl RetryPolicy {
    /// Interval before the given 1-indexed attempt, capped at `max_interval`.
    pub fn interval_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.backoff_coefficient.powi(exponent);
        let millis = (self.initial_interval.num_milliseconds() as f64 * scaled) as i64;
        Duration::milliseconds(millis).min(self.max_interval)
    }

    /// Whether `attempts_made` has exhausted this policy's attempt budget.
    pub fn exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

/// Monotonic per-signal-name delivery counter.
pub type SignalDeliveryId = u64;

/// All journal event types for a job's lifecycle execution, grouped by
/// category.
///
/// Each category satisfies a distinct formal correctness property enforced
/// by `jobflow_journal::invariants`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    // ── Category 1: Lifecycle (Soundness) ──
    /// Always the first event of an execution. Pins the job's lifecycle run
    /// to a specific workflow-definition digest, so a later engine upgrade
    /// can refuse to replay a history it no longer knows how to interpret.
    ExecutionStarted {
        component_digest: Vec<u8>,
        input: Payload,
        idempotency_key: String,
    },
    /// Workflow function returned Ok (terminal). For the job lifecycle this
    /// is the job reaching `Closed` with escrow fully settled.
    ExecutionCompleted { result: Payload },
    /// Workflow function returned Err or panicked (terminal).
    ExecutionFailed { error: ExecutionError },
    /// External cancel signal arrived (a client or worker requested the job
    /// be cancelled). Transitions to Cancelling.
    CancelRequested { reason: String },
    /// Cancellation finalized after cleanup (terminal, e.g. refund issued).
    /// Requires preceding CancelRequested.
    ExecutionCancelled { reason: String },

    // ── Category 2: Side Effects (Replay Correctness) ──
    // 3-phase pattern: Scheduled → Started → Completed
    /// Intent to invoke an activity (price, match, assign, schedule, charge,
    /// ...). Enables exactly-once via replay matching.
    InvokeScheduled {
        promise_id: PromiseId,
        kind: InvokeKind,
        function_name: String,
        input: Payload,
        retry_policy: Option<RetryPolicy>,
    },
    /// Invocation is in-flight. Enables timeout detection.
    InvokeStarted { promise_id: PromiseId, attempt: u32 },
    /// Invocation result. Cached for replay.
    InvokeCompleted {
        promise_id: PromiseId,
        result: Payload,
        attempt: u32,
    },
    /// Transient failure, will retry.
    InvokeRetrying {
        promise_id: PromiseId,
        failed_attempt: u32,
        error: ExecutionError,
        retry_at: DateTime<Utc>,
    },

    // ── Category 3: Control Flow (State Reconstruction) ──
    /// `sleep(duration)` called. Records both the requested duration and computed fire time.
    TimerScheduled {
        promise_id: PromiseId,
        duration: Duration,
        fire_at: DateTime<Utc>,
    },
    /// Timer duration elapsed. Resolves the timer's promise_id.
    TimerFired { promise_id: PromiseId },
    /// External signal arrived at execution (worker confirmed completion,
    /// client confirmed completion, a cancellation request, a payment
    /// webhook). Durable buffer — no promise_id.
    SignalDelivered {
        signal_name: String,
        payload: Payload,
        delivery_id: SignalDeliveryId,
    },
    /// Workflow consumed signal via await_signal(). Carries promise_id for replay cache.
    SignalReceived {
        promise_id: PromiseId,
        signal_name: String,
        payload: Payload,
        delivery_id: SignalDeliveryId,
    },
    /// Workflow blocks on pending promises (e.g. waiting on both the
    /// worker's and the client's completion confirmation).
    ExecutionAwaiting {
        waiting_on: Vec<PromiseId>,
        kind: AwaitKind,
    },
    /// Blocked → Running. Wait condition satisfied.
    ExecutionResumed,

    // ── Category 4: Continuation (History Bounding) ──
    /// Workflow restarted itself with fresh history, preserving identity.
    /// Used to hand a stuck job off from `run_lifecycle` into the bounded
    /// `run_payment_retry` continuation without growing one unbounded
    /// history.
    WorkflowContinuedAsNew {
        next_input: Payload,
        carryover: Payload,
    },
}

impl EventType {
    /// Returns the variant name as a static string for error messages and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecutionStarted { .. } => "ExecutionStarted",
            Self::ExecutionCompleted { .. } => "ExecutionCompleted",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
            Self::CancelRequested { .. } => "CancelRequested",
            Self::ExecutionCancelled { .. } => "ExecutionCancelled",
            Self::InvokeScheduled { .. } => "InvokeScheduled",
            Self::InvokeStarted { .. } => "InvokeStarted",
            Self::InvokeCompleted { .. } => "InvokeCompleted",
            Self::InvokeRetrying { .. } => "InvokeRetrying",
            Self::TimerScheduled { .. } => "TimerScheduled",
            Self::TimerFired { .. } => "TimerFired",
            Self::SignalDelivered { .. } => "SignalDelivered",
            Self::SignalReceived { .. } => "SignalReceived",
            Self::ExecutionAwaiting { .. } => "ExecutionAwaiting",
            Self::ExecutionResumed => "ExecutionResumed",
            Self::WorkflowContinuedAsNew { .. } => "WorkflowContinuedAsNew",
        }
    }

    /// Whether this event ends the execution (Completed, Failed, or Cancelled).
    ///
    /// `WorkflowContinuedAsNew` is deliberately excluded: the execution
    /// identity survives into the next history, it does not close out.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted { .. }
                | Self::ExecutionFailed { .. }
                | Self::ExecutionCancelled { .. }
        )
    }
}
