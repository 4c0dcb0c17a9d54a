use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jobflow_clock::Clock;
use jobflow_journal::{InvariantState, ReplayCache};
use jobflow_types::{
    AwaitKind, Codec, ErrorKind, EventType, ExecutionError, ExecutionId, InvokeKind, JournalEntry,
    Payload, PromiseId, RetryPolicy, SignalDeliveryId,
};
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::scheduler::SchedulerCommand;

/// Derives the idempotency key an activity invocation presents to
/// downstream adapters (the payment processor's `tokenize`/`authorize`/
/// `capture`/`refund` calls, in particular).
///
/// `(execution_id, event_seq, activity_name)` is stable across replay: the
/// same activity call always lands at the same journal sequence number for
/// a given execution, so retrying the call after a crash reuses the same
/// key and the processor's own idempotency guarantee takes over.
pub fn activity_idempotency_key(
    execution_id: &ExecutionId,
    event_seq: u64,
    activity_name: &str,
) -> String {
    format!("{execution_id}:{event_seq}:{activity_name}")
}

/// Encode a workflow input/output/signal value as a JSON [`Payload`].
pub fn encode_json<T: serde::Serialize>(value: &T) -> Payload {
    let bytes = serde_json::to_vec(value).expect("workflow payload must serialize");
    Payload::new(bytes, Codec::Json)
}

/// Decode a JSON [`Payload`] back into a typed value.
pub fn decode_json<T: serde::de::DeserializeOwned>(payload: &Payload) -> Result<T, ExecutionError> {
    serde_json::from_slice(&payload.bytes).map_err(|e| {
        ExecutionError::new(ErrorKind::Uncategorized, format!("payload decode failed: {e}"))
    })
}

/// A pending inbound signal delivery, buffered until the workflow consumes
/// it via [`WorkflowCtx::signal_channel`].
///
/// A delivery for a name nobody is currently waiting on (or a second
/// delivery that arrives while `signal_or_timeout` is racing a different
/// name) sits here until the workflow asks for it by name.
struct SignalInbox {
    queues: HashMap<String, VecDeque<Payload>>,
    delivery_counters: HashMap<String, SignalDeliveryId>,
}

impl SignalInbox {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
            delivery_counters: HashMap::new(),
        }
    }

    fn next_delivery_id(&mut self, name: &str) -> SignalDeliveryId {
        let counter = self.delivery_counters.entry(name.to_string()).or_insert(0);
        let id = *counter;
        *counter += 1;
        id
    }

    fn push(&mut self, name: &str, payload: Payload) {
        self.queues.entry(name.to_string()).or_default().push_back(payload);
    }

    fn pop(&mut self, name: &str) -> Option<Payload> {
        self.queues.get_mut(name).and_then(VecDeque::pop_front)
    }
}

/// The deterministic context a job-lifecycle workflow function runs against.
///
/// `WorkflowCtx` hands a plain async Rust function (`run_lifecycle`,
/// `run_payment_retry`) a handle that turns every side effect
/// (`execute_activity`, `sleep`, `signal_channel`) into journal entries
/// using exactly the event shapes `jobflow_journal::invariants` enforces.
///
/// On replay, a `WorkflowCtx` is seeded with the execution's prior history;
/// side effects already present in that history are served from the
/// `ReplayCache` instead of being re-run, so a workflow function can be
/// re-executed from the top and reach bit-identical decisions.
pub struct WorkflowCtx {
    execution_id: ExecutionId,
    clock: Arc<dyn Clock>,
    replay_cache: ReplayCache,
    /// Results completed during *this* run, not yet reflected in
    /// `replay_cache` (which is frozen at construction time from history).
    live_results: HashMap<PromiseId, Payload>,
    invariants: InvariantState,
    next_seq: u64,
    next_child_seq: u32,
    new_entries: Vec<JournalEntry>,
    signal_inbox: SignalInbox,
}

/// Placeholder workflow-definition digest until the engine supports more
/// than one versioned workflow set; pins every execution's
/// `ExecutionStarted` to the same value.
const ENGINE_COMPONENT_DIGEST: &[u8] = b"jobflow-engine-v1";

impl WorkflowCtx {
    /// Build a context for an execution, seeding replay state from any
    /// prior history.
    ///
    /// `genesis_input` is only consulted when `history` is empty: a
    /// brand-new execution's journal must start with `ExecutionStarted`
    /// (S-2), so this synthesizes that entry as the context's first append,
    /// recording `genesis_input` as its payload. Replay/resume contexts
    /// (non-empty `history`) already have that entry on record and ignore
    /// the argument.
    pub fn new(
        execution_id: ExecutionId,
        clock: Arc<dyn Clock>,
        history: &[JournalEntry],
        genesis_input: Payload,
    ) -> Self {
        let mut invariants = InvariantState::new();
        for entry in history {
            // History was already validated when it was first appended;
            // re-validating here would reject nothing new, so only state
            // is replayed, not the check itself.
            let _ = invariants.check_append(entry);
        }
        let is_genesis = history.is_empty();
        let mut ctx = Self {
            execution_id,
            clock,
            replay_cache: ReplayCache::build(history),
            live_results: HashMap::new(),
            invariants,
            next_seq: history.len() as u64,
            next_child_seq: 0,
            new_entries: Vec::new(),
            signal_inbox: SignalInbox::new(),
        };
        if is_genesis {
            let idempotency_key = format!("start:{}", ctx.execution_id);
            ctx.append(EventType::ExecutionStarted {
                component_digest: ENGINE_COMPONENT_DIGEST.to_vec(),
                input: genesis_input,
                idempotency_key,
            })
            .expect("genesis ExecutionStarted satisfies S-1/S-2 on a fresh context");
        }
        ctx
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// The journal sequence the next appended entry will receive. Callers
    /// use this to derive a stable [`activity_idempotency_key`] for a
    /// side effect before it's scheduled — stable across retries of the
    /// same attempt, since retrying doesn't append a fresh `InvokeScheduled`.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq
    }

    /// The deterministic current time: the replay clock during replay, wall
    /// clock otherwise. Workflow functions that need "now" for anything
    /// other than a `sleep`/`execute_activity` deadline read it from here
    /// rather than calling `chrono::Utc::now()` directly, which would
    /// diverge between the original run and a later replay.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Drain the journal entries produced since construction, for the
    /// caller (`ExecutionScheduler`) to persist via the job store.
    pub fn take_new_entries(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.new_entries)
    }

    fn allocate_promise(&mut self) -> PromiseId {
        let seq = self.next_child_seq;
        self.next_child_seq += 1;
        self.execution_id
            .child(seq)
            .expect("workflow call tree exceeded MAX_CALL_DEPTH")
    }

    /// Result of a completed invocation, whether it was replayed from
    /// history or completed earlier in this same run.
    fn completed_result(&self, promise_id: &PromiseId) -> Option<&Payload> {
        self.live_results
            .get(promise_id)
            .or_else(|| self.replay_cache.get_invoke(promise_id))
    }

    fn append(&mut self, event: EventType) -> Result<u64, RuntimeError> {
        if let EventType::InvokeCompleted {
            promise_id, result, ..
        } = &event
        {
            self.live_results.insert(promise_id.clone(), result.clone());
        }
        let entry = JournalEntry {
            sequence: self.next_seq,
            timestamp: Utc::now(),
            event,
        };
        self.invariants.check_append(&entry)?;
        let seq = entry.sequence;
        self.next_seq += 1;
        self.new_entries.push(entry);
        Ok(seq)
    }

    /// Feed an externally delivered signal into the inbox. Called by the
    /// scheduler when a `SendSignal` command arrives for this execution.
    pub fn deliver_signal(&mut self, name: &str, payload: Payload) -> Result<(), RuntimeError> {
        let delivery_id = self.signal_inbox.next_delivery_id(name);
        self.append(EventType::SignalDelivered {
            signal_name: name.to_string(),
            payload: payload.clone(),
            delivery_id,
        })?;
        self.signal_inbox.push(name, payload);
        Ok(())
    }

    /// Run `activity` as a tracked side effect, retrying on failure
    /// according to `retry_policy` (default policy if `None`).
    ///
    /// On replay, returns the cached `InvokeCompleted` result without
    /// invoking `activity` at all.
    pub async fn execute_activity<F, Fut>(
        &mut self,
        name: &str,
        input: Payload,
        retry_policy: Option<RetryPolicy>,
        activity: F,
    ) -> Result<Payload, ExecutionError>
    where
        F: Fn(Payload) -> Fut,
        Fut: Future<Output = Result<Payload, ExecutionError>>,
    {
        let promise_id = self.allocate_promise();

        if let Some(cached) = self.completed_result(&promise_id) {
            return Ok(cached.clone());
        }

        let policy = retry_policy.unwrap_or_default();
        self.append(EventType::InvokeScheduled {
            promise_id: promise_id.clone(),
            kind: InvokeKind::Activity,
            function_name: name.to_string(),
            input: input.clone(),
            retry_policy: Some(policy.clone()),
        })
        .map_err(|e| ExecutionError::new(ErrorKind::Uncategorized, e.to_string()))?;

        let mut attempt: u32 = 1;
        loop {
            self.append(EventType::InvokeStarted {
                promise_id: promise_id.clone(),
                attempt,
            })
            .map_err(|e| ExecutionError::new(ErrorKind::Uncategorized, e.to_string()))?;

            match activity(input.clone()).await {
                Ok(result) => {
                    self.append(EventType::InvokeCompleted {
                        promise_id: promise_id.clone(),
                        result: result.clone(),
                        attempt,
                    })
                    .map_err(|e| ExecutionError::new(ErrorKind::Uncategorized, e.to_string()))?;
                    return Ok(result);
                }
                Err(error) => {
                    let non_retryable = matches!(
                        error.kind,
                        ErrorKind::Rejected | ErrorKind::Nondeterminism
                    );
                    if non_retryable || policy.exhausted(attempt) {
                        self.append(EventType::InvokeRetrying {
                            promise_id: promise_id.clone(),
                            failed_attempt: attempt,
                            error: error.clone(),
                            retry_at: self.clock.now(),
                        })
                        .map_err(|e| ExecutionError::new(ErrorKind::Uncategorized, e.to_string()))?;
                        return Err(error);
                    }

                    let retry_at = self.clock.now() + policy.interval_for_attempt(attempt);
                    self.append(EventType::InvokeRetrying {
                        promise_id: promise_id.clone(),
                        failed_attempt: attempt,
                        error,
                        retry_at,
                    })
                    .map_err(|e| ExecutionError::new(ErrorKind::Uncategorized, e.to_string()))?;
                    self.clock.sleep_until(retry_at).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Sleep for `duration`, durably. On replay, resolves immediately from
    /// the cached `TimerFired` entry rather than actually sleeping.
    pub async fn sleep(&mut self, duration: ChronoDuration) -> Result<(), RuntimeError> {
        let promise_id = self.allocate_promise();

        if self.replay_cache.is_timer_complete(&promise_id) {
            return Ok(());
        }

        let fire_at = self.clock.now() + duration;
        self.append(EventType::TimerScheduled {
            promise_id: promise_id.clone(),
            duration,
            fire_at,
        })?;
        self.clock.sleep_until(fire_at).await;
        self.append(EventType::TimerFired { promise_id })?;
        Ok(())
    }

    /// Await the next delivery of a named signal, draining `commands` for
    /// deliveries meant for other signal names along the way.
    ///
    /// The execution's own task is the only place that ever holds `&mut
    /// self`, so there is no separate task free to call `deliver_signal` on
    /// our behalf while we're suspended here — this is why the wait is a
    /// direct `commands.recv().await` rather than a notification a second
    /// caller is expected to raise. On replay, resolves from the cached
    /// `SignalReceived` entry without consulting the live inbox or mailbox.
    pub async fn signal_channel(
        &mut self,
        name: &str,
        commands: &mut mpsc::UnboundedReceiver<SchedulerCommand>,
    ) -> Result<Payload, RuntimeError> {
        let promise_id = self.allocate_promise();

        if let Some(cached) = self.replay_cache.get_signal(&promise_id) {
            return Ok(cached.clone());
        }

        self.append(EventType::ExecutionAwaiting {
            waiting_on: vec![promise_id.clone()],
            kind: AwaitKind::Signal {
                name: name.to_string(),
                promise_id: promise_id.clone(),
            },
        })?;

        let payload = loop {
            if let Some(payload) = self.signal_inbox.pop(name) {
                break payload;
            }
            match commands.recv().await {
                Some(SchedulerCommand::Signal { name: delivered, payload }) => {
                    self.deliver_signal(&delivered, payload)?;
                }
                None => {
                    return Err(RuntimeError::AlreadyTerminal(
                        "execution mailbox closed while awaiting a signal".into(),
                    ));
                }
            }
        };

        let delivery_id = self
            .signal_inbox
            .delivery_counters
            .get(name)
            .copied()
            .unwrap_or(0)
            .saturating_sub(1);

        self.append(EventType::SignalReceived {
            promise_id: promise_id.clone(),
            signal_name: name.to_string(),
            payload: payload.clone(),
            delivery_id,
        })?;
        self.append(EventType::ExecutionResumed)?;

        Ok(payload)
    }

    /// Race a named signal against a duration-based timeout, mirroring the
    /// `select { signal ...; timer ... }` construct job lifecycle workflows
    /// use for the offer-response and review windows. Drains `commands` the
    /// same way [`WorkflowCtx::signal_channel`] does, for the same reason:
    /// nothing else can call `deliver_signal` on our behalf while this
    /// future is suspended.
    ///
    /// Returns `Some(payload)` if the signal arrives first, `None` if the
    /// timer fires first. On replay, resolves from whichever of the two
    /// promises the cache already holds.
    pub async fn signal_or_timeout(
        &mut self,
        name: &str,
        duration: ChronoDuration,
        commands: &mut mpsc::UnboundedReceiver<SchedulerCommand>,
    ) -> Result<Option<Payload>, RuntimeError> {
        let signal_promise = self.allocate_promise();
        let timer_promise = self.allocate_promise();

        if let Some(cached) = self.replay_cache.get_signal(&signal_promise) {
            return Ok(Some(cached.clone()));
        }
        if self.replay_cache.is_timer_complete(&timer_promise) {
            return Ok(None);
        }

        self.append(EventType::ExecutionAwaiting {
            waiting_on: vec![signal_promise.clone(), timer_promise.clone()],
            kind: AwaitKind::Any,
        })?;

        let fire_at = self.clock.now() + duration;
        self.append(EventType::TimerScheduled {
            promise_id: timer_promise.clone(),
            duration,
            fire_at,
        })?;

        loop {
            if let Some(payload) = self.signal_inbox.pop(name) {
                let delivery_id = self
                    .signal_inbox
                    .delivery_counters
                    .get(name)
                    .copied()
                    .unwrap_or(0)
                    .saturating_sub(1);
                self.append(EventType::SignalReceived {
                    promise_id: signal_promise.clone(),
                    signal_name: name.to_string(),
                    payload: payload.clone(),
                    delivery_id,
                })?;
                self.append(EventType::ExecutionResumed)?;
                return Ok(Some(payload));
            }

            let clock = self.clock.clone();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SchedulerCommand::Signal { name: delivered, payload }) => {
                        self.deliver_signal(&delivered, payload)?;
                    }
                    None => {
                        return Err(RuntimeError::AlreadyTerminal(
                            "execution mailbox closed while awaiting a signal".into(),
                        ));
                    }
                },
                _ = clock.sleep_until(fire_at) => {
                    self.append(EventType::TimerFired { promise_id: timer_promise.clone() })?;
                    self.append(EventType::ExecutionResumed)?;
                    return Ok(None);
                }
            }
        }
    }

    /// End this execution's history and restart it with fresh history,
    /// preserving its identity. Used by long-running workflows (e.g. the
    /// payment retry loop) to bound journal growth.
    pub fn continue_as_new<T: serde::Serialize>(
        &mut self,
        next_input: &T,
        carryover: &T,
    ) -> Result<(), RuntimeError> {
        self.append(EventType::WorkflowContinuedAsNew {
            next_input: encode_json(next_input),
            carryover: encode_json(carryover),
        })?;
        Ok(())
    }

    pub fn complete<T: serde::Serialize>(&mut self, result: &T) -> Result<(), RuntimeError> {
        self.append(EventType::ExecutionCompleted {
            result: encode_json(result),
        })?;
        Ok(())
    }

    pub fn fail(&mut self, error: ExecutionError) -> Result<(), RuntimeError> {
        self.append(EventType::ExecutionFailed { error })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_clock::SystemClock;

    fn execution_id(tag: u8) -> ExecutionId {
        ExecutionId::new([tag; 32])
    }

    fn ctx(tag: u8) -> WorkflowCtx {
        WorkflowCtx::new(
            execution_id(tag),
            Arc::new(SystemClock),
            &[],
            Payload::new(vec![], Codec::Json),
        )
    }

    #[tokio::test]
    async fn signal_channel_resolves_once_its_name_arrives_on_the_mailbox() {
        let mut ctx = ctx(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(SchedulerCommand::Signal {
            name: "approve".into(),
            payload: Payload::new(vec![1], Codec::Json),
        })
        .unwrap();

        let payload = ctx.signal_channel("approve", &mut rx).await.unwrap();
        assert_eq!(payload.bytes, vec![1]);
    }

    #[tokio::test]
    async fn signal_channel_buffers_deliveries_for_other_names() {
        let mut ctx = ctx(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(SchedulerCommand::Signal {
            name: "cancel".into(),
            payload: Payload::new(vec![9], Codec::Json),
        })
        .unwrap();
        tx.send(SchedulerCommand::Signal {
            name: "approve".into(),
            payload: Payload::new(vec![1], Codec::Json),
        })
        .unwrap();

        let payload = ctx.signal_channel("approve", &mut rx).await.unwrap();
        assert_eq!(payload.bytes, vec![1]);

        // The buffered "cancel" delivery is still waiting in the inbox.
        assert_eq!(ctx.signal_inbox.pop("cancel").unwrap().bytes, vec![9]);
    }

    #[tokio::test]
    async fn signal_channel_errors_when_the_mailbox_closes_unanswered() {
        let mut ctx = ctx(3);
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(tx);

        let err = ctx.signal_channel("approve", &mut rx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn signal_or_timeout_prefers_a_signal_that_beats_the_clock() {
        let mut ctx = ctx(4);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(SchedulerCommand::Signal {
            name: "offer_response".into(),
            payload: Payload::new(vec![7], Codec::Json),
        })
        .unwrap();

        let result = ctx
            .signal_or_timeout("offer_response", ChronoDuration::hours(24), &mut rx)
            .await
            .unwrap();
        assert_eq!(result.unwrap().bytes, vec![7]);
    }

    #[tokio::test]
    async fn signal_or_timeout_returns_none_once_the_duration_elapses() {
        let mut ctx = ctx(5);
        let (_tx, mut rx) = mpsc::unbounded_channel();

        let result = ctx
            .signal_or_timeout("offer_response", ChronoDuration::milliseconds(1), &mut rx)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
