//! [`SchedulerRuntime`]: the [`WorkflowRuntime`] the Command Gateway talks
//! to, wrapping `jobflow-engine`'s [`ExecutionScheduler`] with the durable
//! pieces the gateway never needs to see — the journal sink, the
//! execution-id derivation, and the `continue_as_new` relay between
//! `run_lifecycle` and `run_payment_retry`.

use std::sync::Arc;

use async_trait::async_trait;
use jobflow_clock::Clock;
use jobflow_engine::{encode_json, ExecutionScheduler, JournalSink, RuntimeError as EngineError};
use jobflow_gateway::{GatewayError, WorkflowRuntime};
use jobflow_store::JournalStore;
use jobflow_types::{ExecutionId, JobId, JournalEntry, Payload};
use jobflow_workflow::{
    run_lifecycle, run_payment_retry, JobLifecycleInput, PaymentRetryInput, WorkflowDeps,
    WorkflowOutcome,
};
use tokio::sync::Mutex;

/// Zero-extends a job id's UUID into the 32-byte promise root. Every
/// execution this server spawns is root-level, so [`jobflow_store`]'s
/// `JournalStore` only ever needs the first 16 of those bytes back to
/// recover the original `UUID` — see its own doc comment.
pub fn execution_id_for(job_id: JobId) -> ExecutionId {
    let mut root = [0u8; 32];
    root[..16].copy_from_slice(job_id.0.as_bytes());
    ExecutionId::new(root)
}

struct StoreSink {
    journal: Arc<dyn JournalStore>,
}

#[async_trait]
impl JournalSink for StoreSink {
    async fn append(
        &self,
        execution_id: &ExecutionId,
        entries: Vec<JournalEntry>,
    ) -> Result<(), EngineError> {
        self.journal
            .append(execution_id, &entries)
            .await
            .map_err(|error| EngineError::Sink(error.to_string()))
    }
}

pub struct SchedulerRuntime {
    scheduler: Mutex<ExecutionScheduler>,
    journal: Arc<dyn JournalStore>,
    clock: Arc<dyn Clock>,
    deps: Arc<WorkflowDeps>,
}

impl SchedulerRuntime {
    pub fn new(journal: Arc<dyn JournalStore>, clock: Arc<dyn Clock>, deps: Arc<WorkflowDeps>) -> Self {
        Self { scheduler: Mutex::new(ExecutionScheduler::new()), journal, clock, deps }
    }

    /// Spawns `run_lifecycle` against `history` under `execution_id`,
    /// following the `continue_as_new` relay into `run_payment_retry` for
    /// as many continuations as the run produces. Used both for a brand
    /// new job (empty history) and for restart recovery (history loaded
    /// from the journal store).
    ///
    /// A continuation keeps the same `WorkflowCtx` rather than building a
    /// fresh one: `continue_as_new` only appends a
    /// `WorkflowContinuedAsNew` marker to the execution's one ongoing
    /// journal (see its own doc comment), it does not start a new journal.
    /// Rebuilding the context against an empty history here would both
    /// collide the next entries' sequence numbers with ones already
    /// persisted and violate the journal's own rule that the first event
    /// ever appended must be `ExecutionStarted`.
    async fn spawn(&self, execution_id: ExecutionId, history: Vec<JournalEntry>, input: JobLifecycleInput) {
        let clock = self.clock.clone();
        let journal = self.journal.clone();
        let sink: Arc<dyn JournalSink> = Arc::new(StoreSink { journal });
        let deps = self.deps.clone();
        let genesis_input = encode_json(&input);

        let mut scheduler = self.scheduler.lock().await;
        scheduler.spawn(execution_id, clock, history, genesis_input, sink.clone(), move |mut ctx, mut commands, sink| async move {
            let mut outcome = run_lifecycle(&mut ctx, input, deps.clone(), &mut commands, &sink).await?;
            loop {
                let retry_input = match outcome {
                    WorkflowOutcome::Completed => return Ok(()),
                    WorkflowOutcome::ContinuedAsNew(retry_input) => retry_input,
                };
                outcome = run_payment_retry(&mut ctx, retry_input, deps.clone(), &sink).await?;
            }
        });
    }

    /// Resumes an execution from a history already recorded in the journal
    /// store, for restart recovery. The `attempt`/`started_at` carried in
    /// the replayed history determine whether this lands back in
    /// `run_lifecycle` or directly in `run_payment_retry`; since the
    /// journal alone can't say which, the caller (recovery sweep in
    /// `main.rs`) tracks that via the job row's own status instead.
    pub async fn resume_lifecycle(&self, job_id: JobId, history: Vec<JournalEntry>) {
        let execution_id = execution_id_for(job_id);
        self.spawn(execution_id, history, JobLifecycleInput { job_id }).await;
    }

    /// Resumes directly into the payment retry continuation, for a job
    /// recovered mid-retry-loop.
    pub async fn resume_payment_retry(&self, job_id: JobId, history: Vec<JournalEntry>, retry_input: PaymentRetryInput) {
        let execution_id = execution_id_for(job_id);
        let clock = self.clock.clone();
        let journal = self.journal.clone();
        let sink: Arc<dyn JournalSink> = Arc::new(StoreSink { journal });
        let deps = self.deps.clone();
        let genesis_input = encode_json(&retry_input);

        let mut scheduler = self.scheduler.lock().await;
        scheduler.spawn(execution_id, clock, history, genesis_input, sink.clone(), move |mut ctx, _commands, sink| async move {
            let mut outcome = run_payment_retry(&mut ctx, retry_input, deps.clone(), &sink).await?;
            loop {
                let next_input = match outcome {
                    WorkflowOutcome::Completed => return Ok(()),
                    WorkflowOutcome::ContinuedAsNew(next_input) => next_input,
                };
                outcome = run_payment_retry(&mut ctx, next_input, deps.clone(), &sink).await?;
            }
        });
    }
}

#[async_trait]
impl WorkflowRuntime for SchedulerRuntime {
    async fn start_lifecycle(&self, job_id: JobId) -> Result<(), GatewayError> {
        let execution_id = execution_id_for(job_id);
        {
            let scheduler = self.scheduler.lock().await;
            if scheduler.is_running(&execution_id) {
                return Ok(());
            }
        }
        self.spawn(execution_id, Vec::new(), JobLifecycleInput { job_id }).await;
        Ok(())
    }

    async fn signal(&self, job_id: JobId, name: &str, payload: Payload) -> Result<(), GatewayError> {
        let execution_id = execution_id_for(job_id);
        let scheduler = self.scheduler.lock().await;
        scheduler
            .signal(&execution_id, name, payload)
            .map_err(|error| GatewayError::Conflict(error.to_string()))
    }
}
