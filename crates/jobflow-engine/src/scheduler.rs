use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use jobflow_clock::Clock;
use jobflow_types::{ExecutionId, JournalEntry, Payload};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ctx::WorkflowCtx;
use crate::error::RuntimeError;

/// A message dispatched into a running execution's mailbox.
///
/// The scheduler only routes these; turning a `Signal` into a
/// `WorkflowCtx::deliver_signal` call is the workflow function's job, since
/// only it knows when it's safe to mutate its own `WorkflowCtx`.
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    Signal { name: String, payload: Payload },
}

/// Where a running execution's new journal entries go once a workflow step
/// produces them.
///
/// `jobflow-engine` does not know how `jobflow-store` persists a
/// `jobflow-journal`'s entries; it only needs somewhere to hand them off, so
/// the scheduler is generic over this seam behind a trait object rather than
/// a concrete type.
#[async_trait]
pub trait JournalSink: Send + Sync + 'static {
    async fn append(
        &self,
        execution_id: &ExecutionId,
        entries: Vec<JournalEntry>,
    ) -> Result<(), RuntimeError>;
}

/// Handle to a running execution's task and mailbox.
pub struct ExecutionHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    task: JoinHandle<Result<(), RuntimeError>>,
}

impl ExecutionHandle {
    /// Deliver a signal into the execution's mailbox. Errors if the
    /// execution already finished and dropped its receiver.
    pub fn signal(&self, name: impl Into<String>, payload: Payload) -> Result<(), RuntimeError> {
        self.commands
            .send(SchedulerCommand::Signal {
                name: name.into(),
                payload,
            })
            .map_err(|_| RuntimeError::AlreadyTerminal("execution mailbox closed".into()))
    }

    /// Wait for the execution's task to finish, surfacing a panic as
    /// [`RuntimeError::WorkflowPanicked`].
    pub async fn join(self) -> Result<(), RuntimeError> {
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(RuntimeError::WorkflowPanicked(join_err.to_string())),
        }
    }
}

/// Multiplexes many concurrently running workflow executions onto the
/// `tokio` runtime: one lightweight task per execution, each draining its
/// own mailbox of queued signals.
///
/// Each execution is an ordinary `tokio` task; bounding one that never
/// yields is a caller concern (wrap the workflow future in
/// `tokio::time::timeout`), not something the scheduler enforces itself.
#[derive(Default)]
pub struct ExecutionScheduler {
    executions: HashMap<ExecutionId, ExecutionHandle>,
}

impl ExecutionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `workflow` against a freshly built [`WorkflowCtx`] seeded from
    /// `history` (empty for a brand-new execution, in which case
    /// `genesis_input` becomes its `ExecutionStarted` payload).
    ///
    /// `workflow` owns the context for the lifetime of the task: it reads
    /// `commands` and routes deliveries into the context via
    /// `WorkflowCtx::deliver_signal`, and persists new entries through
    /// `sink` as it sees fit. The scheduler does not dictate a flush
    /// cadence — only that there is somewhere for entries to go.
    pub fn spawn<F, Fut>(
        &mut self,
        execution_id: ExecutionId,
        clock: Arc<dyn Clock>,
        history: Vec<JournalEntry>,
        genesis_input: Payload,
        sink: Arc<dyn JournalSink>,
        workflow: F,
    ) where
        F: FnOnce(WorkflowCtx, mpsc::UnboundedReceiver<SchedulerCommand>, Arc<dyn JournalSink>) -> Fut
            + Send
            + 'static,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = WorkflowCtx::new(execution_id.clone(), clock, &history, genesis_input);
        let task = tokio::spawn(workflow(ctx, rx, sink));
        self.executions
            .insert(execution_id, ExecutionHandle { commands: tx, task });
    }

    /// Deliver a signal to a running execution's mailbox.
    pub fn signal(
        &self,
        execution_id: &ExecutionId,
        name: impl Into<String>,
        payload: Payload,
    ) -> Result<(), RuntimeError> {
        self.executions
            .get(execution_id)
            .ok_or_else(|| RuntimeError::UnknownExecution(execution_id.to_string()))?
            .signal(name, payload)
    }

    /// Remove and await a finished execution's task, surfacing the
    /// workflow function's own result.
    pub async fn join(&mut self, execution_id: &ExecutionId) -> Result<(), RuntimeError> {
        let handle = self
            .executions
            .remove(execution_id)
            .ok_or_else(|| RuntimeError::UnknownExecution(execution_id.to_string()))?;
        handle.join().await
    }

    pub fn is_running(&self, execution_id: &ExecutionId) -> bool {
        self.executions.contains_key(execution_id)
    }
}
