use jobflow_journal::JournalViolation;
use jobflow_types::ExecutionError;
use thiserror::Error;

/// Errors raised by the engine itself, as opposed to [`ExecutionError`]
/// values a workflow function returns or an activity fails with.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("journal invariant violated: {0}")]
    InvariantViolation(#[from] JournalViolation),
    #[error("replay diverged from recorded history: {0}")]
    NonDeterminism(String),
    #[error("workflow function panicked: {0}")]
    WorkflowPanicked(String),
    #[error("no execution registered for id {0}")]
    UnknownExecution(String),
    #[error("execution {0} is already terminal")]
    AlreadyTerminal(String),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// A `JournalSink::append` call failed. Distinct from
    /// `InvariantViolation`: the entries themselves were fine, the
    /// durable store just couldn't take them.
    #[error("journal sink failed: {0}")]
    Sink(String),
}
