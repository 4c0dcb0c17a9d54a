//! The async execution engine that drives a job-lifecycle workflow function
//! against a durable journal.
//!
//! A workflow function runs against a plain async Rust [`WorkflowCtx`]:
//! every side effect it performs — calling an activity, sleeping, waiting
//! on a signal — becomes a journal entry shaped exactly the way
//! `jobflow_journal::invariants` expects, so replay can re-run the function
//! from the top and reach the same decisions it made the first time.
//! [`ExecutionScheduler`] multiplexes many such executions onto `tokio`.

mod ctx;
mod error;
mod scheduler;

pub use ctx::{activity_idempotency_key, decode_json, encode_json, WorkflowCtx};
pub use error::RuntimeError;
pub use scheduler::{ExecutionHandle, ExecutionScheduler, JournalSink, SchedulerCommand};
