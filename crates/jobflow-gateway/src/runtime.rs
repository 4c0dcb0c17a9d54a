//! The seam between the Command Gateway and wherever workflow executions
//! actually run. `jobflow-server` is the composition root that owns an
//! `ExecutionScheduler` and implements this trait; the gateway only ever
//! needs to start a lifecycle and post signals into it, the same way it
//! only ever needs a `dyn JobStore` and never a concrete Postgres pool.

use async_trait::async_trait;
use jobflow_types::{JobId, Payload};

use crate::error::GatewayError;

/// Starts and signals job lifecycle executions. A signal delivered to a
/// job with no running execution (already finished, or never started) is
/// a [`GatewayError::Conflict`], not a silent no-op — every signal in this
/// crate corresponds to a command the caller expects the workflow to see.
#[async_trait]
pub trait WorkflowRuntime: Send + Sync {
    /// Starts the job lifecycle workflow for `job_id`. Idempotent: starting
    /// an execution that already exists for this job is a no-op, since
    /// `CreateJob` derives the execution id deterministically from the job
    /// id and a retried `CreateJob` call can race a prior one.
    async fn start_lifecycle(&self, job_id: JobId) -> Result<(), GatewayError>;

    /// Delivers a named signal with its JSON-encoded payload to the job's
    /// running execution.
    async fn signal(&self, job_id: JobId, name: &str, payload: Payload) -> Result<(), GatewayError>;
}
