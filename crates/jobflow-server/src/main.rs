//! Composition root: wires `jobflow-config` through to `jobflow-gateway`,
//! then re-hydrates any job whose workflow execution was still running
//! when the process last stopped.
//!
//! No HTTP (or other transport) lives here — `CommandGateway` is exposed
//! as a plain set of async methods a caller already holding an
//! authenticated `Principal` can invoke directly, matching how every other
//! crate in this workspace treats transport framing as out of scope.

mod runtime;

use std::sync::Arc;

use anyhow::Context;
use jobflow_clock::{Clock, SystemClock};
use jobflow_config::AppConfig;
use jobflow_engine::decode_json;
use jobflow_gateway::CommandGateway;
use jobflow_payments::{CloverAdapter, PaymentProcessor};
use jobflow_store::{JobStore, JournalStore, PgJobStore, PgJournalStore};
use jobflow_types::{EventType, JobStatus};
use jobflow_workflow::{NullMatcher, PaymentRetryInput, WorkerMatcher, WorkflowDeps};
use sqlx::postgres::PgPoolOptions;

use runtime::SchedulerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobflow=debug".parse().unwrap()),
        )
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connecting to the job store database")?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let journal: Arc<dyn JournalStore> = Arc::new(PgJournalStore::new(pool));
    let payments: Arc<dyn PaymentProcessor> = Arc::new(CloverAdapter::new(config.payment_adapter.clone()));
    let matcher: Arc<dyn WorkerMatcher> = Arc::new(NullMatcher);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let deps = Arc::new(WorkflowDeps {
        store: store.clone(),
        payments,
        matcher,
        config: config.workflow.clone(),
    });

    let runtime = Arc::new(SchedulerRuntime::new(journal.clone(), clock, deps.clone()));
    recover_in_flight_executions(&store, &journal, &runtime).await?;

    // No inbound transport is wired up (out of scope, §4.7's note on
    // framing) — `_gateway` is what an embedder (an integration test, an
    // RPC shim added later) would hold onto and call directly.
    let _gateway = CommandGateway::new(store, deps, runtime);

    tracing::info!("jobflow-server ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");
    Ok(())
}

/// Re-hydrates every non-terminal job's workflow execution from its
/// recorded journal. A job with no journal history at all crashed between
/// `CreateJob`'s insert and the first flush, so it restarts from scratch;
/// a job whose history's last continuation was into the payment retry
/// loop resumes there directly rather than re-running the lifecycle from
/// `PriceJob`.
async fn recover_in_flight_executions(
    store: &Arc<dyn JobStore>,
    journal: &Arc<dyn JournalStore>,
    runtime: &Arc<SchedulerRuntime>,
) -> anyhow::Result<()> {
    let resumable = store.list_resumable().await.context("listing resumable jobs")?;
    tracing::info!(count = resumable.len(), "recovering in-flight job executions");

    for job in resumable {
        let execution_id = runtime::execution_id_for(job.id);
        let history = journal.load(&execution_id).await.context("loading execution history")?;

        let last_continuation = history.iter().rev().find_map(|entry| match &entry.event {
            EventType::WorkflowContinuedAsNew { next_input, .. } => Some(next_input.clone()),
            _ => None,
        });

        match (job.status, last_continuation) {
            (JobStatus::PaymentFailed, Some(next_input)) => {
                let retry_input: PaymentRetryInput = decode_json(&next_input)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))
                    .context("decoding carried-over payment retry input")?;
                runtime.resume_payment_retry(job.id, history, retry_input).await;
            }
            _ => {
                runtime.resume_lifecycle(job.id, history).await;
            }
        }
    }

    Ok(())
}
