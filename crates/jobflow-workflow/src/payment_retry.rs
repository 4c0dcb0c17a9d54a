//! `PaymentRetryWorkflow` (§4.6): a continuation the lifecycle workflow
//! hands off to via `continue_as_new` when `ProcessJobPayment` comes back
//! `PermanentRejected` or exhausts its own retry policy. Retries the
//! capture on a jittered exponential backoff until either it succeeds — and
//! the job returns to `paid` — or the 24h retry budget runs out, at which
//! point the open authorization is voided and the job moves to `cancelled`.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobflow_engine::RuntimeError;
use jobflow_engine::{JournalSink, WorkflowCtx, activity_idempotency_key, decode_json, encode_json};
use jobflow_types::{ExecutionError, JobId, JobStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::activities::{self, WorkflowDeps};
use crate::flush::flush;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PaymentRetryInput {
    pub job_id: JobId,
    /// Attempts already made before this continuation started; 0 on the
    /// handoff from `lifecycle::run`.
    pub attempt: u32,
    /// When the retry loop first began, carried across every
    /// `continue_as_new` so the 24h budget is measured from the original
    /// capture failure, not from whichever continuation happens to be live.
    pub started_at: DateTime<Utc>,
}

/// How a workflow function's run ended: either it reached a terminal
/// journal entry, or it asked to continue as a fresh history under the same
/// execution identity. The caller (`jobflow-server`'s scheduler glue) is
/// responsible for actually starting that next history — `continue_as_new`
/// only records the intent in the journal.
#[derive(Debug)]
pub enum WorkflowOutcome {
    Completed,
    ContinuedAsNew(PaymentRetryInput),
}

type BoxedActivity<T> = Pin<Box<dyn Future<Output = Result<T, ExecutionError>> + Send>>;

async fn call<T, G>(ctx: &mut WorkflowCtx, name: &str, make: G) -> Result<T, ExecutionError>
where
    T: Serialize + DeserializeOwned,
    G: Fn() -> BoxedActivity<T> + Send + Sync + 'static,
{
    let result = ctx
        .execute_activity(name, encode_json(&()), None, move |_input| {
            let fut = make();
            async move { fut.await.map(|value| encode_json(&value)) }
        })
        .await?;
    decode_json(&result)
}

/// Derives a stable `[0, 1)` jitter fraction from the execution and attempt
/// number, so replaying this continuation computes the same backoff every
/// time instead of drawing a fresh random number it could never reproduce.
fn jitter_fraction(ctx: &WorkflowCtx, attempt: u32) -> f64 {
    let mut hasher = DefaultHasher::new();
    ctx.execution_id().to_string().hash(&mut hasher);
    attempt.hash(&mut hasher);
    (hasher.finish() % 1000) as f64 / 1000.0
}

#[tracing::instrument(skip(ctx, deps, sink), fields(job_id = %input.job_id, attempt = input.attempt))]
pub async fn run(
    ctx: &mut WorkflowCtx,
    input: PaymentRetryInput,
    deps: Arc<WorkflowDeps>,
    sink: &Arc<dyn JournalSink>,
) -> Result<WorkflowOutcome, RuntimeError> {
    let job_id = input.job_id;
    let started_at = input.started_at;
    let mut attempt = input.attempt;

    loop {
        attempt += 1;
        let backoff = deps.config.payment_retry_backoff(attempt, jitter_fraction(ctx, attempt));
        ctx.sleep(backoff).await?;
        flush(ctx, sink).await?;

        if ctx.now() - started_at >= deps.config.payment_retry_budget {
            let deps2 = deps.clone();
            call(ctx, "VoidOpenAuthorization", move || {
                let deps = deps2.clone();
                let idempotency_key = format!("payment-retry-void:{job_id}");
                Box::pin(async move { activities::void_open_authorization(&deps, job_id, idempotency_key).await })
            })
            .await?;

            let deps2 = deps.clone();
            call(ctx, "CancelWithReason", move || {
                let deps = deps2.clone();
                Box::pin(async move { activities::cancel_with_reason(&deps, job_id, JobStatus::PaymentFailed).await })
            })
            .await?;

            tracing::warn!(%job_id, attempt, "payment retry budget exhausted, job cancelled");
            ctx.complete(&())?;
            flush(ctx, sink).await?;
            return Ok(WorkflowOutcome::Completed);
        }

        let idempotency_key = activity_idempotency_key(ctx.execution_id(), ctx.next_sequence(), "ProcessJobPayment");
        let deps2 = deps.clone();
        let result = call(ctx, "ProcessJobPayment", move || {
            let deps = deps2.clone();
            let idempotency_key = idempotency_key.clone();
            Box::pin(async move { activities::process_job_payment(&deps, job_id, idempotency_key).await })
        })
        .await;
        flush(ctx, sink).await?;

        match result {
            Ok(()) => {
                let deps2 = deps.clone();
                call(ctx, "MarkPaidAfterRetry", move || {
                    let deps = deps2.clone();
                    Box::pin(async move { activities::mark_paid_after_retry(&deps, job_id).await })
                })
                .await?;
                tracing::info!(%job_id, attempt, "payment retry succeeded");
                ctx.complete(&())?;
                flush(ctx, sink).await?;
                return Ok(WorkflowOutcome::Completed);
            }
            Err(error) => {
                tracing::warn!(%job_id, attempt, %error, "payment retry attempt failed");

                if attempt % 4 == 0 {
                    let carryover = PaymentRetryInput { job_id, attempt, started_at };
                    ctx.continue_as_new(&carryover, &carryover)?;
                    flush(ctx, sink).await?;
                    return Ok(WorkflowOutcome::ContinuedAsNew(carryover));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_clock::SystemClock;
    use jobflow_types::{Codec, Payload, PromiseId};

    fn ctx_for(root: u8) -> WorkflowCtx {
        WorkflowCtx::new(
            PromiseId::new([root; 32]),
            Arc::new(SystemClock),
            &[],
            Payload::new(vec![], Codec::Json),
        )
    }

    #[test]
    fn jitter_fraction_is_deterministic_and_bounded() {
        let ctx = ctx_for(7);
        let a = jitter_fraction(&ctx, 3);
        let b = jitter_fraction(&ctx, 3);
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn jitter_fraction_varies_by_attempt() {
        let ctx = ctx_for(7);
        assert_ne!(jitter_fraction(&ctx, 1), jitter_fraction(&ctx, 2));
    }
}
