//! The job lifecycle workflow (§4.6): the single durable state machine that
//! drives a job from `posted` through to `closed`, wrapping every
//! `activities` call through [`WorkflowCtx::execute_activity`] and every
//! human-initiated step through a signal wait so the whole run replays
//! deterministically from the journal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jobflow_engine::{WorkflowCtx, activity_idempotency_key, decode_json, encode_json};
use jobflow_engine::{JournalSink, RuntimeError, SchedulerCommand};
use jobflow_types::{ExecutionError, JobId, JobStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::activities::{self, MatchOutcome, WorkflowDeps};
use crate::flush::flush;
use crate::payment_retry::{PaymentRetryInput, WorkflowOutcome};
use crate::signals::{self, CompletionSignal, OfferResponse};

/// Input the workflow is started with; everything else is read from the
/// job row itself via `deps.store`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct JobLifecycleInput {
    pub job_id: JobId,
}

type BoxedActivity<T> = Pin<Box<dyn Future<Output = Result<T, ExecutionError>> + Send>>;

/// Runs one workflow-invoked side effect through `execute_activity`,
/// encoding/decoding the `()` input and the typed output as JSON so
/// `activities.rs` functions never have to know about `Payload`.
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

#[tracing::instrument(skip(ctx, deps, commands, sink), fields(job_id = %input.job_id))]
pub async fn run(
    ctx: &mut WorkflowCtx,
    input: JobLifecycleInput,
    deps: Arc<WorkflowDeps>,
    commands: &mut mpsc::UnboundedReceiver<SchedulerCommand>,
    sink: &Arc<dyn JournalSink>,
) -> Result<WorkflowOutcome, RuntimeError> {
    let job_id = input.job_id;

    let pricing = {
        let deps = deps.clone();
        call(ctx, "PriceJob", move || {
            let deps = deps.clone();
            Box::pin(async move { activities::price_job(&deps, job_id).await })
        })
        .await
    };
    if let Err(error) = pricing {
        ctx.fail(error)?;
        flush(ctx, sink).await?;
        return Ok(WorkflowOutcome::Completed);
    }
    flush(ctx, sink).await?;

    let response = ctx
        .signal_or_timeout(signals::OFFER_RESPONSE, deps.config.offer_response_timeout, commands)
        .await?;
    flush(ctx, sink).await?;
    let accepted = match response {
        Some(payload) => decode_json::<OfferResponse>(&payload)? == OfferResponse::Accepted,
        None => false,
    };
    if !accepted {
        let deps2 = deps.clone();
        call(ctx, "MarkRejected", move || {
            let deps = deps2.clone();
            Box::pin(async move { activities::mark_rejected(&deps, job_id).await })
        })
        .await?;
        flush(ctx, sink).await?;
        tracing::info!(%job_id, "offer rejected or timed out");
        return Ok(WorkflowOutcome::Completed);
    }

    let worker_id = {
        let mut matched = None;
        for attempt in 1..=deps.config.worker_match_max_attempts {
            let deps2 = deps.clone();
            let outcome: MatchOutcome = call(ctx, "FindMatchingWorker", move || {
                let deps = deps2.clone();
                Box::pin(async move { activities::find_matching_worker(&deps, job_id).await })
            })
            .await?;
            flush(ctx, sink).await?;

            match outcome {
                MatchOutcome::Matched(worker) => {
                    matched = Some(worker);
                    break;
                }
                MatchOutcome::NoneAvailable if attempt < deps.config.worker_match_max_attempts => {
                    ctx.sleep(deps.config.worker_match_backoff(attempt)).await?;
                    flush(ctx, sink).await?;
                }
                MatchOutcome::NoneAvailable => {}
            }
        }
        matched
    };

    let Some(worker_id) = worker_id else {
        let deps2 = deps.clone();
        call(ctx, "MarkNoWorkerAvailable", move || {
            let deps = deps2.clone();
            Box::pin(async move { activities::mark_no_worker_available(&deps, job_id, JobStatus::Accepted).await })
        })
        .await?;
        flush(ctx, sink).await?;
        tracing::info!(%job_id, "no worker became available");
        return Ok(WorkflowOutcome::Completed);
    };

    let deps2 = deps.clone();
    call(ctx, "AssignWorker", move || {
        let deps = deps2.clone();
        Box::pin(async move { activities::assign_worker(&deps, job_id, worker_id).await })
    })
    .await?;
    flush(ctx, sink).await?;

    let deps2 = deps.clone();
    call(ctx, "ScheduleJob", move || {
        let deps = deps2.clone();
        Box::pin(async move { activities::schedule_job(&deps, job_id).await })
    })
    .await?;
    flush(ctx, sink).await?;

    ctx.signal_channel(signals::JOB_STARTED, commands).await?;
    flush(ctx, sink).await?;
    let deps2 = deps.clone();
    call(ctx, "StartJob", move || {
        let deps = deps2.clone();
        Box::pin(async move { activities::start_job(&deps, job_id).await })
    })
    .await?;
    flush(ctx, sink).await?;

    loop {
        let payload = ctx.signal_channel(signals::COMPLETION, commands).await?;
        flush(ctx, sink).await?;
        let signal: CompletionSignal = decode_json(&payload)?;
        let role = signal.role;
        let deps2 = deps.clone();
        let both_confirmed: bool = call(ctx, "RecordCompletion", move || {
            let deps = deps2.clone();
            Box::pin(async move { activities::record_completion(&deps, job_id, role).await })
        })
        .await?;
        flush(ctx, sink).await?;
        if both_confirmed {
            break;
        }
    }

    let deps2 = deps.clone();
    call(ctx, "MarkCompleted", move || {
        let deps = deps2.clone();
        Box::pin(async move { activities::mark_completed(&deps, job_id).await })
    })
    .await?;
    flush(ctx, sink).await?;

    let idempotency_key = activity_idempotency_key(ctx.execution_id(), ctx.next_sequence(), "ProcessJobPayment");
    let deps2 = deps.clone();
    let payment = call(ctx, "ProcessJobPayment", move || {
        let deps = deps2.clone();
        let idempotency_key = idempotency_key.clone();
        Box::pin(async move { activities::process_job_payment(&deps, job_id, idempotency_key).await })
    })
    .await;
    flush(ctx, sink).await?;

    if let Err(error) = payment {
        let deps2 = deps.clone();
        call(ctx, "MarkPaymentFailed", move || {
            let deps = deps2.clone();
            Box::pin(async move { activities::mark_payment_failed(&deps, job_id).await })
        })
        .await?;
        flush(ctx, sink).await?;

        tracing::warn!(%job_id, %error, "capture failed, handing off to payment retry");
        let retry_input = PaymentRetryInput { job_id, attempt: 0, started_at: ctx.now() };
        ctx.continue_as_new(&retry_input, &retry_input)?;
        flush(ctx, sink).await?;
        return Ok(WorkflowOutcome::ContinuedAsNew(retry_input));
    }

    let deps2 = deps.clone();
    call(ctx, "RequestReviews", move || {
        let deps = deps2.clone();
        Box::pin(async move { activities::request_reviews(&deps, job_id).await })
    })
    .await?;
    flush(ctx, sink).await?;

    let mut reviews_received = 0;
    while reviews_received < 2 {
        match ctx.signal_or_timeout(signals::REVIEW_SUBMITTED, deps.config.review_timeout, commands).await? {
            Some(_payload) => reviews_received += 1,
            None => break,
        }
        flush(ctx, sink).await?;
    }

    let deps2 = deps.clone();
    call(ctx, "CloseJob", move || {
        let deps = deps2.clone();
        Box::pin(async move { activities::close_job(&deps, job_id).await })
    })
    .await?;
    flush(ctx, sink).await?;

    ctx.complete(&())?;
    flush(ctx, sink).await?;
    Ok(WorkflowOutcome::Completed)
}
