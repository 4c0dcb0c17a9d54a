//! The workflow-invoked side effects (§9: "anything initiated by the
//! workflow itself is an activity"). Each function here is plain async
//! business logic against `WorkflowDeps`; `lifecycle.rs` is responsible for
//! wrapping each call through `WorkflowCtx::execute_activity` so it gets
//! journaled, retried, and idempotency-keyed.

use std::sync::Arc;

use chrono::Utc;
use jobflow_payments::{CaptureRequest, FeeSchedule, PaymentProcessor, VoidRequest, calculate_fees};
use jobflow_store::{JobFieldUpdate, JobStore, StoreError};
use jobflow_types::{
    ActorRole, ErrorKind, ExecutionError, Job, JobId, JobStatus, PaymentSplit, PaymentSplitId,
    PaymentSplitType, Transaction, TransactionId, TransactionStatus, TransactionType, UserId,
};
use rust_decimal::Decimal;

use crate::config::WorkflowConfig;
use crate::matcher::WorkerMatcher;

/// Shared handles every activity needs: persistence, the payment rail, the
/// worker-matching boundary, and deployment-time configuration.
pub struct WorkflowDeps {
    pub store: Arc<dyn JobStore>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub matcher: Arc<dyn WorkerMatcher>,
    pub config: WorkflowConfig,
}

pub fn store_error(error: StoreError) -> ExecutionError {
    match error {
        StoreError::Conflict(msg) => ExecutionError::new(ErrorKind::Rejected, msg),
        StoreError::InvalidTransition(msg) => ExecutionError::new(ErrorKind::Rejected, msg),
        StoreError::NotFound(msg) => ExecutionError::new(ErrorKind::Rejected, msg),
        other => ExecutionError::new(ErrorKind::ActivityFailure, other.to_string()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MatchOutcome {
    Matched(UserId),
    NoneAvailable,
}

/// `PriceJob`: confirms the job carries a concrete price and advances
/// `posted -> offer_sent`.
pub async fn price_job(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    let job = deps.store.get_job(job_id).await.map_err(store_error)?;
    job.pay_spec.estimated_total(None).ok_or_else(|| {
        ExecutionError::new(
            ErrorKind::Rejected,
            "per-hour pay specs must resolve to a total before pricing",
        )
    })?;
    deps.store
        .update_status(job_id, JobStatus::Posted, JobStatus::OfferSent, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

/// `FindMatchingWorker`: one attempt against the worker-matching boundary.
pub async fn find_matching_worker(deps: &WorkflowDeps, job_id: JobId) -> Result<MatchOutcome, ExecutionError> {
    let job = deps.store.get_job(job_id).await.map_err(store_error)?;
    match deps.matcher.find_match(&job).await {
        Some(worker_id) => Ok(MatchOutcome::Matched(worker_id)),
        None => Ok(MatchOutcome::NoneAvailable),
    }
}

/// `AssignWorker`: `accepted -> worker_assigned`, setting `worker_id`.
pub async fn assign_worker(deps: &WorkflowDeps, job_id: JobId, worker_id: UserId) -> Result<(), ExecutionError> {
    deps.store.assign_worker(job_id, worker_id).await.map_err(store_error)?;
    Ok(())
}

/// `ScheduleJob`: `worker_assigned -> scheduled`. The schedule window
/// itself was captured at `CreateJob` time; this just confirms and advances.
pub async fn schedule_job(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, JobStatus::WorkerAssigned, JobStatus::Scheduled, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

/// `StartJob`: `scheduled -> in_progress`, stamping `actual_start`. Driven by
/// the `job_started` signal, not a timer — the worker decides when to start.
pub async fn start_job(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    let fields = JobFieldUpdate { actual_start: Some(Utc::now()), ..Default::default() };
    deps.store
        .update_status(job_id, JobStatus::Scheduled, JobStatus::InProgress, fields)
        .await
        .map_err(store_error)?;
    Ok(())
}

/// Records one side's completion confirmation. Idempotent per role: a
/// duplicate signal from the same actor just re-reads the current state.
/// Returns whether both sides have now confirmed.
pub async fn record_completion(deps: &WorkflowDeps, job_id: JobId, role: ActorRole) -> Result<bool, ExecutionError> {
    let result = deps.store.record_completion(job_id, role, Utc::now()).await.map_err(store_error)?;
    Ok(result.both_confirmed)
}

/// `MarkCompleted`: `in_progress -> completed`, stamping `actual_end`. Only
/// called once dual confirmation lands.
pub async fn mark_completed(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    let fields = JobFieldUpdate { actual_end: Some(Utc::now()), ..Default::default() };
    deps.store
        .update_status(job_id, JobStatus::InProgress, JobStatus::Completed, fields)
        .await
        .map_err(store_error)?;
    Ok(())
}

fn open_authorization(job: &Job, transactions: &[Transaction]) -> Result<Transaction, ExecutionError> {
    transactions
        .iter()
        .find(|t| {
            t.transaction_type == TransactionType::Authorization
                && t.status == TransactionStatus::Completed
                && t.capture_amount.is_none()
        })
        .cloned()
        .ok_or_else(|| {
            ExecutionError::new(
                ErrorKind::Rejected,
                format!("job {} has no open authorization to capture", job.id),
            )
        })
}

fn split_rows(capture_txn_id: TransactionId, schedule: &FeeSchedule, worker_id: Option<UserId>, platform_fee: Decimal, net_amount: Decimal) -> Vec<PaymentSplit> {
    let now = Utc::now();
    vec![
        PaymentSplit {
            id: PaymentSplitId::new(),
            transaction_id: capture_txn_id,
            split_type: PaymentSplitType::PlatformFee,
            amount: platform_fee,
            recipient_id: None,
            percentage: Some(schedule.platform_fee_percent),
            created_at: now,
        },
        PaymentSplit {
            id: PaymentSplitId::new(),
            transaction_id: capture_txn_id,
            split_type: PaymentSplitType::WorkerPayment,
            amount: net_amount,
            recipient_id: worker_id,
            percentage: None,
            created_at: now,
        },
    ]
}

/// `ProcessJobPayment`: captures the job's open authorization, inserts the
/// capture transaction and its splits, and advances `completed -> paid`.
///
/// A `Retryable` processor failure bubbles up as `ExecutionError::Trap`,
/// which `WorkflowCtx::execute_activity` retries per policy; `lifecycle.rs`
/// is responsible for branching to `PaymentRetryWorkflow` once the policy is
/// exhausted or the processor reports `PermanentRejected`.
pub async fn process_job_payment(deps: &WorkflowDeps, job_id: JobId, idempotency_key: String) -> Result<(), ExecutionError> {
    let job = deps.store.get_job(job_id).await.map_err(store_error)?;
    let transactions = deps.store.list_transactions(job_id).await.map_err(store_error)?;
    let authorization = open_authorization(&job, &transactions)?;

    let response = deps
        .payments
        .capture(CaptureRequest {
            charge_id: authorization.external_charge_id.clone().unwrap_or_default(),
            amount: authorization.amount,
            idempotency_key,
        })
        .await
        .map_err(ExecutionError::from)?;

    let breakdown = calculate_fees(authorization.amount, &deps.config.fee_schedule);
    let now = Utc::now();

    let capture_txn = Transaction {
        id: TransactionId::new(),
        job_id,
        consumer_id: authorization.consumer_id,
        worker_id: authorization.worker_id,
        transaction_type: TransactionType::Capture,
        status: TransactionStatus::Completed,
        amount: authorization.amount,
        capture_amount: Some(authorization.amount),
        refund_amount: Decimal::ZERO,
        processing_fee: breakdown.processing_fee,
        platform_fee: breakdown.platform_fee,
        net_amount: breakdown.net_amount,
        currency: authorization.currency.clone(),
        external_charge_id: authorization.external_charge_id.clone(),
        external_payment_id: Some(response.payment_id),
        external_source_token: None,
        external_refund_id: None,
        authorized_at: None,
        authorization_expires_at: None,
        captured_at: Some(now),
        refunded_at: None,
        escrow_held_at: None,
        escrow_released_at: Some(now),
        parent_transaction_id: Some(authorization.id),
        created_at: now,
        updated_at: now,
    };
    let capture_txn = deps.store.insert_transaction(capture_txn).await.map_err(store_error)?;

    for split in split_rows(capture_txn.id, &deps.config.fee_schedule, authorization.worker_id, breakdown.platform_fee, breakdown.net_amount) {
        deps.store.insert_payment_split(split).await.map_err(store_error)?;
    }

    let mut released_auth = authorization.clone();
    released_auth.capture_amount = Some(authorization.amount);
    released_auth.escrow_released_at = Some(now);
    deps.store.update_transaction(released_auth).await.map_err(store_error)?;

    deps.store
        .update_status(job_id, JobStatus::Completed, JobStatus::Paid, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

/// Voids the job's open authorization if one exists. Used when the worker
/// match loop is exhausted and when the payment retry loop itself exhausts.
pub async fn void_open_authorization(deps: &WorkflowDeps, job_id: JobId, idempotency_key: String) -> Result<(), ExecutionError> {
    let transactions = deps.store.list_transactions(job_id).await.map_err(store_error)?;
    let Some(authorization) = transactions
        .iter()
        .find(|t| t.transaction_type == TransactionType::Authorization && t.status == TransactionStatus::Completed && t.capture_amount.is_none())
        .cloned()
    else {
        return Ok(());
    };

    deps.payments
        .void(VoidRequest {
            charge_id: authorization.external_charge_id.clone().unwrap_or_default(),
            idempotency_key,
        })
        .await
        .map_err(ExecutionError::from)?;

    let mut voided = authorization;
    voided.status = TransactionStatus::Refunded;
    deps.store.update_transaction(voided).await.map_err(store_error)?;
    Ok(())
}

/// `RequestReviews`: `paid -> review_pending`.
pub async fn request_reviews(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, JobStatus::Paid, JobStatus::ReviewPending, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

/// `CloseJob`: `review_pending -> closed`, terminal.
pub async fn close_job(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, JobStatus::ReviewPending, JobStatus::Closed, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

/// Moves the job straight to `cancelled` from whatever state the caller
/// expects it to be in. Used by the worker-match exhaustion path, the
/// payment-retry exhaustion path, and direct consumer cancellation.
pub async fn cancel_with_reason(deps: &WorkflowDeps, job_id: JobId, expected_from: JobStatus) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, expected_from, JobStatus::Cancelled, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

pub async fn mark_no_worker_available(deps: &WorkflowDeps, job_id: JobId, expected_from: JobStatus) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, expected_from, JobStatus::NoWorkerAvailable, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

pub async fn mark_rejected(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, JobStatus::OfferSent, JobStatus::Rejected, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

pub async fn mark_payment_failed(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, JobStatus::Completed, JobStatus::PaymentFailed, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

pub async fn mark_paid_after_retry(deps: &WorkflowDeps, job_id: JobId) -> Result<(), ExecutionError> {
    deps.store
        .update_status(job_id, JobStatus::PaymentFailed, JobStatus::Paid, JobFieldUpdate::default())
        .await
        .map_err(store_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::NullMatcher;
    use jobflow_payments::FakeProcessor;
    use jobflow_store::{InMemoryJobStore, NewJob};
    use jobflow_types::PaySpec;
    use rust_decimal_macros::dec;

    fn deps() -> WorkflowDeps {
        WorkflowDeps {
            store: Arc::new(InMemoryJobStore::new()),
            payments: Arc::new(FakeProcessor::new()),
            matcher: Arc::new(NullMatcher),
            config: WorkflowConfig::default(),
        }
    }

    async fn posted_job(deps: &WorkflowDeps) -> JobId {
        let job = deps
            .store
            .create_job(NewJob {
                consumer_id: UserId::new(),
                title: "Mow the lawn".into(),
                description: "Front and back".into(),
                category: "yard".into(),
                address: "123 Main St".into(),
                location: None,
                pay_spec: PaySpec::Total(dec!(100.00)),
                scheduled_start: None,
                scheduled_end: None,
            })
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn price_job_advances_to_offer_sent() {
        let deps = deps();
        let job_id = posted_job(&deps).await;
        price_job(&deps, job_id).await.unwrap();
        assert_eq!(deps.store.get_job(job_id).await.unwrap().status, JobStatus::OfferSent);
    }

    #[tokio::test]
    async fn find_matching_worker_reports_none_available_by_default() {
        let deps = deps();
        let job_id = posted_job(&deps).await;
        let outcome = find_matching_worker(&deps, job_id).await.unwrap();
        assert_eq!(outcome, MatchOutcome::NoneAvailable);
    }

    #[tokio::test]
    async fn process_job_payment_creates_capture_with_correct_splits() {
        let deps = deps();
        let job_id = posted_job(&deps).await;
        deps.store
            .update_status(job_id, JobStatus::Posted, JobStatus::OfferSent, JobFieldUpdate::default())
            .await
            .unwrap();
        deps.store
            .update_status(job_id, JobStatus::OfferSent, JobStatus::Accepted, JobFieldUpdate::default())
            .await
            .unwrap();
        deps.store.assign_worker(job_id, UserId::new()).await.unwrap();
        deps.store
            .update_status(job_id, JobStatus::WorkerAssigned, JobStatus::Scheduled, JobFieldUpdate::default())
            .await
            .unwrap();
        deps.store
            .update_status(job_id, JobStatus::Scheduled, JobStatus::InProgress, JobFieldUpdate::default())
            .await
            .unwrap();
        deps.store
            .update_status(job_id, JobStatus::InProgress, JobStatus::Completed, JobFieldUpdate::default())
            .await
            .unwrap();

        let job = deps.store.get_job(job_id).await.unwrap();
        deps.store
            .insert_transaction(Transaction {
                id: TransactionId::new(),
                job_id,
                consumer_id: job.consumer_id,
                worker_id: job.worker_id,
                transaction_type: TransactionType::Authorization,
                status: TransactionStatus::Completed,
                amount: dec!(100.00),
                capture_amount: None,
                refund_amount: Decimal::ZERO,
                processing_fee: Decimal::ZERO,
                platform_fee: Decimal::ZERO,
                net_amount: Decimal::ZERO,
                currency: "USD".into(),
                external_charge_id: Some("ch_1".into()),
                external_payment_id: None,
                external_source_token: None,
                external_refund_id: None,
                authorized_at: Some(Utc::now()),
                authorization_expires_at: None,
                captured_at: None,
                refunded_at: None,
                escrow_held_at: Some(Utc::now()),
                escrow_released_at: None,
                parent_transaction_id: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        process_job_payment(&deps, job_id, "idem-1".into()).await.unwrap();

        let summary = deps.store.get_payment_summary(job_id).await.unwrap();
        assert_eq!(summary.platform_fee_total, dec!(10.00));
        assert_eq!(summary.processing_fee_total, dec!(2.70));
        assert_eq!(summary.net_worker_total, dec!(87.30));
        assert_eq!(deps.store.get_job(job_id).await.unwrap().status, JobStatus::Paid);
    }
}
