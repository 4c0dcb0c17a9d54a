//! The escrow sub-protocol (§4.6's parenthetical: "invoked by the Command
//! Gateway, not the workflow itself"). `jobflow-gateway` calls these
//! directly as synchronous operations; none of them touch a `WorkflowCtx`
//! or get journaled — the job row's own state (status, transactions) is the
//! only durable record they need.

use chrono::Utc;
use jobflow_payments::{AuthorizeRequest, CaptureRequest, PaymentErrorKind, RefundRequest, calculate_fees};
use jobflow_store::{JobFieldUpdate, JobStore, StoreError};
use jobflow_types::{
    JobId, JobStatus, PaymentSplit, PaymentSplitId, PaymentSplitType, Transaction, TransactionId,
    TransactionStatus, TransactionType, UserId,
};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::activities::WorkflowDeps;

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("job {0} has no open authorization")]
    NoOpenAuthorization(JobId),
    #[error("job {0} is not eligible for this operation in status {1:?}")]
    InvalidState(JobId, JobStatus),
    #[error("refund amount {requested} exceeds remaining refundable balance {remaining}")]
    RefundExceedsBalance { requested: Decimal, remaining: Decimal },
    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
    #[error("payment processor error, retry later: {0}")]
    Retryable(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<jobflow_payments::PaymentError> for EscrowError {
    fn from(error: jobflow_payments::PaymentError) -> Self {
        match error.kind {
            PaymentErrorKind::Retryable => Self::Retryable(error.message),
            PaymentErrorKind::PermanentRejected => Self::Rejected(error.message),
            PaymentErrorKind::InvalidRequest => Self::InvalidRequest(error.message),
            // The caller already holds an idempotency key whose prior result
            // was lost; there's no cached value to hand back at this layer,
            // so surface it the same way a permanent rejection would be.
            PaymentErrorKind::AlreadyApplied => Self::Rejected(error.message),
        }
    }
}

/// `AuthorizePayment`: places a hold for the job's full price. Callable
/// while the job is `posted` or `offer_sent`, ahead of worker acceptance —
/// escrow is funded before a worker is ever committed to the job.
pub async fn authorize_payment(
    deps: &WorkflowDeps,
    job_id: JobId,
    source_token: String,
    idempotency_key: String,
) -> Result<Transaction, EscrowError> {
    let job = deps.store.get_job(job_id).await?;
    if !matches!(job.status, JobStatus::Posted | JobStatus::OfferSent) {
        return Err(EscrowError::InvalidState(job_id, job.status));
    }

    let amount = job.pay_spec.estimated_total(None).ok_or_else(|| {
        EscrowError::InvalidRequest("per-hour pay specs must resolve to a total before authorization".into())
    })?;

    let response = deps
        .payments
        .authorize(AuthorizeRequest {
            source_token,
            amount,
            currency: "USD".into(),
            idempotency_key,
        })
        .await?;

    let now = Utc::now();
    let authorization = Transaction {
        id: TransactionId::new(),
        job_id,
        consumer_id: job.consumer_id,
        worker_id: job.worker_id,
        transaction_type: TransactionType::Authorization,
        status: TransactionStatus::Completed,
        amount,
        capture_amount: None,
        refund_amount: Decimal::ZERO,
        processing_fee: Decimal::ZERO,
        platform_fee: Decimal::ZERO,
        net_amount: Decimal::ZERO,
        currency: "USD".into(),
        external_charge_id: Some(response.charge_id),
        external_payment_id: None,
        external_source_token: None,
        external_refund_id: None,
        authorized_at: Some(now),
        authorization_expires_at: Some(response.authorization_expires_at),
        captured_at: None,
        refunded_at: None,
        escrow_held_at: Some(now),
        escrow_released_at: None,
        parent_transaction_id: None,
        created_at: now,
        updated_at: now,
    };
    Ok(deps.store.insert_transaction(authorization).await?)
}

fn open_authorization_of(job_id: JobId, transactions: &[Transaction]) -> Result<Transaction, EscrowError> {
    transactions
        .iter()
        .find(|t| {
            t.transaction_type == TransactionType::Authorization
                && t.status == TransactionStatus::Completed
                && t.capture_amount.is_none()
        })
        .cloned()
        .ok_or(EscrowError::NoOpenAuthorization(job_id))
}

/// `CapturePayment`: releases the hold and splits it between platform and
/// worker. Only valid once the job has reached `completed` — capturing
/// before the work is done would let a consumer be charged for a no-show.
pub async fn capture_payment(deps: &WorkflowDeps, job_id: JobId, idempotency_key: String) -> Result<Transaction, EscrowError> {
    let job = deps.store.get_job(job_id).await?;
    if !matches!(job.status, JobStatus::Completed | JobStatus::PaymentFailed) {
        return Err(EscrowError::InvalidState(job_id, job.status));
    }

    let transactions = deps.store.list_transactions(job_id).await?;
    let authorization = open_authorization_of(job_id, &transactions)?;

    let response = deps
        .payments
        .capture(CaptureRequest {
            charge_id: authorization.external_charge_id.clone().unwrap_or_default(),
            amount: authorization.amount,
            idempotency_key,
        })
        .await?;

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
    let capture_txn = deps.store.insert_transaction(capture_txn).await?;

    for split in [
        PaymentSplit {
            id: PaymentSplitId::new(),
            transaction_id: capture_txn.id,
            split_type: PaymentSplitType::PlatformFee,
            amount: breakdown.platform_fee,
            recipient_id: None,
            percentage: Some(deps.config.fee_schedule.platform_fee_percent),
            created_at: now,
        },
        PaymentSplit {
            id: PaymentSplitId::new(),
            transaction_id: capture_txn.id,
            split_type: PaymentSplitType::WorkerPayment,
            amount: breakdown.net_amount,
            recipient_id: authorization.worker_id,
            percentage: None,
            created_at: now,
        },
    ] {
        deps.store.insert_payment_split(split).await?;
    }

    let mut released_auth = authorization;
    released_auth.capture_amount = Some(capture_txn.amount);
    released_auth.escrow_released_at = Some(now);
    deps.store.update_transaction(released_auth).await?;

    let expected_from = job.status;
    let target = JobStatus::Paid;
    if expected_from != target {
        deps.store.update_status(job_id, expected_from, target, JobFieldUpdate::default()).await?;
    }

    Ok(capture_txn)
}

/// `RefundPayment`: refunds up to the captured amount, defaulting to a full
/// refund of whatever remains outstanding. Fully refunding a job cancels it.
pub async fn refund_payment(
    deps: &WorkflowDeps,
    job_id: JobId,
    amount: Option<Decimal>,
    idempotency_key: String,
) -> Result<Transaction, EscrowError> {
    let job = deps.store.get_job(job_id).await?;
    let transactions = deps.store.list_transactions(job_id).await?;

    let capture = transactions
        .iter()
        .find(|t| t.transaction_type == TransactionType::Capture && t.status == TransactionStatus::Completed)
        .cloned()
        .ok_or(EscrowError::NoOpenAuthorization(job_id))?;

    let already_refunded: Decimal = transactions
        .iter()
        .filter(|t| t.parent_transaction_id == Some(capture.id))
        .map(|t| t.refund_amount)
        .sum();
    let remaining = capture.amount - already_refunded;
    let requested = amount.unwrap_or(remaining);
    if requested > remaining {
        return Err(EscrowError::RefundExceedsBalance { requested, remaining });
    }

    let response = deps
        .payments
        .refund(RefundRequest {
            charge_id: capture.external_charge_id.clone(),
            payment_id: capture.external_payment_id.clone(),
            amount: requested,
            idempotency_key,
        })
        .await?;

    let now = Utc::now();
    let refund_txn = Transaction {
        id: TransactionId::new(),
        job_id,
        consumer_id: capture.consumer_id,
        worker_id: capture.worker_id,
        transaction_type: TransactionType::Refund,
        status: TransactionStatus::Completed,
        amount: requested,
        capture_amount: None,
        refund_amount: requested,
        processing_fee: Decimal::ZERO,
        platform_fee: Decimal::ZERO,
        net_amount: Decimal::ZERO,
        currency: capture.currency.clone(),
        external_charge_id: capture.external_charge_id.clone(),
        external_payment_id: capture.external_payment_id.clone(),
        external_source_token: None,
        external_refund_id: Some(response.refund_id),
        authorized_at: None,
        authorization_expires_at: None,
        captured_at: None,
        refunded_at: Some(now),
        escrow_held_at: None,
        escrow_released_at: None,
        parent_transaction_id: Some(capture.id),
        created_at: now,
        updated_at: now,
    };
    let refund_txn = deps.store.insert_transaction(refund_txn).await?;

    if requested == remaining && matches!(job.status, JobStatus::Paid | JobStatus::ReviewPending) {
        deps.store.update_status(job_id, job.status, JobStatus::Cancelled, JobFieldUpdate::default()).await?;
    }

    Ok(refund_txn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::matcher::NullMatcher;
    use jobflow_payments::FakeProcessor;
    use jobflow_store::{InMemoryJobStore, JobStore, NewJob};
    use jobflow_types::PaySpec;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

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
    async fn authorize_payment_rejects_jobs_past_offer_sent() {
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

        let result = authorize_payment(&deps, job_id, "tok_1".into(), "idem-auth-1".into()).await;
        assert!(matches!(result, Err(EscrowError::InvalidState(_, JobStatus::Accepted))));
    }

    #[tokio::test]
    async fn capture_then_refund_round_trips_the_full_amount() {
        let deps = deps();
        let job_id = posted_job(&deps).await;
        authorize_payment(&deps, job_id, "tok_1".into(), "idem-auth-1".into()).await.unwrap();

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

        let capture = capture_payment(&deps, job_id, "idem-cap-1".into()).await.unwrap();
        assert_eq!(capture.net_amount, dec!(87.30));
        assert_eq!(deps.store.get_job(job_id).await.unwrap().status, JobStatus::Paid);

        let refund = refund_payment(&deps, job_id, None, "idem-refund-1".into()).await.unwrap();
        assert_eq!(refund.refund_amount, dec!(100.00));
        assert_eq!(deps.store.get_job(job_id).await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn refund_rejects_amount_past_remaining_balance() {
        let deps = deps();
        let job_id = posted_job(&deps).await;
        authorize_payment(&deps, job_id, "tok_1".into(), "idem-auth-1".into()).await.unwrap();
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
        capture_payment(&deps, job_id, "idem-cap-1".into()).await.unwrap();

        let result = refund_payment(&deps, job_id, Some(dec!(200.00)), "idem-refund-1".into()).await;
        assert!(matches!(result, Err(EscrowError::RefundExceedsBalance { .. })));
    }
}
