//! `JobStore`: the relational projection's write/read surface (§4.4).
//!
//! `PgJobStore` is the production implementation over a `sqlx::PgPool`.
//! `InMemoryJobStore` reimplements the same contract over a `Mutex`-guarded
//! map for tests that don't stand up Postgres.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobflow_types::{
    ActorRole, EscrowStatus, GeoLocation, Job, JobId, JobStatus, PaySpec, PaymentEvent,
    PaymentSplit, PaymentSummary, Transaction, TransactionId, TransactionStatus, TransactionType,
    UserId, transitions,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::schema::{JobRow, pay_spec_columns};

/// The fields `create_job` needs; everything else starts NULL/unset.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub consumer_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub location: Option<GeoLocation>,
    pub pay_spec: PaySpec,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
}

/// Optional columns an `update_status` call may set alongside the
/// transition itself. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobFieldUpdate {
    pub worker_id: Option<UserId>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub workflow_id: Option<Uuid>,
    pub workflow_run_id: Option<Uuid>,
    pub workflow_started_at: Option<DateTime<Utc>>,
    pub workflow_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualCompletion {
    pub both_confirmed: bool,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, input: NewJob) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: JobId) -> Result<Job, StoreError>;

    /// Conditional update: rejected with `Conflict` if `job_id`'s current
    /// status isn't `expected_from`, and with `InvalidTransition` before
    /// ever touching storage if `expected_from -> to` isn't an allowed edge.
    async fn update_status(
        &self,
        job_id: JobId,
        expected_from: JobStatus,
        to: JobStatus,
        fields: JobFieldUpdate,
    ) -> Result<Job, StoreError>;

    /// Assigns the matched worker, transitioning `accepted -> worker_assigned`
    /// under a row lock. Rejects with `Conflict` if the job isn't in
    /// `accepted` or already has a worker.
    async fn assign_worker(&self, job_id: JobId, worker_id: UserId) -> Result<Job, StoreError> {
        let fields = JobFieldUpdate {
            worker_id: Some(worker_id),
            ..Default::default()
        };
        self.update_status(job_id, JobStatus::Accepted, JobStatus::WorkerAssigned, fields)
            .await
    }

    /// Records one side's completion confirmation; idempotent per
    /// `(job_id, actor_role)`. Returns whether both sides have now
    /// confirmed (§3: `status = completed` iff both timestamps are set).
    async fn record_completion(
        &self,
        job_id: JobId,
        actor_role: ActorRole,
        at: DateTime<Utc>,
    ) -> Result<DualCompletion, StoreError>;

    /// Every job whose status isn't terminal (`JobStatus::is_terminal`):
    /// the set a restart's recovery sweep needs to re-hydrate a workflow
    /// execution for, since a terminal job's execution has nothing left to
    /// resume.
    async fn list_resumable(&self) -> Result<Vec<Job>, StoreError>;

    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError>;
    async fn update_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError>;
    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction, StoreError>;
    async fn list_transactions(&self, job_id: JobId) -> Result<Vec<Transaction>, StoreError>;
    async fn insert_payment_split(&self, split: PaymentSplit) -> Result<PaymentSplit, StoreError>;
    async fn insert_payment_event(&self, event: PaymentEvent) -> Result<PaymentEvent, StoreError>;

    /// Aggregates §4.4's payment summary from `list_transactions`. Backends
    /// may override this with a single query; the default is correct for
    /// any backend that only implements the required methods above.
    async fn get_payment_summary(&self, job_id: JobId) -> Result<PaymentSummary, StoreError> {
        let transactions = self.list_transactions(job_id).await?;
        let mut summary = summarize(&transactions);
        summary.job_id = job_id;
        Ok(summary)
    }
}

fn check_edge(from: JobStatus, to: JobStatus) -> Result<(), StoreError> {
    if transitions::is_allowed(from, to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition(format!("{from} -> {to}")))
    }
}

fn summarize(transactions: &[Transaction]) -> PaymentSummary {
    let job_id = transactions
        .first()
        .map(|t| t.job_id)
        .unwrap_or_else(JobId::new);

    let mut summary = PaymentSummary {
        job_id,
        authorized_total: Decimal::ZERO,
        captured_total: Decimal::ZERO,
        refunded_total: Decimal::ZERO,
        platform_fee_total: Decimal::ZERO,
        processing_fee_total: Decimal::ZERO,
        net_worker_total: Decimal::ZERO,
        escrow_status: EscrowStatus::None,
    };

    let mut any_authorized = false;
    let mut any_captured = false;
    let mut any_refunded = false;

    for txn in transactions {
        if txn.status != TransactionStatus::Completed {
            continue;
        }
        summary.refunded_total += txn.refund_amount;
        if txn.refund_amount > Decimal::ZERO {
            any_refunded = true;
        }
        match txn.transaction_type {
            TransactionType::Authorization => {
                summary.authorized_total += txn.amount;
                any_authorized = true;
            }
            TransactionType::Capture => {
                summary.captured_total += txn.capture_amount.unwrap_or(Decimal::ZERO);
                summary.platform_fee_total += txn.platform_fee;
                summary.processing_fee_total += txn.processing_fee;
                summary.net_worker_total += txn.net_amount;
                any_captured = true;
            }
            TransactionType::Refund | TransactionType::Void => {}
        }
    }

    summary.escrow_status = if any_refunded {
        EscrowStatus::Refunded
    } else if any_captured {
        EscrowStatus::Released
    } else if any_authorized {
        EscrowStatus::Held
    } else {
        EscrowStatus::None
    };

    summary
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, input: NewJob) -> Result<Job, StoreError> {
        let (pay_per_hour, pay_total) = pay_spec_columns(&input.pay_spec);
        let (latitude, longitude) = input
            .location
            .map(|l| (Some(l.latitude), Some(l.longitude)))
            .unwrap_or((None, None));

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (
                id, consumer_id, title, description, category, address,
                latitude, longitude, pay_per_hour, pay_total, scheduled_start, scheduled_end, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.consumer_id.0)
        .bind(input.title)
        .bind(input.description)
        .bind(input.category)
        .bind(input.address)
        .bind(latitude)
        .bind(longitude)
        .bind(pay_per_hour)
        .bind(pay_total)
        .bind(input.scheduled_start)
        .bind(input.scheduled_end)
        .bind(JobStatus::Posted)
        .fetch_one(&self.pool)
        .await?;

        Job::try_from(row)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;
        Job::try_from(row)
    }

    async fn update_status(
        &self,
        job_id: JobId,
        expected_from: JobStatus,
        to: JobStatus,
        fields: JobFieldUpdate,
    ) -> Result<Job, StoreError> {
        check_edge(expected_from, to)?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs SET
                status = $1,
                worker_id = COALESCE($2, worker_id),
                scheduled_start = COALESCE($3, scheduled_start),
                scheduled_end = COALESCE($4, scheduled_end),
                actual_start = COALESCE($5, actual_start),
                actual_end = COALESCE($6, actual_end),
                workflow_id = COALESCE($7, workflow_id),
                workflow_run_id = COALESCE($8, workflow_run_id),
                workflow_started_at = COALESCE($9, workflow_started_at),
                workflow_completed_at = COALESCE($10, workflow_completed_at),
                updated_at = now()
            WHERE id = $11 AND status = $12
            RETURNING *
            "#,
        )
        .bind(to)
        .bind(fields.worker_id.map(|id| id.0))
        .bind(fields.scheduled_start)
        .bind(fields.scheduled_end)
        .bind(fields.actual_start)
        .bind(fields.actual_end)
        .bind(fields.workflow_id)
        .bind(fields.workflow_run_id)
        .bind(fields.workflow_started_at)
        .bind(fields.workflow_completed_at)
        .bind(job_id.0)
        .bind(expected_from)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            StoreError::Conflict(format!("job {job_id} is not in status {expected_from}"))
        })?;

        Job::try_from(row)
    }

    async fn record_completion(
        &self,
        job_id: JobId,
        actor_role: ActorRole,
        at: DateTime<Utc>,
    ) -> Result<DualCompletion, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;

        let (worker_completed_at, consumer_completed_at) = match actor_role {
            ActorRole::Worker => (Some(row.worker_completed_at.unwrap_or(at)), row.consumer_completed_at),
            ActorRole::Consumer | ActorRole::Admin => {
                (row.worker_completed_at, Some(row.consumer_completed_at.unwrap_or(at)))
            }
        };

        sqlx::query(
            "UPDATE jobs SET worker_completed_at = $1, consumer_completed_at = $2, updated_at = now() WHERE id = $3",
        )
        .bind(worker_completed_at)
        .bind(consumer_completed_at)
        .bind(job_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DualCompletion {
            both_confirmed: worker_completed_at.is_some() && consumer_completed_at.is_some(),
        })
    }

    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError> {
        sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                id, job_id, consumer_id, worker_id, transaction_type, status,
                amount, capture_amount, refund_amount, processing_fee, platform_fee,
                net_amount, currency, external_charge_id, external_payment_id,
                external_source_token, external_refund_id, authorized_at,
                authorization_expires_at, captured_at, refunded_at, escrow_held_at,
                escrow_released_at, parent_transaction_id
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            RETURNING *
            "#,
        )
        .bind(transaction.id.0)
        .bind(transaction.job_id.0)
        .bind(transaction.consumer_id.0)
        .bind(transaction.worker_id.map(|id| id.0))
        .bind(transaction.transaction_type)
        .bind(transaction.status)
        .bind(transaction.amount)
        .bind(transaction.capture_amount)
        .bind(transaction.refund_amount)
        .bind(transaction.processing_fee)
        .bind(transaction.platform_fee)
        .bind(transaction.net_amount)
        .bind(transaction.currency)
        .bind(transaction.external_charge_id)
        .bind(transaction.external_payment_id)
        .bind(transaction.external_source_token)
        .bind(transaction.external_refund_id)
        .bind(transaction.authorized_at)
        .bind(transaction.authorization_expires_at)
        .bind(transaction.captured_at)
        .bind(transaction.refunded_at)
        .bind(transaction.escrow_held_at)
        .bind(transaction.escrow_released_at)
        .bind(transaction.parent_transaction_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)
    }

    async fn update_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions SET
                status = $1, capture_amount = $2, refund_amount = $3,
                processing_fee = $4, platform_fee = $5, net_amount = $6,
                external_charge_id = $7, captured_at = $8, refunded_at = $9,
                escrow_held_at = $10, escrow_released_at = $11, updated_at = now()
            WHERE id = $12
            RETURNING *
            "#,
        )
        .bind(transaction.status)
        .bind(transaction.capture_amount)
        .bind(transaction.refund_amount)
        .bind(transaction.processing_fee)
        .bind(transaction.platform_fee)
        .bind(transaction.net_amount)
        .bind(transaction.external_charge_id)
        .bind(transaction.captured_at)
        .bind(transaction.refunded_at)
        .bind(transaction.escrow_held_at)
        .bind(transaction.escrow_released_at)
        .bind(transaction.id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("transaction {}", transaction.id)))
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction, StoreError> {
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(transaction_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction {transaction_id}")))
    }

    async fn insert_payment_split(&self, split: PaymentSplit) -> Result<PaymentSplit, StoreError> {
        sqlx::query_as::<_, PaymentSplit>(
            r#"
            INSERT INTO payment_splits (id, transaction_id, split_type, amount, recipient_id, percentage)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(split.id.0)
        .bind(split.transaction_id.0)
        .bind(split.split_type)
        .bind(split.amount)
        .bind(split.recipient_id.map(|id| id.0))
        .bind(split.percentage)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)
    }

    async fn insert_payment_event(&self, event: PaymentEvent) -> Result<PaymentEvent, StoreError> {
        sqlx::query_as::<_, PaymentEvent>(
            r#"
            INSERT INTO payment_events (
                id, transaction_id, job_id, event_type, event_status,
                processor_response, error_message, idempotency_key, actor_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (idempotency_key, event_type) DO UPDATE SET event_type = EXCLUDED.event_type
            RETURNING *
            "#,
        )
        .bind(event.id.0)
        .bind(event.transaction_id.map(|id| id.0))
        .bind(event.job_id.0)
        .bind(event.event_type)
        .bind(event.event_status)
        .bind(event.processor_response)
        .bind(event.error_message)
        .bind(event.idempotency_key)
        .bind(event.actor_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)
    }

    async fn list_transactions(&self, job_id: JobId) -> Result<Vec<Transaction>, StoreError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE job_id = $1 ORDER BY created_at",
        )
        .bind(job_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn list_resumable(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status NOT IN ($1, $2, $3) ORDER BY created_at",
        )
        .bind(JobStatus::Closed)
        .bind(JobStatus::Cancelled)
        .bind(JobStatus::NoWorkerAvailable)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Job::try_from).collect()
    }
}

/// In-process fake backing `JobStore`, used by tests that don't stand up a
/// live Postgres instance.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    transactions: Mutex<HashMap<TransactionId, Transaction>>,
    splits: Mutex<Vec<PaymentSplit>>,
    events: Mutex<HashMap<String, PaymentEvent>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, input: NewJob) -> Result<Job, StoreError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let job = Job {
            id: JobId::new(),
            sequence_number: jobs.len() as i64 + 1,
            consumer_id: input.consumer_id,
            worker_id: None,
            title: input.title,
            description: input.description,
            category: input.category,
            address: input.address,
            location: input.location,
            pay_spec: input.pay_spec,
            scheduled_start: input.scheduled_start,
            scheduled_end: input.scheduled_end,
            actual_start: None,
            actual_end: None,
            worker_completed_at: None,
            consumer_completed_at: None,
            status: JobStatus::Posted,
            workflow_id: None,
            workflow_run_id: None,
            workflow_started_at: None,
            workflow_completed_at: None,
            created_at: now,
            updated_at: now,
        };
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))
    }

    async fn update_status(
        &self,
        job_id: JobId,
        expected_from: JobStatus,
        to: JobStatus,
        fields: JobFieldUpdate,
    ) -> Result<Job, StoreError> {
        check_edge(expected_from, to)?;

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;

        if job.status != expected_from {
            return Err(StoreError::Conflict(format!(
                "job {job_id} is not in status {expected_from}"
            )));
        }

        job.status = to;
        if let Some(worker_id) = fields.worker_id {
            job.worker_id = Some(worker_id);
        }
        if let Some(v) = fields.scheduled_start {
            job.scheduled_start = Some(v);
        }
        if let Some(v) = fields.scheduled_end {
            job.scheduled_end = Some(v);
        }
        if let Some(v) = fields.actual_start {
            job.actual_start = Some(v);
        }
        if let Some(v) = fields.actual_end {
            job.actual_end = Some(v);
        }
        if let Some(v) = fields.workflow_id {
            job.workflow_id = Some(v);
        }
        if let Some(v) = fields.workflow_run_id {
            job.workflow_run_id = Some(v);
        }
        if let Some(v) = fields.workflow_started_at {
            job.workflow_started_at = Some(v);
        }
        if let Some(v) = fields.workflow_completed_at {
            job.workflow_completed_at = Some(v);
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn record_completion(
        &self,
        job_id: JobId,
        actor_role: ActorRole,
        at: DateTime<Utc>,
    ) -> Result<DualCompletion, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;

        match actor_role {
            ActorRole::Worker => job.worker_completed_at.get_or_insert(at),
            ActorRole::Consumer | ActorRole::Admin => job.consumer_completed_at.get_or_insert(at),
        };
        job.updated_at = Utc::now();

        Ok(DualCompletion {
            both_confirmed: job.is_dual_completed(),
        })
    }

    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError> {
        self.transactions
            .lock()
            .unwrap()
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn update_transaction(&self, transaction: Transaction) -> Result<Transaction, StoreError> {
        let mut transactions = self.transactions.lock().unwrap();
        if !transactions.contains_key(&transaction.id) {
            return Err(StoreError::NotFound(format!("transaction {}", transaction.id)));
        }
        transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction, StoreError> {
        self.transactions
            .lock()
            .unwrap()
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {transaction_id}")))
    }

    async fn insert_payment_split(&self, split: PaymentSplit) -> Result<PaymentSplit, StoreError> {
        self.splits.lock().unwrap().push(split.clone());
        Ok(split)
    }

    async fn insert_payment_event(&self, event: PaymentEvent) -> Result<PaymentEvent, StoreError> {
        let key = format!("{}:{:?}", event.idempotency_key, event.event_type);
        let mut events = self.events.lock().unwrap();
        let event = events.entry(key).or_insert(event).clone();
        Ok(event)
    }

    async fn list_transactions(&self, job_id: JobId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn list_resumable(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect())
    }
}
