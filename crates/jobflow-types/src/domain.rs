//! The relational domain model: `Job`, `Transaction`, `PaymentSplit`,
//! `PaymentEvent`.
//!
//! These are the durable aggregate and its payment-facing satellites,
//! persisted by `jobflow_store` and mutated exclusively through the
//! workflow instance that owns a given job (external actors only ever
//! reach them via signals or, for the escrow sub-protocol, via the Command
//! Gateway's direct activities).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(JobId);
uuid_id!(UserId);
uuid_id!(TransactionId);
uuid_id!(PaymentSplitId);
uuid_id!(PaymentEventId);

/// The job's externally visible lifecycle status.
///
/// Transitions are owned exclusively by the workflow instance bound to the
/// job; see `crate::transitions::is_allowed` for the full edge set enforced
/// by `jobflow_store::JobStore::update_status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Posted,
    OfferSent,
    Accepted,
    Rejected,
    WorkerAssigned,
    Scheduled,
    InProgress,
    Completed,
    Paid,
    ReviewPending,
    Closed,
    Cancelled,
    NoWorkerAvailable,
    PaymentFailed,
}

impl JobStatus {
    /// `worker_id` must be NULL iff status is one of these.
    pub fn requires_no_worker(self) -> bool {
        matches!(
            self,
            Self::Posted | Self::Cancelled | Self::NoWorkerAvailable
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Cancelled | Self::NoWorkerAvailable
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Posted => "posted",
            Self::OfferSent => "offer_sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::WorkerAssigned => "worker_assigned",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Paid => "paid",
            Self::ReviewPending => "review_pending",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::NoWorkerAvailable => "no_worker_available",
            Self::PaymentFailed => "payment_failed",
        };
        write!(f, "{s}")
    }
}

/// Either an hourly rate or a flat total; exactly one is populated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PaySpec {
    PerHour(Decimal),
    Total(Decimal),
}

impl PaySpec {
    /// The total amount to authorize for this job.
    ///
    /// `PerHour` requires an estimated duration in hours; callers that only
    /// have a `Total` ignore the hint.
    pub fn estimated_total(&self, estimated_hours: Option<Decimal>) -> Option<Decimal> {
        match self {
            Self::Total(amount) => Some(*amount),
            Self::PerHour(rate) => estimated_hours.map(|hours| rate * hours),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// The durable aggregate: a posted job and its current lifecycle state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub sequence_number: i64,

    pub consumer_id: UserId,
    pub worker_id: Option<UserId>,

    pub title: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub location: Option<GeoLocation>,

    pub pay_spec: PaySpec,

    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub worker_completed_at: Option<DateTime<Utc>>,
    pub consumer_completed_at: Option<DateTime<Utc>>,

    pub status: JobStatus,

    pub workflow_id: Option<Uuid>,
    pub workflow_run_id: Option<Uuid>,
    pub workflow_started_at: Option<DateTime<Utc>>,
    pub workflow_completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// §3 invariant: `status = completed` iff both completion timestamps set.
    pub fn is_dual_completed(&self) -> bool {
        self.worker_completed_at.is_some() && self.consumer_completed_at.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
pub enum TransactionType {
    Authorization,
    Capture,
    Refund,
    Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// A payment-processor-facing record: one row per authorize/capture/refund/void.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    pub job_id: JobId,
    pub consumer_id: UserId,
    pub worker_id: Option<UserId>,

    pub transaction_type: TransactionType,
    pub status: TransactionStatus,

    pub amount: Decimal,
    pub capture_amount: Option<Decimal>,
    pub refund_amount: Decimal,
    pub processing_fee: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    pub currency: String,

    pub external_charge_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub external_source_token: Option<String>,
    pub external_refund_id: Option<String>,

    pub authorized_at: Option<DateTime<Utc>>,
    pub authorization_expires_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub escrow_held_at: Option<DateTime<Utc>>,
    pub escrow_released_at: Option<DateTime<Utc>>,

    pub parent_transaction_id: Option<TransactionId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// §8: for all authorizations A, Σ(capture.capture_amount) ≤ A.amount is
    /// enforced by the store at capture time; this just reports how much
    /// headroom remains for a single already-loaded row.
    pub fn remaining_capturable(&self) -> Decimal {
        self.amount - self.capture_amount.unwrap_or(Decimal::ZERO)
    }

    pub fn remaining_refundable(&self) -> Decimal {
        self.capture_amount.unwrap_or(Decimal::ZERO) - self.refund_amount
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_split_type", rename_all = "snake_case")]
pub enum PaymentSplitType {
    PlatformFee,
    WorkerPayment,
    Tax,
    Tip,
    Other,
}

/// A breakdown row, created on successful capture. Σ(splits) == capture_amount.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentSplit {
    pub id: PaymentSplitId,
    pub transaction_id: TransactionId,
    pub split_type: PaymentSplitType,
    pub amount: Decimal,
    pub recipient_id: Option<UserId>,
    pub percentage: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_event_type", rename_all = "snake_case")]
pub enum PaymentEventType {
    Tokenize,
    Authorize,
    Capture,
    Refund,
    Void,
    WorkflowStarted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_event_status", rename_all = "snake_case")]
pub enum PaymentEventStatus {
    Requested,
    Succeeded,
    Retryable,
    Failed,
}

/// Append-only audit log entry for a transaction (or, for
/// `WorkflowStarted`, for the job itself before any transaction exists).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentEvent {
    pub id: PaymentEventId,
    pub transaction_id: Option<TransactionId>,
    pub job_id: JobId,
    pub event_type: PaymentEventType,
    pub event_status: PaymentEventStatus,
    pub processor_response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub idempotency_key: String,
    pub actor_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// Read-only aggregation used by `GetPaymentSummary`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub job_id: JobId,
    pub authorized_total: Decimal,
    pub captured_total: Decimal,
    pub refunded_total: Decimal,
    pub platform_fee_total: Decimal,
    pub processing_fee_total: Decimal,
    pub net_worker_total: Decimal,
    pub escrow_status: EscrowStatus,
}

/// Coarse escrow state for a job's payment summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    None,
    Held,
    Released,
    Refunded,
}

/// The role asserting an action, as attached by the (out-of-scope)
/// authentication middleware before a command reaches the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRole {
    Consumer,
    Worker,
    Admin,
}

/// An authenticated principal attached to an inbound command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: ActorRole,
}
