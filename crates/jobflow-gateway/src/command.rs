//! §6's command surface: validated request/result structs carried over
//! whatever transport sits in front of this crate. Transport framing
//! (HTTP routing, JSON request bodies) is explicitly out of scope — callers
//! hand the gateway an already-authenticated [`Principal`] and a typed
//! command, and get a typed result or [`GatewayError`] back.

use chrono::{DateTime, Utc};
use jobflow_types::{GeoLocation, JobId, JobStatus, PaySpec, Principal, Transaction, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct CreateJobCommand {
    pub principal: Principal,
    pub title: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub location: Option<GeoLocation>,
    pub pay_spec: PaySpec,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobResult {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Clone, Copy, Debug)]
pub struct AcceptOfferCommand {
    pub principal: Principal,
    pub job_id: JobId,
}

#[derive(Clone, Copy, Debug)]
pub struct RejectOfferCommand {
    pub principal: Principal,
    pub job_id: JobId,
}

#[derive(Clone, Copy, Debug)]
pub struct StartJobCommand {
    pub principal: Principal,
    pub job_id: JobId,
}

/// Shared `ok`-shaped result for the commands that only confirm a signal
/// was accepted for delivery, not that the workflow has reacted to it yet
/// (§4.7 step 5: synchronous outcome, no promise of workflow completion).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub job_id: JobId,
}

#[derive(Clone, Copy, Debug)]
pub struct CompleteJobCommand {
    pub principal: Principal,
    pub job_id: JobId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteJobResult {
    pub worker_confirmed: bool,
    pub consumer_confirmed: bool,
    pub fully_completed: bool,
}

#[derive(Clone, Debug)]
pub struct SubmitReviewCommand {
    pub principal: Principal,
    pub job_id: JobId,
    pub rating: u8,
    pub text: String,
    pub is_public: bool,
}

#[derive(Clone, Debug)]
pub struct AuthorizePaymentCommand {
    pub principal: Principal,
    pub job_id: JobId,
    pub amount: Decimal,
    pub source_token: String,
    /// §4.6's escrow note: "emits signal offer_response(accepted) ... iff
    /// the command carries that intent" — lets a consumer fund escrow and
    /// accept the offer in one round trip instead of two commands.
    pub accept_offer: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizePaymentResult {
    pub transaction: Transaction,
}

#[derive(Clone, Copy, Debug)]
pub struct CapturePaymentCommand {
    pub principal: Principal,
    pub transaction_id: TransactionId,
    /// Optional: must equal the full authorized amount if present. Partial
    /// capture is not implemented; a mismatched amount is `InvalidInput`.
    pub amount: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapturePaymentResult {
    pub transaction: Transaction,
}

#[derive(Clone, Debug)]
pub struct RefundPaymentCommand {
    pub principal: Principal,
    pub transaction_id: TransactionId,
    pub amount: Option<Decimal>,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefundPaymentResult {
    pub transaction: Transaction,
}

#[derive(Clone, Copy, Debug)]
pub struct GetPaymentSummaryCommand {
    pub principal: Principal,
    pub job_id: JobId,
}
