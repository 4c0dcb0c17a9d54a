//! Request/response shapes and the `PaymentProcessor` trait object boundary.
//!
//! §4.2: every operation is idempotent on a caller-supplied key. Card data
//! never crosses this boundary persisted — `tokenize` is the only operation
//! that sees it, and it returns an opaque token immediately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::PaymentError;

#[derive(Clone, Debug, PartialEq)]
pub struct TokenizeRequest {
    pub card_number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TokenizeResponse {
    pub source_token: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizeRequest {
    pub source_token: String,
    pub amount: Decimal,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizeResponse {
    pub charge_id: String,
    pub authorization_expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub charge_id: String,
    pub amount: Decimal,
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureResponse {
    pub payment_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefundRequest {
    pub charge_id: Option<String>,
    pub payment_id: Option<String>,
    pub amount: Decimal,
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefundResponse {
    pub refund_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VoidRequest {
    pub charge_id: String,
    pub idempotency_key: String,
}

/// Opaque client to the external payment processor.
///
/// `jobflow-workflow` depends on this trait, not on a concrete adapter, so
/// its tests run against `FakeProcessor` without a live Clover-style
/// processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn tokenize(&self, request: TokenizeRequest) -> Result<TokenizeResponse, PaymentError>;

    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeResponse, PaymentError>;

    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResponse, PaymentError>;

    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, PaymentError>;

    async fn void(&self, request: VoidRequest) -> Result<(), PaymentError>;
}
