//! In-memory [`PaymentProcessor`] used by tests and documented as the
//! reference test double for `jobflow-workflow`'s own test suite.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::adapter::{
    AuthorizeRequest, AuthorizeResponse, CaptureRequest, CaptureResponse, PaymentProcessor,
    RefundRequest, RefundResponse, TokenizeRequest, TokenizeResponse, VoidRequest,
};
use crate::error::{PaymentError, PaymentErrorKind};

/// Deterministic, idempotency-key-addressed fake of the payment processor.
///
/// Every stateful operation (`authorize`/`capture`/`refund`/`void`) caches
/// its result by idempotency key: a duplicate call with the same key
/// returns the cached result without reapplying the effect, matching §4.2's
/// idempotency contract. `simulate_lost_response` additionally models a
/// processor that actually applied an effect but whose response never
/// reached the caller — the first call with that key still reports
/// `Retryable`, but the effect is already cached, so the retry that follows
/// finds it and returns the prior result (§8 scenario 5).
#[derive(Default)]
pub struct FakeProcessor {
    authorizations: Mutex<HashMap<String, AuthorizeResponse>>,
    captures: Mutex<HashMap<String, CaptureResponse>>,
    refunds: Mutex<HashMap<String, RefundResponse>>,
    voided: Mutex<HashSet<String>>,
    lossy_keys: Mutex<HashSet<String>>,
    declined_tokens: Mutex<HashSet<String>>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call using `idempotency_key` applies its effect and caches
    /// the result, but returns `Retryable` to the caller rather than the
    /// result itself.
    pub fn simulate_lost_response(&self, idempotency_key: impl Into<String>) {
        self.lossy_keys.lock().unwrap().insert(idempotency_key.into());
    }

    /// Any `authorize` call presenting `source_token` is declined.
    pub fn decline_token(&self, source_token: impl Into<String>) {
        self.declined_tokens.lock().unwrap().insert(source_token.into());
    }

    fn maybe_lose(&self, idempotency_key: &str) -> bool {
        self.lossy_keys.lock().unwrap().remove(idempotency_key)
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn tokenize(&self, request: TokenizeRequest) -> Result<TokenizeResponse, PaymentError> {
        if request.card_number.is_empty() {
            return Err(PaymentError::new(
                PaymentErrorKind::InvalidRequest,
                "card number is required",
            ));
        }
        Ok(TokenizeResponse {
            source_token: format!("tok_{}", Uuid::new_v4()),
        })
    }

    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeResponse, PaymentError> {
        if let Some(cached) = self
            .authorizations
            .lock()
            .unwrap()
            .get(&request.idempotency_key)
        {
            return Ok(cached.clone());
        }
        if self
            .declined_tokens
            .lock()
            .unwrap()
            .contains(&request.source_token)
        {
            return Err(PaymentError::new(
                PaymentErrorKind::PermanentRejected,
                "card declined",
            ));
        }
        let response = AuthorizeResponse {
            charge_id: format!("ch_{}", Uuid::new_v4()),
            authorization_expires_at: chrono::Utc::now() + chrono::Duration::days(7),
        };
        self.authorizations
            .lock()
            .unwrap()
            .insert(request.idempotency_key.clone(), response.clone());
        if self.maybe_lose(&request.idempotency_key) {
            return Err(PaymentError::new(
                PaymentErrorKind::Retryable,
                "simulated response loss",
            ));
        }
        Ok(response)
    }

    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResponse, PaymentError> {
        if request.amount.is_zero() {
            return Err(PaymentError::new(
                PaymentErrorKind::InvalidRequest,
                "capture amount must be greater than zero",
            ));
        }
        if let Some(cached) = self.captures.lock().unwrap().get(&request.idempotency_key) {
            return Ok(cached.clone());
        }
        let response = CaptureResponse {
            payment_id: format!("pay_{}", Uuid::new_v4()),
        };
        self.captures
            .lock()
            .unwrap()
            .insert(request.idempotency_key.clone(), response.clone());
        if self.maybe_lose(&request.idempotency_key) {
            return Err(PaymentError::new(
                PaymentErrorKind::Retryable,
                "simulated response loss",
            ));
        }
        Ok(response)
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, PaymentError> {
        if let Some(cached) = self.refunds.lock().unwrap().get(&request.idempotency_key) {
            return Ok(cached.clone());
        }
        let response = RefundResponse {
            refund_id: format!("re_{}", Uuid::new_v4()),
        };
        self.refunds
            .lock()
            .unwrap()
            .insert(request.idempotency_key.clone(), response.clone());
        if self.maybe_lose(&request.idempotency_key) {
            return Err(PaymentError::new(
                PaymentErrorKind::Retryable,
                "simulated response loss",
            ));
        }
        Ok(response)
    }

    async fn void(&self, request: VoidRequest) -> Result<(), PaymentError> {
        if self.voided.lock().unwrap().contains(&request.idempotency_key) {
            return Ok(());
        }
        self.voided.lock().unwrap().insert(request.idempotency_key.clone());
        if self.maybe_lose(&request.idempotency_key) {
            return Err(PaymentError::new(
                PaymentErrorKind::Retryable,
                "simulated response loss",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorize_request(key: &str) -> AuthorizeRequest {
        AuthorizeRequest {
            source_token: "tok_ok".into(),
            amount: rust_decimal_macros::dec!(100.00),
            currency: "USD".into(),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_cached_result() {
        let processor = FakeProcessor::new();
        let first = processor.authorize(authorize_request("k1")).await.unwrap();
        let second = processor.authorize(authorize_request("k1")).await.unwrap();
        assert_eq!(first.charge_id, second.charge_id);
    }

    #[tokio::test]
    async fn declined_token_is_permanently_rejected() {
        let processor = FakeProcessor::new();
        processor.decline_token("tok_bad");
        let mut request = authorize_request("k2");
        request.source_token = "tok_bad".into();
        let err = processor.authorize(request).await.unwrap_err();
        assert_eq!(err.kind, PaymentErrorKind::PermanentRejected);
    }

    #[tokio::test]
    async fn lost_response_then_retry_returns_the_applied_result() {
        let processor = FakeProcessor::new();
        let capture_request = CaptureRequest {
            charge_id: "ch_1".into(),
            amount: rust_decimal_macros::dec!(100.00),
            idempotency_key: "cap-1".into(),
        };
        processor.simulate_lost_response("cap-1");

        let first = processor.capture(capture_request.clone()).await;
        assert_eq!(first.unwrap_err().kind, PaymentErrorKind::Retryable);

        let second = processor.capture(capture_request).await.unwrap();
        let third = processor
            .capture(CaptureRequest {
                charge_id: "ch_1".into(),
                amount: rust_decimal_macros::dec!(100.00),
                idempotency_key: "cap-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(second.payment_id, third.payment_id);
    }

    #[tokio::test]
    async fn zero_amount_capture_is_rejected_at_validation() {
        let processor = FakeProcessor::new();
        let err = processor
            .capture(CaptureRequest {
                charge_id: "ch_1".into(),
                amount: rust_decimal_macros::dec!(0),
                idempotency_key: "cap-zero".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, PaymentErrorKind::InvalidRequest);
    }
}
