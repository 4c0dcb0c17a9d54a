use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category for a payment adapter call, used for retry
/// policy decisions by `jobflow-engine::WorkflowCtx::execute_activity`.
///
/// Mirrors the `ExecutionError { kind, message, detail }` shape
/// (`jobflow_types::ErrorKind`) at the payment boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentErrorKind {
    /// Network failure or 5xx from the processor. Safe to retry.
    Retryable,
    /// Card declined, insufficient funds. A terminal business outcome.
    PermanentRejected,
    /// Malformed request; retrying would reproduce the same rejection.
    InvalidRequest,
    /// The idempotency key was already applied. Callers treat this as
    /// success and use the returned prior result.
    AlreadyApplied,
}

impl PaymentErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct PaymentError {
    pub kind: PaymentErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl PaymentError {
    pub fn new(kind: PaymentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Folds a payment-adapter failure into the engine's generic
/// `ExecutionError`, so a payment activity closure can be handed directly
/// to `WorkflowCtx::execute_activity`. `Retryable` is the only kind that
/// survives as retryable; everything else — including `AlreadyApplied`,
/// which by this point has already failed to resolve to a cached success —
/// is folded into `Rejected` so the retry loop short-circuits.
impl From<PaymentError> for jobflow_types::ExecutionError {
    fn from(error: PaymentError) -> Self {
        let kind = match error.kind {
            PaymentErrorKind::Retryable => jobflow_types::ErrorKind::ActivityFailure,
            PaymentErrorKind::PermanentRejected
            | PaymentErrorKind::InvalidRequest
            | PaymentErrorKind::AlreadyApplied => jobflow_types::ErrorKind::Rejected,
        };
        let mut execution_error = jobflow_types::ExecutionError::new(kind, error.message);
        if let Some(detail) = error.detail {
            execution_error = execution_error.with_detail(detail);
        }
        execution_error
    }
}
