//! §6/§7's gateway-facing error taxonomy: everything a command handler can
//! return to the caller synchronously.

use jobflow_store::StoreError;
use jobflow_workflow::EscrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("payment rejected: {0}")]
    PaymentRejected(String),
    #[error("payment retryable: {0}")]
    PaymentRetryable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for GatewayError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::InvalidTransition(msg) => Self::InvalidTransition(msg),
            StoreError::InvalidState(msg) => Self::InvalidInput(msg),
            StoreError::Database(err) => Self::InternalError(err.to_string()),
            StoreError::Serialization(err) => Self::InternalError(err.to_string()),
        }
    }
}

impl From<EscrowError> for GatewayError {
    fn from(error: EscrowError) -> Self {
        match error {
            EscrowError::NoOpenAuthorization(job_id) => {
                Self::Conflict(format!("job {job_id} has no open authorization"))
            }
            EscrowError::InvalidState(job_id, status) => {
                Self::Conflict(format!("job {job_id} is not eligible for this operation in status {status}"))
            }
            EscrowError::RefundExceedsBalance { requested, remaining } => Self::InvalidInput(format!(
                "refund amount {requested} exceeds remaining refundable balance {remaining}"
            )),
            EscrowError::Rejected(msg) => Self::PaymentRejected(msg),
            EscrowError::Retryable(msg) => Self::PaymentRetryable(msg),
            EscrowError::InvalidRequest(msg) => Self::InvalidInput(msg),
            EscrowError::Store(err) => err.into(),
        }
    }
}
