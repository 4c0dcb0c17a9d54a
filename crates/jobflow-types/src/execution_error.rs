use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical category for a workflow or activity failure.
///
/// Coarse-grained on purpose: it drives the retry policy in
/// `jobflow_engine::WorkflowCtx::execute_activity` and is the dimension
/// logs/metrics group failures by, not a place to encode every activity's
/// own error taxonomy (payment failures keep their own
/// `jobflow_payments::PaymentErrorKind` and fold down to this at the
/// boundary).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A scheduled activity (a store write, a payment adapter call, a
    /// matcher lookup) failed at its own boundary.
    ///
    /// Typically retryable when the failure is transient — a dropped
    /// connection, a 5xx from the payment processor.
    ActivityFailure,
    /// The operation was rejected by job-lifecycle business rules: an
    /// invalid status transition, a job or transaction that doesn't exist,
    /// a conflicting concurrent update.
    ///
    /// Non-retryable — retrying reproduces the same rejection.
    Rejected,
    /// Replay diverged from the recorded journal (the workflow function
    /// made a different decision than its history says it did).
    ///
    /// Indicates a determinism invariant violation, not a transient fault.
    Nondeterminism,
    /// Catch-all bucket when no specific category applies.
    Uncategorized,
}

/// Structured payload for execution failures and invoke retries.
///
/// This replaces raw string errors with a stable shape that is easy to:
/// - classify (`kind`) for retry/policy decisions,
/// - render (`message`) for user-facing summaries,
/// - enrich (`detail`) with optional low-level diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Coarse failure category used by policy and observability.
    pub kind: ErrorKind,
    /// Human-readable summary safe to display in normal logs and UIs.
    pub message: String,
    /// Optional diagnostic detail for debugging and deep triage.
    ///
    /// Prefer concise, actionable context. Omit when no extra detail exists.
    pub detail: Option<String>,
}

impl ExecutionError {
    /// Creates an [`ExecutionError`] with required fields only.
    ///
    /// Use [`Self::with_detail`] to attach optional diagnostic context.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Creates an [`ExecutionError`] with all fields in a single call.
    ///
    /// This is a convenience constructor for call sites that always have
    /// diagnostic detail available and do not need fluent chaining.
    /// Equivalent to `Self::new(kind, message).with_detail(detail)`.
    pub fn new_with_detail(
        kind: ErrorKind,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    /// Adds or replaces the optional diagnostic detail.
    ///
    /// This is a fluent helper so callers can write:
    /// `ExecutionError::new(kind, message).with_detail(detail)`.
    ///
    /// If called multiple times, the last value wins.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(ref detail) = self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionError {}
