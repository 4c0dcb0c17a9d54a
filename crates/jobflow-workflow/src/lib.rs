//! The job lifecycle workflow (§4): durable orchestration for a single job
//! from `posted` through `closed`, built on `jobflow-engine`'s `WorkflowCtx`.
//!
//! `lifecycle` holds the main state machine, `payment_retry` the
//! `continue_as_new` continuation it hands off to on a stuck capture, and
//! `escrow` the Command-Gateway-invoked payment operations that sit outside
//! either workflow's own control flow. `activities` is the shared set of
//! side effects both workflows wrap through `execute_activity`.

mod activities;
mod config;
mod escrow;
mod flush;
mod lifecycle;
mod matcher;
mod payment_retry;
mod signals;

pub use activities::{store_error, MatchOutcome, WorkflowDeps};
pub use config::WorkflowConfig;
pub use escrow::{authorize_payment, capture_payment, refund_payment, EscrowError};
pub use lifecycle::{run as run_lifecycle, JobLifecycleInput};
pub use matcher::{NullMatcher, WorkerMatcher};
pub use payment_retry::{run as run_payment_retry, PaymentRetryInput, WorkflowOutcome};
pub use signals::{
    CompletionSignal, OfferResponse, ReviewSubmittedSignal, COMPLETION, JOB_STARTED,
    OFFER_RESPONSE, REVIEW_SUBMITTED,
};
