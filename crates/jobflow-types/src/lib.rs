pub mod domain;
pub mod error;
pub mod event;
pub mod execution_error;
pub mod journal;
pub mod payload;
pub mod promise_id;
pub mod transitions;

pub use domain::{
    ActorRole, EscrowStatus, GeoLocation, Job, JobId, JobStatus, PaySpec, PaymentEvent,
    PaymentEventId, PaymentEventStatus, PaymentEventType, PaymentSplit, PaymentSplitId,
    PaymentSplitType, PaymentSummary, Principal, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId,
};
pub use error::DomainError;
pub use event::{
    AwaitKind, EventType, InvokeKind, NonRetryableKind, RetryPolicy, SignalDeliveryId,
};
pub use execution_error::{ErrorKind, ExecutionError};
pub use journal::{ExecutionJournal, ExecutionStatus, JournalEntry};
pub use payload::{Codec, Payload};
pub use promise_id::{ExecutionId, MAX_CALL_DEPTH, PromiseId};
