//! Durable execution journal for job workflows.
//!
//! A workflow execution (job lifecycle, payment retry loop, ...) is nothing
//! more than an append-only sequence of [`jobflow_types::JournalEntry`]
//! values. This crate is the layer that makes that sequence trustworthy:
//!
//! - [`invariants`] checks each entry against the structural, side-effect,
//!   and job-status-graph rules that a well-formed job-lifecycle journal
//!   must obey, both incrementally (at append time) and in batch (for
//!   recovery).
//! - [`status`] folds a journal into the current [`jobflow_types::ExecutionStatus`]
//!   and decides whether a job blocked on worker/client confirmation can resume.
//! - [`replay`] builds the promise-keyed cache that lets a re-executed
//!   workflow function observe exactly the values it saw the first time,
//!   instead of re-running side effects.
//!
//! None of these modules talk to a database; `jobflow-store` is responsible
//! for persisting entries. This crate only knows how to interpret them.

pub mod error;
pub mod invariants;
pub mod replay;
pub mod status;

pub use error::{JournalError, JournalViolation};
pub use invariants::{InvariantState, validate_journal};
pub use replay::{CachedResult, ReplayCache};
pub use status::{can_resume, completed_promises, derive_status, wait_resolvers};
