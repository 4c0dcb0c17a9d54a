//! The relational projection (§3, §4.4): Postgres-backed storage for jobs,
//! transactions, payment splits, and the payment audit log, behind the
//! `JobStore` trait so `jobflow-workflow` never speaks SQL directly.
//!
//! `journal_store` is the companion persistence layer for
//! `jobflow_engine`'s workflow event journals (§6) — a separate trait
//! because its key (`workflow_id`) and its consumer (the engine, not the
//! domain model) are both unrelated to `JobStore`'s.

mod error;
mod journal_store;
mod repository;
mod schema;

pub use error::StoreError;
pub use journal_store::{InMemoryJournalStore, JournalStore, PgJournalStore};
pub use repository::{
    DualCompletion, InMemoryJobStore, JobFieldUpdate, JobStore, NewJob, PgJobStore,
};
pub use schema::{JobRow, pay_spec_columns};
