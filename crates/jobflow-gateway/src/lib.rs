//! The Command Gateway (§4.7, C7): the single entry point inbound commands
//! go through before touching a job's workflow execution. Validates input,
//! enforces the role/party preconditions in §6's command table, then
//! either starts a lifecycle, sends a signal, or invokes an escrow
//! activity directly.
//!
//! Transport (HTTP, gRPC, whatever `jobflow-server` binds) lives outside
//! this crate; `CommandGateway` only knows about typed commands and an
//! already-authenticated [`jobflow_types::Principal`].

mod command;
mod error;
mod gateway;
mod runtime;

pub use command::{
    AcceptOfferCommand, Ack, AuthorizePaymentCommand, AuthorizePaymentResult, CapturePaymentCommand,
    CapturePaymentResult, CompleteJobCommand, CompleteJobResult, CreateJobCommand, CreateJobResult,
    GetPaymentSummaryCommand, RefundPaymentCommand, RefundPaymentResult, RejectOfferCommand,
    StartJobCommand, SubmitReviewCommand,
};
pub use error::GatewayError;
pub use gateway::CommandGateway;
pub use runtime::WorkflowRuntime;
