//! Payment adapter (C2) and fee calculator (C3).
//!
//! `adapter` defines the `PaymentProcessor` trait object boundary and its
//! request/response shapes; `clover` and `fake` are the two implementations
//! (HTTP client stub, in-memory test double); `fees` is the pure
//! platform/processing/net split used by the escrow capture path.

pub mod adapter;
pub mod clover;
pub mod error;
pub mod fake;
pub mod fees;

pub use adapter::{
    AuthorizeRequest, AuthorizeResponse, CaptureRequest, CaptureResponse, PaymentProcessor,
    RefundRequest, RefundResponse, TokenizeRequest, TokenizeResponse, VoidRequest,
};
pub use clover::{CloverAdapter, CloverConfig};
pub use error::{PaymentError, PaymentErrorKind};
pub use fake::FakeProcessor;
pub use fees::{calculate as calculate_fees, FeeBreakdown, FeeSchedule};
