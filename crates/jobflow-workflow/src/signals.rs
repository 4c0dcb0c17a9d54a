//! Signal names and payload shapes the lifecycle workflow awaits.
//!
//! §9's signal-vs-activity boundary: anything initiated by a human actor is
//! a signal delivered here by `jobflow-gateway`.

use jobflow_types::{ActorRole, UserId};
use serde::{Deserialize, Serialize};

pub const OFFER_RESPONSE: &str = "offer_response";
pub const JOB_STARTED: &str = "job_started";
pub const COMPLETION: &str = "completion";
pub const REVIEW_SUBMITTED: &str = "review_submitted";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferResponse {
    Accepted,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub role: ActorRole,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmittedSignal {
    pub reviewer: UserId,
    pub rating: u8,
    pub text: String,
    pub is_public: bool,
}
