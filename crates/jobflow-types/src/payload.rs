use serde::{Deserialize, Serialize};

/// Codec used to encode/decode a [`Payload`]'s bytes.
///
/// Activity inputs/results and workflow inputs are journaled as `Payload`,
/// so the codec travels with the bytes rather than being inferred from the
/// call site. `jobflow-engine` only ever produces `Json` today; `Cbor` and
/// `Borsh` are carried so a future activity boundary (e.g. a binary payment
/// processor webhook) isn't blocked on adding a new wire format here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    Cbor,
    Json,
    Borsh,
}

/// Opaque bytes with an associated codec.
///
/// Used for every value that crosses a journal boundary: activity inputs
/// and results, workflow inputs, signal payloads, `continue_as_new`
/// carryover. Keeping this generic (rather than a typed union per activity)
/// is what lets `jobflow-journal` store and replay history without knowing
/// the job-lifecycle domain types at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub codec: Codec,
}

impl Payload {
    /// Create a payload from raw bytes and their codec.
    pub fn new(bytes: Vec<u8>, codec: Codec) -> Self {
        Self { bytes, codec }
    }
}
