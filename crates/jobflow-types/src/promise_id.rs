use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_CALL_DEPTH: usize = 64;

/// Addresses one step of a job's lifecycle execution using Dewey notation.
///
/// `root` identifies the execution — in practice the job's id, zero-extended
/// to 32 bytes (see `jobflow_server::runtime::execution_id_for`). `path`
/// encodes the sequence of child operations scheduled at each depth: the
/// workflow's first activity call is `root.0`, a timer it schedules while
/// waiting on that activity's result is `root.0.0`, and so on. Every
/// `InvokeScheduled`, `TimerScheduled`, and `SignalReceived` in the journal
/// carries one of these so replay can match a recorded entry back to the
/// exact call site that produced it.
///
/// Display: `"a1b2c3d4.0.1.3"` (hex of first 4 root bytes + dot-separated path)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromiseId {
    root: [u8; 32],
    path: Vec<u32>,
}

/// Identifies a job's lifecycle execution as a whole — the root-level
/// `PromiseId` every activity, timer, and signal promise within that job
/// descends from.
pub type ExecutionId = PromiseId;

impl PromiseId {
    /// Root-level promise (empty path) for the given execution root.
    pub fn new(root: [u8; 32]) -> Self {
        Self {
            root,
            path: Vec::new(),
        }
    }

    /// Create a child promise by appending a sequence number to the path.
    ///
    /// The caller provides `seq` — the local operation counter at this
    /// depth, allocated by `WorkflowCtx::allocate_promise` each time the
    /// workflow schedules an activity, starts a timer, or awaits a signal.
    ///
    /// Returns `Err(MaxCallDepthExceeded)` if the path already has `MAX_CALL_DEPTH` segments.
    pub fn child(&self, seq: u32) -> Result<Self, DomainError> {
        if self.path.len() >= MAX_CALL_DEPTH {
            return Err(DomainError::MaxCallDepthExceeded {
                max: MAX_CALL_DEPTH,
            });
        }
        let mut new_path = self.path.clone();
        new_path.push(seq);
        Ok(Self {
            root: self.root,
            path: new_path,
        })
    }

    /// The raw 32-byte execution root.
    pub fn root_bytes(&self) -> &[u8; 32] {
        &self.root
    }

    /// The path segments (sequence numbers at each depth).
    pub fn path(&self) -> &[u32] {
        &self.path
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.root[..4]))?;
        for seg in &self.path {
            write!(f, ".{}", seg)?;
        }
        Ok(())
    }
}
