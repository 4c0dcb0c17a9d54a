//! Shared checkpoint helper both workflow functions call after every step
//! that can produce journal entries, so a crash between steps loses at most
//! the in-flight one rather than the whole run since the last `continue_as_new`.

use std::sync::Arc;

use jobflow_engine::{JournalSink, RuntimeError, WorkflowCtx};

pub(crate) async fn flush(ctx: &mut WorkflowCtx, sink: &Arc<dyn JournalSink>) -> Result<(), RuntimeError> {
    let entries = ctx.take_new_entries();
    if entries.is_empty() {
        return Ok(());
    }
    sink.append(ctx.execution_id(), entries).await
}
