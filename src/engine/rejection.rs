//! Operator rejection of a whole batch
//!
//! Rejection closes the batch. Quantities already counted stay as they are;
//! units still at the active stage or in pending rework are left where they
//! are and simply stop moving.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::engine::error::{EngineError, ValidationError};
use crate::engine::projection::{commit, replay, BatchState, RejectionInfo};
use crate::engine::status::resolve_status;
use crate::entities::batch::{Batch, BatchEvent, BatchStatus};

/// Mark an in-progress or on-hold batch as rejected
pub fn reject_batch(batch: &mut Batch, reason: &str, by: Option<String>) -> Result<BatchState, EngineError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::validation(&batch.id, ValidationError::MissingReason));
    }

    let before = replay(batch)?;
    let status = resolve_status(&before);
    if status.is_terminal() {
        return Err(EngineError::validation(
            &batch.id,
            ValidationError::BatchClosed { status },
        ));
    }

    let event = BatchEvent::BatchRejected {
        reason: reason.to_string(),
        by,
        date: Utc::now(),
    };
    let after = commit(batch, &before, event)?;

    info!(batch = %batch.id, previous = %status, reason, "batch rejected");
    Ok(after)
}

pub(crate) fn apply_rejection(
    state: &mut BatchState,
    reason: &str,
    by: Option<&str>,
    date: DateTime<Utc>,
) {
    state.rejection = Some(RejectionInfo {
        reason: reason.to_string(),
        by: by.map(String::from),
        date,
    });
}
