//! Status resolution

use crate::engine::projection::{ActiveStage, BatchState};
use crate::entities::batch::BatchStatus;

/// Derive the batch status from its state
///
/// Operator rejection wins. Otherwise an active stage means the main flow is
/// still running, pending rework holds the batch, and anything else is done.
pub fn resolve_status(state: &BatchState) -> BatchStatus {
    if state.rejection.is_some() {
        return BatchStatus::Rejected;
    }
    match state.current_stage {
        ActiveStage::AtStage(_) => BatchStatus::InProgress,
        ActiveStage::NoActiveStage if state.pending_rework_count() > 0 => BatchStatus::OnHold,
        ActiveStage::NoActiveStage => BatchStatus::Completed,
    }
}
