//! Batch disposition engine
//!
//! Operations validate a request against the batch's current state, append
//! one event, and return the new state. Nothing is written to storage here;
//! [`BatchService`] wraps the operations with load and compare-and-swap save.

pub mod error;
pub mod invariants;
pub mod projection;
pub mod quality_check;
pub mod rejection;
pub mod rework;
pub mod service;
pub mod snapshot;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{quantity_from_signed, EngineError, ValidationError};
pub use projection::{replay, ActiveStage, BatchState, RejectionInfo, StageOutcome, StageRecord, StageState};
pub use quality_check::{advance_stage, perform_quality_check, QualityCheckRequest, StageAdvanceRequest};
pub use rejection::reject_batch;
pub use rework::{resolve_rework_item, ReworkResolutionRequest};
pub use service::BatchService;
pub use snapshot::BatchSnapshot;
pub use status::resolve_status;

use crate::entities::batch::{Batch, Quantity};
use crate::entities::workflow::WorkflowDefinition;

/// Build a new batch with everything at the first stage
///
/// The workflow must have at least one stage with unique ids and sequence
/// numbers, and the planned quantity must be positive.
pub fn create_batch(
    workflow: &WorkflowDefinition,
    quantity_planned: Quantity,
    title: Option<String>,
    author: &str,
) -> Result<Batch, EngineError> {
    if quantity_planned == 0 {
        return Err(EngineError::validation("(new)", ValidationError::ZeroPlannedQuantity));
    }
    let snapshot = workflow
        .snapshot()
        .map_err(|e| EngineError::validation("(new)", e.into()))?;

    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("{} batch", workflow.title));
    let batch = Batch::new(title, snapshot, quantity_planned, author.to_string());

    let state = replay(&batch)?;
    invariants::verify(&batch.id, &state)?;
    Ok(batch)
}
