//! Read model returned by every service call

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::identity::EntityId;
use crate::engine::error::EngineError;
use crate::engine::invariants;
use crate::engine::projection::{replay, ActiveStage, BatchState, RejectionInfo, StageRecord};
use crate::engine::status::resolve_status;
use crate::entities::batch::{Batch, BatchStatus, Quantity, ReworkItem};

/// Batch with its derived state, ready for output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSnapshot {
    pub id: EntityId,
    pub title: String,
    pub workflow_id: EntityId,
    pub workflow_title: String,
    pub status: BatchStatus,
    pub quantity_planned: Quantity,
    pub quantity_produced: Quantity,
    pub quantity_rejected: Quantity,
    pub quantity_in_rework: u64,
    pub current_stage: ActiveStage,
    pub stages_history: Vec<StageRecord>,
    pub rework_items: Vec<ReworkItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionInfo>,
    pub created: DateTime<Utc>,
    pub author: String,
    pub revision: u32,
}

impl BatchSnapshot {
    /// Replay a stored batch and check the result still holds together
    ///
    /// A hand-edited file can replay cleanly yet break conservation or stage
    /// order, so reads verify the same invariants writes do.
    pub fn from_batch(batch: &Batch) -> Result<Self, EngineError> {
        let state = replay(batch)?;
        invariants::verify(&batch.id, &state)?;
        Ok(Self::from_state(batch, state))
    }

    /// Combine a batch with a state already derived from it
    pub fn from_state(batch: &Batch, state: BatchState) -> Self {
        Self {
            id: batch.id.clone(),
            title: batch.title.clone(),
            workflow_id: batch.workflow.workflow_id.clone(),
            workflow_title: batch.workflow.title.clone(),
            status: resolve_status(&state),
            quantity_planned: state.quantity_planned,
            quantity_produced: state.quantity_produced,
            quantity_rejected: state.quantity_rejected,
            quantity_in_rework: state.quantity_in_rework(),
            current_stage: state.current_stage,
            stages_history: state.stages_history,
            rework_items: state.rework_items,
            rejection: state.rejection,
            created: batch.created,
            author: batch.author.clone(),
            revision: batch.entity_revision,
        }
    }

    /// Name of the active stage, if any
    pub fn active_stage_name(&self) -> Option<&str> {
        self.current_stage.as_stage().map(|s| s.name.as_str())
    }

    /// Pending rework items
    pub fn pending_rework(&self) -> impl Iterator<Item = &ReworkItem> {
        self.rework_items.iter().filter(|r| r.is_pending())
    }

    /// Produced as a percentage of planned
    pub fn yield_percent(&self) -> Option<f64> {
        (self.quantity_planned > 0)
            .then(|| f64::from(self.quantity_produced) * 100.0 / f64::from(self.quantity_planned))
    }
}
