//! Batch state derived by folding the event log
//!
//! Nothing in [`BatchState`] is stored. It is rebuilt from the workflow
//! snapshot, the planned quantity and the events every time a batch is read,
//! so the counters cannot drift from the history that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::EntityId;
use crate::engine::error::EngineError;
use crate::engine::{invariants, quality_check, rejection, rework};
use crate::entities::batch::{Batch, BatchEvent, QualityCheckRecord, Quantity, ReworkItem};
use crate::entities::workflow::{WorkflowSnapshot, WorkflowStage};

/// Quantity sitting at the active stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    pub stage_id: EntityId,
    pub name: String,
    pub sequence_order: u32,
    pub quantity: Quantity,
}

impl StageState {
    pub fn enter(stage: &WorkflowStage, quantity: Quantity) -> Self {
        Self {
            stage_id: stage.stage_id.clone(),
            name: stage.name.clone(),
            sequence_order: stage.sequence_order,
            quantity,
        }
    }
}

/// Where the main flow currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActiveStage {
    AtStage(StageState),
    NoActiveStage,
}

impl ActiveStage {
    /// Units at the active stage (0 when the main flow is done)
    pub fn quantity(&self) -> Quantity {
        match self {
            ActiveStage::AtStage(stage) => stage.quantity,
            ActiveStage::NoActiveStage => 0,
        }
    }

    pub fn as_stage(&self) -> Option<&StageState> {
        match self {
            ActiveStage::AtStage(stage) => Some(stage),
            ActiveStage::NoActiveStage => None,
        }
    }
}

/// How the main flow left a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutcome {
    QualityCheck(QualityCheckRecord),
    PassedThrough {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
        date: DateTime<Utc>,
    },
}

/// One completed stage in the main flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage_id: EntityId,
    pub name: String,
    pub sequence_order: u32,
    /// Units that entered the stage
    pub quantity_in: Quantity,
    /// Units that continued down the main flow
    pub quantity_out: Quantity,
    pub outcome: StageOutcome,
}

/// Operator rejection details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionInfo {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    pub date: DateTime<Utc>,
}

/// Projection of a batch's event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchState {
    pub quantity_planned: Quantity,
    pub quantity_produced: Quantity,
    pub quantity_rejected: Quantity,
    pub current_stage: ActiveStage,
    pub stages_history: Vec<StageRecord>,
    pub rework_items: Vec<ReworkItem>,
    pub rejection: Option<RejectionInfo>,
}

impl BatchState {
    /// State of a freshly created batch: everything at the first stage
    pub fn initial(workflow: &WorkflowSnapshot, quantity_planned: Quantity) -> Option<Self> {
        let first = workflow.first_stage()?;
        Some(Self {
            quantity_planned,
            quantity_produced: 0,
            quantity_rejected: 0,
            current_stage: ActiveStage::AtStage(StageState::enter(first, quantity_planned)),
            stages_history: Vec::new(),
            rework_items: Vec::new(),
            rejection: None,
        })
    }

    /// Sum of pending rework quantities
    pub fn quantity_in_rework(&self) -> u64 {
        self.rework_items
            .iter()
            .filter(|r| r.is_pending())
            .map(|r| u64::from(r.quantity))
            .sum()
    }

    /// Number of pending rework items
    pub fn pending_rework_count(&self) -> usize {
        self.rework_items.iter().filter(|r| r.is_pending()).count()
    }

    pub fn rework_item(&self, id: &EntityId) -> Option<&ReworkItem> {
        self.rework_items.iter().find(|r| &r.id == id)
    }

    pub(crate) fn rework_item_mut(&mut self, id: &EntityId) -> Option<&mut ReworkItem> {
        self.rework_items.iter_mut().find(|r| &r.id == id)
    }

    /// Apply one event; events were validated before they were appended
    pub(crate) fn apply(
        &mut self,
        batch_id: &EntityId,
        workflow: &WorkflowSnapshot,
        event: &BatchEvent,
    ) -> Result<(), EngineError> {
        match event {
            BatchEvent::QualityChecked { record, rework } => {
                quality_check::apply_check(self, batch_id, workflow, record, rework.as_ref())
            }
            BatchEvent::StageAdvanced {
                stage_id,
                quantity,
                operator,
                notes,
                date,
            } => quality_check::apply_advance(
                self,
                batch_id,
                workflow,
                stage_id,
                *quantity,
                StageOutcome::PassedThrough {
                    operator: operator.clone(),
                    notes: notes.clone(),
                    date: *date,
                },
            ),
            BatchEvent::ReworkResolved {
                rework_id,
                resolution,
            } => rework::apply_resolution(self, batch_id, rework_id, resolution),
            BatchEvent::BatchRejected { reason, by, date } => {
                rejection::apply_rejection(self, reason, by.as_deref(), *date);
                Ok(())
            }
        }
    }
}

/// Rebuild the state of a batch from its log
pub fn replay(batch: &Batch) -> Result<BatchState, EngineError> {
    let mut state = BatchState::initial(&batch.workflow, batch.quantity_planned)
        .ok_or_else(|| EngineError::invariant(&batch.id, "workflow snapshot has no stages"))?;
    for event in &batch.events {
        state.apply(&batch.id, &batch.workflow, event)?;
    }
    Ok(state)
}

/// Apply a validated event to a candidate state, check invariants, then append it
///
/// The batch is only touched once the candidate passes every check.
pub(crate) fn commit(
    batch: &mut Batch,
    before: &BatchState,
    event: BatchEvent,
) -> Result<BatchState, EngineError> {
    let mut after = before.clone();
    after.apply(&batch.id, &batch.workflow, &event)?;
    invariants::verify_transition(&batch.id, before, &after)?;

    tracing::debug!(batch = %batch.id, event = event.label(), "event committed");
    batch.events.push(event);
    Ok(after)
}
