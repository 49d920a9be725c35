//! Quality checks and stage advancement for the main flow
//!
//! Only the passed quantity continues down the workflow. Rejected units are
//! written off immediately and reworked units leave the main flow as a
//! pending [`ReworkItem`] that is settled later by [`crate::engine::rework`].

use chrono::Utc;
use tracing::info;

use crate::core::identity::{EntityId, EntityPrefix};
use crate::engine::error::{EngineError, ValidationError};
use crate::engine::projection::{commit, replay, ActiveStage, BatchState, StageOutcome, StageRecord, StageState};
use crate::engine::status::resolve_status;
use crate::entities::batch::{
    Batch, BatchEvent, BatchStatus, Disposition, NewRework, QualityCheckRecord, Quantity, ReworkItem,
    ReworkStatus, SampleData,
};
use crate::entities::workflow::WorkflowSnapshot;

/// Input for [`perform_quality_check`]
#[derive(Debug, Clone)]
pub struct QualityCheckRequest {
    /// Stage the caller believes is active
    pub stage_id: EntityId,
    pub disposition: Disposition,
    pub samples_data: Vec<SampleData>,
    pub notes: Option<String>,
    pub inspector: Option<String>,
    /// Reason recorded on the rework item; defaults to the notes
    pub rework_reason: Option<String>,
}

impl QualityCheckRequest {
    pub fn new(stage_id: EntityId, disposition: Disposition) -> Self {
        Self {
            stage_id,
            disposition,
            samples_data: Vec::new(),
            notes: None,
            inspector: None,
            rework_reason: None,
        }
    }
}

/// Input for [`advance_stage`]
#[derive(Debug, Clone)]
pub struct StageAdvanceRequest {
    pub stage_id: EntityId,
    pub operator: Option<String>,
    pub notes: Option<String>,
}

/// Disposition the active stage's quantity and move the passed units on
///
/// Fails with a validation error, leaving the batch untouched, when the batch
/// is not in progress, `stage_id` is not the active stage, or the three
/// portions do not add up to the active quantity exactly.
pub fn perform_quality_check(
    batch: &mut Batch,
    request: QualityCheckRequest,
) -> Result<BatchState, EngineError> {
    let before = replay(batch)?;
    let active = ensure_active_stage(&batch.id, &before, &request.stage_id)?;

    let expected = u64::from(active.quantity);
    let actual = request.disposition.total();
    if expected != actual {
        return Err(EngineError::validation(
            &batch.id,
            ValidationError::DispositionMismatch { expected, actual },
        ));
    }

    let stage = batch
        .workflow
        .stage(&active.stage_id)
        .ok_or_else(|| EngineError::invariant(&batch.id, "active stage missing from workflow snapshot"))?;

    let samples_data = request
        .samples_data
        .into_iter()
        .map(|mut sample| {
            if sample.specification.is_none() {
                sample.specification = stage.specification_for(&sample.parameter).map(String::from);
            }
            sample
        })
        .collect();

    let disposition = request.disposition;
    let rework = (disposition.rework > 0).then(|| NewRework {
        id: EntityId::new(EntityPrefix::Rwk),
        reason: request
            .rework_reason
            .clone()
            .or_else(|| request.notes.clone())
            .unwrap_or_else(|| format!("Rework from quality check at {}", stage.name)),
    });

    let record = QualityCheckRecord {
        id: EntityId::new(EntityPrefix::Qc),
        stage_id: active.stage_id.clone(),
        stage_name: active.name.clone(),
        quantity_checked: active.quantity,
        disposition,
        samples_data,
        notes: request.notes,
        inspector: request.inspector,
        check_date: Utc::now(),
    };
    let stage_name = record.stage_name.clone();

    let after = commit(batch, &before, BatchEvent::QualityChecked { record, rework })?;

    info!(
        batch = %batch.id,
        stage = %stage_name,
        passed = disposition.passed,
        rework = disposition.rework,
        rejected = disposition.rejected,
        "quality check applied"
    );
    Ok(after)
}

/// Move the whole active quantity past a stage that does not require a check
pub fn advance_stage(batch: &mut Batch, request: StageAdvanceRequest) -> Result<BatchState, EngineError> {
    let before = replay(batch)?;
    let active = ensure_active_stage(&batch.id, &before, &request.stage_id)?;

    let stage = batch
        .workflow
        .stage(&active.stage_id)
        .ok_or_else(|| EngineError::invariant(&batch.id, "active stage missing from workflow snapshot"))?;
    if stage.quality_check_required {
        return Err(EngineError::validation(
            &batch.id,
            ValidationError::QualityCheckRequired {
                stage: stage.name.clone(),
            },
        ));
    }

    let quantity = active.quantity;
    let stage_name = active.name.clone();
    let event = BatchEvent::StageAdvanced {
        stage_id: active.stage_id.clone(),
        quantity,
        operator: request.operator,
        notes: request.notes,
        date: Utc::now(),
    };
    let after = commit(batch, &before, event)?;

    info!(batch = %batch.id, stage = %stage_name, quantity, "stage advanced without check");
    Ok(after)
}

/// Check that the batch is in progress and `stage_id` is its active stage
fn ensure_active_stage<'a>(
    batch_id: &EntityId,
    state: &'a BatchState,
    stage_id: &EntityId,
) -> Result<&'a StageState, EngineError> {
    let status = resolve_status(state);
    if status != BatchStatus::InProgress {
        return Err(EngineError::validation(
            batch_id,
            ValidationError::BatchNotInProgress { status },
        ));
    }

    match &state.current_stage {
        ActiveStage::AtStage(active) if &active.stage_id == stage_id => Ok(active),
        ActiveStage::AtStage(active) => Err(EngineError::validation(
            batch_id,
            ValidationError::StaleStage {
                requested: stage_id.to_string(),
                active: format!("{} ({})", active.name, active.stage_id),
            },
        )),
        ActiveStage::NoActiveStage => Err(EngineError::validation(
            batch_id,
            ValidationError::BatchNotInProgress { status },
        )),
    }
}

/// Active stage for replaying an event; anything else means a corrupt log
fn expect_active<'a>(
    state: &'a BatchState,
    batch_id: &EntityId,
    stage_id: &EntityId,
    quantity: Quantity,
) -> Result<&'a StageState, EngineError> {
    match &state.current_stage {
        ActiveStage::AtStage(active) if &active.stage_id == stage_id && active.quantity == quantity => {
            Ok(active)
        }
        ActiveStage::AtStage(active) => Err(EngineError::invariant(
            batch_id,
            format!(
                "event for stage {} with {} units does not match active stage {} holding {}",
                stage_id, quantity, active.stage_id, active.quantity
            ),
        )),
        ActiveStage::NoActiveStage => Err(EngineError::invariant(
            batch_id,
            format!("event for stage {} recorded after the main flow finished", stage_id),
        )),
    }
}

pub(crate) fn apply_check(
    state: &mut BatchState,
    batch_id: &EntityId,
    workflow: &WorkflowSnapshot,
    record: &QualityCheckRecord,
    rework: Option<&NewRework>,
) -> Result<(), EngineError> {
    let active = expect_active(state, batch_id, &record.stage_id, record.quantity_checked)?.clone();
    let d = record.disposition;

    if d.total() != u64::from(active.quantity) {
        return Err(EngineError::invariant(
            batch_id,
            format!(
                "check {} splits {} units at a stage holding {}",
                record.id,
                d.total(),
                active.quantity
            ),
        ));
    }

    state.quantity_rejected = state
        .quantity_rejected
        .checked_add(d.rejected)
        .ok_or_else(|| EngineError::invariant(batch_id, "rejected quantity overflow"))?;

    match (d.rework > 0, rework) {
        (true, Some(new)) => state.rework_items.push(ReworkItem {
            id: new.id.clone(),
            stage_id: active.stage_id.clone(),
            stage_name: active.name.clone(),
            quantity: d.rework,
            reason: new.reason.clone(),
            status: ReworkStatus::Pending,
            resolution: None,
            source_check: record.id.clone(),
        }),
        (false, None) => {}
        _ => {
            return Err(EngineError::invariant(
                batch_id,
                format!("check {} has inconsistent rework data", record.id),
            ))
        }
    }

    state.stages_history.push(StageRecord {
        stage_id: active.stage_id.clone(),
        name: active.name.clone(),
        sequence_order: active.sequence_order,
        quantity_in: active.quantity,
        quantity_out: d.passed,
        outcome: StageOutcome::QualityCheck(record.clone()),
    });

    advance_main_flow(state, batch_id, workflow, &active.stage_id, d.passed)
}

pub(crate) fn apply_advance(
    state: &mut BatchState,
    batch_id: &EntityId,
    workflow: &WorkflowSnapshot,
    stage_id: &EntityId,
    quantity: Quantity,
    outcome: StageOutcome,
) -> Result<(), EngineError> {
    let active = expect_active(state, batch_id, stage_id, quantity)?.clone();

    state.stages_history.push(StageRecord {
        stage_id: active.stage_id.clone(),
        name: active.name.clone(),
        sequence_order: active.sequence_order,
        quantity_in: active.quantity,
        quantity_out: active.quantity,
        outcome,
    });

    advance_main_flow(state, batch_id, workflow, &active.stage_id, active.quantity)
}

/// Hand `passed` units to the next stage, or to produced after the last one
fn advance_main_flow(
    state: &mut BatchState,
    batch_id: &EntityId,
    workflow: &WorkflowSnapshot,
    stage_id: &EntityId,
    passed: Quantity,
) -> Result<(), EngineError> {
    if workflow.is_last_stage(stage_id) {
        state.quantity_produced = state
            .quantity_produced
            .checked_add(passed)
            .ok_or_else(|| EngineError::invariant(batch_id, "produced quantity overflow"))?;
        state.current_stage = ActiveStage::NoActiveStage;
        return Ok(());
    }

    let next = workflow
        .next_stage(stage_id)
        .ok_or_else(|| EngineError::invariant(batch_id, format!("stage {} is not in the workflow", stage_id)))?;
    state.current_stage = ActiveStage::AtStage(StageState::enter(next, passed));
    Ok(())
}
