//! Rework item resolution
//!
//! A rework item is settled exactly once. Its passed units go straight to
//! produced and never re-enter the main flow; its rejected units are written
//! off.

use chrono::Utc;
use tracing::info;

use crate::core::identity::EntityId;
use crate::engine::error::{EngineError, ValidationError};
use crate::engine::projection::{commit, replay, BatchState};
use crate::engine::status::resolve_status;
use crate::entities::batch::{Batch, BatchEvent, BatchStatus, ReworkDisposition, ReworkResolution, ReworkStatus};

/// Input for [`resolve_rework_item`]
#[derive(Debug, Clone)]
pub struct ReworkResolutionRequest {
    pub rework_id: EntityId,
    pub disposition: ReworkDisposition,
    pub notes: Option<String>,
    pub resolved_by: Option<String>,
}

impl ReworkResolutionRequest {
    pub fn new(rework_id: EntityId, disposition: ReworkDisposition) -> Self {
        Self {
            rework_id,
            disposition,
            notes: None,
            resolved_by: None,
        }
    }
}

/// Split a pending rework item into passed and rejected units
pub fn resolve_rework_item(
    batch: &mut Batch,
    request: ReworkResolutionRequest,
) -> Result<BatchState, EngineError> {
    let before = replay(batch)?;

    let status = resolve_status(&before);
    if status == BatchStatus::Rejected {
        return Err(EngineError::validation(
            &batch.id,
            ValidationError::BatchClosed { status },
        ));
    }

    let item = before.rework_item(&request.rework_id).ok_or_else(|| {
        EngineError::validation(
            &batch.id,
            ValidationError::UnknownReworkItem(request.rework_id.to_string()),
        )
    })?;
    if !item.is_pending() {
        return Err(EngineError::validation(
            &batch.id,
            ValidationError::ReworkAlreadyResolved(item.id.to_string()),
        ));
    }

    let actual = request.disposition.total();
    if actual != u64::from(item.quantity) {
        return Err(EngineError::validation(
            &batch.id,
            ValidationError::ReworkMismatch {
                expected: item.quantity,
                actual,
            },
        ));
    }

    let resolution = ReworkResolution {
        passed: request.disposition.passed,
        rejected: request.disposition.rejected,
        notes: request.notes,
        resolved_by: request.resolved_by,
        resolved_date: Utc::now(),
    };
    let event = BatchEvent::ReworkResolved {
        rework_id: request.rework_id.clone(),
        resolution,
    };
    let after = commit(batch, &before, event)?;

    info!(
        batch = %batch.id,
        rework = %request.rework_id,
        passed = request.disposition.passed,
        rejected = request.disposition.rejected,
        status = %resolve_status(&after),
        "rework resolved"
    );
    Ok(after)
}

pub(crate) fn apply_resolution(
    state: &mut BatchState,
    batch_id: &EntityId,
    rework_id: &EntityId,
    resolution: &ReworkResolution,
) -> Result<(), EngineError> {
    let item = state
        .rework_item_mut(rework_id)
        .ok_or_else(|| EngineError::invariant(batch_id, format!("resolution for unknown rework item {}", rework_id)))?;

    if !item.is_pending() {
        return Err(EngineError::invariant(
            batch_id,
            format!("rework item {} resolved twice", rework_id),
        ));
    }
    let total = u64::from(resolution.passed) + u64::from(resolution.rejected);
    if total != u64::from(item.quantity) {
        return Err(EngineError::invariant(
            batch_id,
            format!(
                "resolution of {} accounts for {} units but the item holds {}",
                rework_id, total, item.quantity
            ),
        ));
    }

    item.status = ReworkStatus::Resolved;
    item.resolution = Some(resolution.clone());

    state.quantity_produced = state
        .quantity_produced
        .checked_add(resolution.passed)
        .ok_or_else(|| EngineError::invariant(batch_id, "produced quantity overflow"))?;
    state.quantity_rejected = state
        .quantity_rejected
        .checked_add(resolution.rejected)
        .ok_or_else(|| EngineError::invariant(batch_id, "rejected quantity overflow"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::quality_check::{perform_quality_check, QualityCheckRequest};
    use crate::engine::testing::{first_stage_id, stage_id_at, two_stage_batch};
    use crate::entities::batch::Disposition;

    /// 100 planned: 80/15/5 at stage one, 80/0/0 at stage two
    fn on_hold_batch() -> (Batch, EntityId) {
        let mut batch = two_stage_batch(100);
        let stage1 = first_stage_id(&batch);
        let stage2 = stage_id_at(&batch, 1);
        let state = perform_quality_check(
            &mut batch,
            QualityCheckRequest::new(stage1, Disposition::new(80, 15, 5)),
        )
        .unwrap();
        let rework_id = state.rework_items[0].id.clone();
        perform_quality_check(
            &mut batch,
            QualityCheckRequest::new(stage2, Disposition::new(80, 0, 0)),
        )
        .unwrap();
        (batch, rework_id)
    }

    #[test]
    fn test_resolution_completes_batch() {
        let (mut batch, rework_id) = on_hold_batch();

        let state = resolve_rework_item(
            &mut batch,
            ReworkResolutionRequest::new(rework_id.clone(), ReworkDisposition::new(12, 3)),
        )
        .unwrap();

        assert_eq!(state.quantity_produced, 92);
        assert_eq!(state.quantity_rejected, 8);
        assert_eq!(state.quantity_in_rework(), 0);
        assert_eq!(resolve_status(&state), BatchStatus::Completed);
        let item = state.rework_item(&rework_id).unwrap();
        assert_eq!(item.status, ReworkStatus::Resolved);
        assert_eq!(item.resolution.as_ref().unwrap().passed, 12);
    }

    #[test]
    fn test_resolution_ten_passed_five_rejected() {
        let (mut batch, rework_id) = on_hold_batch();

        let state = resolve_rework_item(
            &mut batch,
            ReworkResolutionRequest::new(rework_id, ReworkDisposition::new(10, 5)),
        )
        .unwrap();

        assert_eq!(state.quantity_produced, 90);
        assert_eq!(state.quantity_rejected, 10);
        assert_eq!(state.pending_rework_count(), 0);
        assert_eq!(resolve_status(&state), BatchStatus::Completed);
    }

    #[test]
    fn test_resolution_while_main_flow_runs() {
        let mut batch = two_stage_batch(100);
        let stage1 = first_stage_id(&batch);
        let state = perform_quality_check(
            &mut batch,
            QualityCheckRequest::new(stage1, Disposition::new(80, 15, 5)),
        )
        .unwrap();
        let rework_id = state.rework_items[0].id.clone();

        let state = resolve_rework_item(
            &mut batch,
            ReworkResolutionRequest::new(rework_id, ReworkDisposition::new(15, 0)),
        )
        .unwrap();
        assert_eq!(state.quantity_produced, 15);
        assert_eq!(state.current_stage.quantity(), 80);
        assert_eq!(resolve_status(&state), BatchStatus::InProgress);
    }

    #[test]
    fn test_second_resolution_fails() {
        let (mut batch, rework_id) = on_hold_batch();
        resolve_rework_item(
            &mut batch,
            ReworkResolutionRequest::new(rework_id.clone(), ReworkDisposition::new(12, 3)),
        )
        .unwrap();

        let err = resolve_rework_item(
            &mut batch,
            ReworkResolutionRequest::new(rework_id.clone(), ReworkDisposition::new(15, 0)),
        )
        .unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::ReworkAlreadyResolved(rework_id.to_string()))
        );
        let state = replay(&batch).unwrap();
        assert_eq!(state.quantity_produced, 92);
    }

    #[test]
    fn test_resolution_sum_must_match() {
        let (mut batch, rework_id) = on_hold_batch();
        let err = resolve_rework_item(
            &mut batch,
            ReworkResolutionRequest::new(rework_id, ReworkDisposition::new(10, 3)),
        )
        .unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::ReworkMismatch {
                expected: 15,
                actual: 13
            })
        );
        assert_eq!(batch.events.len(), 2);
    }

    #[test]
    fn test_unknown_rework_item() {
        let (mut batch, _) = on_hold_batch();
        let err = resolve_rework_item(
            &mut batch,
            ReworkResolutionRequest::new(
                EntityId::new(crate::core::identity::EntityPrefix::Rwk),
                ReworkDisposition::new(15, 0),
            ),
        )
        .unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::UnknownReworkItem(_))
        ));
    }
}
