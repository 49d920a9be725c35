//! Consistency checks run on every candidate state before it is committed

use crate::core::identity::EntityId;
use crate::engine::error::EngineError;
use crate::engine::projection::{BatchState, StageOutcome};
use crate::entities::batch::ReworkStatus;

/// Check a single state
///
/// Every planned unit is accounted for exactly once across produced,
/// rejected, the active stage and pending rework. Each recorded disposition
/// sums to the quantity it split, and stages appear in ascending order.
pub fn verify(batch_id: &EntityId, state: &BatchState) -> Result<(), EngineError> {
    let accounted = u64::from(state.quantity_produced)
        + u64::from(state.quantity_rejected)
        + u64::from(state.current_stage.quantity())
        + state.quantity_in_rework();
    if accounted != u64::from(state.quantity_planned) {
        return Err(EngineError::invariant(
            batch_id,
            format!(
                "{} units planned but {} accounted for (produced {}, rejected {}, active {}, rework {})",
                state.quantity_planned,
                accounted,
                state.quantity_produced,
                state.quantity_rejected,
                state.current_stage.quantity(),
                state.quantity_in_rework()
            ),
        ));
    }

    let mut last_order = None;
    for record in &state.stages_history {
        if last_order.is_some_and(|prev| record.sequence_order <= prev) {
            return Err(EngineError::invariant(
                batch_id,
                format!("stage {} recorded out of sequence", record.stage_id),
            ));
        }
        last_order = Some(record.sequence_order);

        if let StageOutcome::QualityCheck(check) = &record.outcome {
            if check.disposition.total() != u64::from(record.quantity_in) {
                return Err(EngineError::invariant(
                    batch_id,
                    format!("check {} does not account for its stage quantity", check.id),
                ));
            }
        }
    }

    for item in &state.rework_items {
        match (item.status, &item.resolution) {
            (ReworkStatus::Pending, None) => {}
            (ReworkStatus::Resolved, Some(res))
                if u64::from(res.passed) + u64::from(res.rejected) == u64::from(item.quantity) => {}
            _ => {
                return Err(EngineError::invariant(
                    batch_id,
                    format!("rework item {} has an inconsistent resolution", item.id),
                ))
            }
        }
    }

    Ok(())
}

/// Check a state transition
///
/// On top of [`verify`], counters never decrease, history is only appended
/// to, and resolved rework stays resolved.
pub fn verify_transition(batch_id: &EntityId, before: &BatchState, after: &BatchState) -> Result<(), EngineError> {
    verify(batch_id, after)?;

    if after.quantity_produced < before.quantity_produced || after.quantity_rejected < before.quantity_rejected {
        return Err(EngineError::invariant(batch_id, "terminal counters decreased"));
    }

    if !after.stages_history.starts_with(&before.stages_history) {
        return Err(EngineError::invariant(batch_id, "stage history was rewritten"));
    }

    if after.rework_items.len() < before.rework_items.len() {
        return Err(EngineError::invariant(batch_id, "rework items were removed"));
    }
    for (old, new) in before.rework_items.iter().zip(&after.rework_items) {
        if old.id != new.id || (!old.is_pending() && old != new) {
            return Err(EngineError::invariant(
                batch_id,
                format!("rework item {} changed after resolution", old.id),
            ));
        }
    }

    if before.rejection.is_some() && after != before {
        return Err(EngineError::invariant(batch_id, "rejected batch changed"));
    }

    Ok(())
}
