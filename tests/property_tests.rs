//! Property tests for the batch engine
//!
//! Random workflows are driven through random sequences of checks, advances
//! and rework resolutions, with deliberately wrong submissions mixed in.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use tbt::engine::invariants::verify;
use tbt::engine::{
    advance_stage, create_batch, perform_quality_check, replay, resolve_rework_item, resolve_status,
    QualityCheckRequest, ReworkResolutionRequest, StageAdvanceRequest, ValidationError,
};
use tbt::entities::batch::{Batch, BatchStatus, Disposition, ReworkDisposition};
use tbt::entities::workflow::WorkflowDefinition;

/// One random step: two selectors, an action roll, and an error offset
type Step = (u32, u32, u8, u32);

fn workflow_strategy() -> impl Strategy<Value = WorkflowDefinition> {
    prop::collection::vec(any::<bool>(), 1..6).prop_map(|gates| {
        let mut flow = WorkflowDefinition::new("Generated line", "prop");
        for (i, qc) in gates.into_iter().enumerate() {
            flow.push_stage(format!("Stage {}", i + 1), qc);
        }
        flow
    })
}

fn steps_strategy() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((any::<u32>(), any::<u32>(), 0u8..10, 1u32..=5), 0..24)
}

/// Conservation, exact sums and ascending stage order on the replayed state
fn assert_consistent(batch: &Batch) -> Result<(), TestCaseError> {
    let state = replay(batch).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert!(verify(&batch.id, &state).is_ok(), "invariants broken: {:?}", verify(&batch.id, &state));

    let accounted = u64::from(state.quantity_produced)
        + u64::from(state.quantity_rejected)
        + u64::from(state.current_stage.quantity())
        + state.quantity_in_rework();
    prop_assert_eq!(accounted, u64::from(batch.quantity_planned));

    let orders: Vec<u32> = state.stages_history.iter().map(|r| r.sequence_order).collect();
    prop_assert!(orders.windows(2).all(|w| w[0] < w[1]), "stage order not ascending: {:?}", orders);
    Ok(())
}

/// Split `quantity` three ways from two selectors; always sums exactly
fn split(quantity: u32, a: u32, b: u32) -> Disposition {
    let passed = a % (quantity + 1);
    let rework = b % (quantity - passed + 1);
    Disposition::new(passed, rework, quantity - passed - rework)
}

fn main_flow_step(batch: &mut Batch, (a, b, roll, k): Step) -> Result<(), TestCaseError> {
    let state = replay(batch).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let Some(active) = state.current_stage.as_stage().cloned() else {
        return Ok(());
    };
    let qc = batch
        .workflow
        .stage(&active.stage_id)
        .map(|s| s.quality_check_required)
        .unwrap_or(true);

    if !qc && roll % 2 == 0 {
        let request = StageAdvanceRequest {
            stage_id: active.stage_id.clone(),
            operator: None,
            notes: None,
        };
        advance_stage(batch, request).map_err(|e| TestCaseError::fail(e.to_string()))?;
        return Ok(());
    }

    let exact = split(active.quantity, a, b);

    // Off by k in either direction must be refused without touching the log
    let wrong = if roll % 3 == 0 && exact.passed >= k {
        Disposition::new(exact.passed - k, exact.rework, exact.rejected)
    } else {
        Disposition::new(exact.passed, exact.rework, exact.rejected + k)
    };
    let events_before = batch.events.clone();
    let err = perform_quality_check(batch, QualityCheckRequest::new(active.stage_id.clone(), wrong))
        .expect_err("mismatched disposition accepted");
    prop_assert!(
        matches!(err.as_validation(), Some(ValidationError::DispositionMismatch { .. })),
        "unexpected error: {}",
        err
    );
    prop_assert_eq!(&batch.events, &events_before);

    perform_quality_check(batch, QualityCheckRequest::new(active.stage_id, exact))
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    Ok(())
}

fn rework_step(batch: &mut Batch, (a, b, _, k): Step) -> Result<(), TestCaseError> {
    let state = replay(batch).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let pending: Vec<_> = state.rework_items.iter().filter(|r| r.is_pending()).collect();
    if pending.is_empty() {
        return Ok(());
    }
    let item = pending[(a as usize) % pending.len()];
    let passed = b % (item.quantity + 1);
    let rejected = item.quantity - passed;

    let events_before = batch.events.clone();
    let err = resolve_rework_item(
        batch,
        ReworkResolutionRequest::new(item.id.clone(), ReworkDisposition::new(passed, rejected + k)),
    )
    .expect_err("mismatched resolution accepted");
    prop_assert!(
        matches!(err.as_validation(), Some(ValidationError::ReworkMismatch { .. })),
        "unexpected error: {}",
        err
    );
    prop_assert_eq!(&batch.events, &events_before);

    resolve_rework_item(
        batch,
        ReworkResolutionRequest::new(item.id.clone(), ReworkDisposition::new(passed, rejected)),
    )
    .map_err(|e| TestCaseError::fail(e.to_string()))?;
    Ok(())
}

proptest! {
    /// Every reachable state conserves the planned quantity
    #[test]
    fn random_histories_conserve_quantity(
        flow in workflow_strategy(),
        planned in 1u32..=500,
        steps in steps_strategy(),
    ) {
        let mut batch = create_batch(&flow, planned, None, "prop").unwrap();
        assert_consistent(&batch)?;

        for step in steps {
            if step.2 < 6 {
                main_flow_step(&mut batch, step)?;
            } else {
                rework_step(&mut batch, step)?;
            }
            assert_consistent(&batch)?;
        }

        // Drain whatever is left; the batch must end up completed
        let mut seed = planned;
        for _ in 0..flow.stages.len() {
            main_flow_step(&mut batch, (seed, seed / 2, 1, 1))?;
            assert_consistent(&batch)?;
            seed = seed.wrapping_mul(31).wrapping_add(7);
        }
        while replay(&batch).unwrap().pending_rework_count() > 0 {
            rework_step(&mut batch, (0, seed, 6, 2))?;
            assert_consistent(&batch)?;
        }

        let state = replay(&batch).unwrap();
        prop_assert_eq!(resolve_status(&state), BatchStatus::Completed);
        prop_assert_eq!(
            u64::from(state.quantity_produced) + u64::from(state.quantity_rejected),
            u64::from(planned)
        );
    }

    /// The resolved status never goes back to in progress once the main flow ends
    #[test]
    fn status_leaves_in_progress_only_forward(
        flow in workflow_strategy(),
        planned in 1u32..=200,
        steps in steps_strategy(),
    ) {
        let mut batch = create_batch(&flow, planned, None, "prop").unwrap();
        let mut left_main_flow = false;
        for step in steps {
            if step.2 < 6 {
                main_flow_step(&mut batch, step)?;
            } else {
                rework_step(&mut batch, step)?;
            }
            let status = resolve_status(&replay(&batch).unwrap());
            if left_main_flow {
                prop_assert_ne!(status, BatchStatus::InProgress);
            }
            left_main_flow |= status != BatchStatus::InProgress;
        }
    }
}
