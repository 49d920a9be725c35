//! Shared fixtures for engine unit tests

use crate::core::identity::EntityId;
use crate::entities::batch::{Batch, Quantity};
use crate::entities::workflow::{VerificationParameter, WorkflowDefinition};

/// Machining (with a bore parameter) then Final Inspection, both checked
pub fn two_stage_flow() -> WorkflowDefinition {
    let mut flow = WorkflowDefinition::new("Housing line", "tester");
    flow.push_stage("Machining", true)
        .parameters
        .push(VerificationParameter {
            name: "Bore diameter".to_string(),
            specification: Some("10.00 +/- 0.05 mm".to_string()),
        });
    flow.push_stage("Final Inspection", true);
    flow
}

pub fn two_stage_batch(quantity: Quantity) -> Batch {
    Batch::new(
        "Housing lot".to_string(),
        two_stage_flow().snapshot().unwrap(),
        quantity,
        "tester".to_string(),
    )
}

pub fn first_stage_id(batch: &Batch) -> EntityId {
    stage_id_at(batch, 0)
}

pub fn stage_id_at(batch: &Batch, index: usize) -> EntityId {
    batch.workflow.stages[index].stage_id.clone()
}
