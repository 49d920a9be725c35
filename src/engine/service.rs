//! Service facade over a [`BatchStore`]
//!
//! Each mutation loads the batch, applies the operation to the in-memory
//! aggregate, then saves it with the revision it was loaded at. A writer that
//! lost the race gets [`EngineError::Conflict`] and nothing is written.

use tracing::{info, warn};

use crate::core::identity::EntityId;
use crate::core::store::BatchStore;
use crate::engine::error::EngineError;
use crate::engine::projection::BatchState;
use crate::engine::quality_check::{self, QualityCheckRequest, StageAdvanceRequest};
use crate::engine::rejection;
use crate::engine::rework::{self, ReworkResolutionRequest};
use crate::engine::snapshot::BatchSnapshot;
use crate::engine::create_batch;
use crate::entities::batch::{Batch, Quantity};
use crate::entities::workflow::WorkflowDefinition;

/// Batch operations bound to a store
#[derive(Debug)]
pub struct BatchService<S: BatchStore> {
    store: S,
}

impl<S: BatchStore> BatchService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot the workflow into a new batch and store it
    pub fn create_batch(
        &self,
        workflow: &WorkflowDefinition,
        quantity_planned: Quantity,
        title: Option<String>,
        author: &str,
    ) -> Result<BatchSnapshot, EngineError> {
        let batch = create_batch(workflow, quantity_planned, title, author)?;
        self.store.insert(&batch)?;
        info!(
            batch = %batch.id,
            workflow = %workflow.id,
            quantity = quantity_planned,
            "batch created"
        );
        BatchSnapshot::from_batch(&batch)
    }

    pub fn perform_quality_check(
        &self,
        batch_id: &EntityId,
        request: QualityCheckRequest,
    ) -> Result<BatchSnapshot, EngineError> {
        self.mutate(batch_id, |batch| quality_check::perform_quality_check(batch, request))
    }

    pub fn advance_stage(
        &self,
        batch_id: &EntityId,
        request: StageAdvanceRequest,
    ) -> Result<BatchSnapshot, EngineError> {
        self.mutate(batch_id, |batch| quality_check::advance_stage(batch, request))
    }

    pub fn resolve_rework_item(
        &self,
        batch_id: &EntityId,
        request: ReworkResolutionRequest,
    ) -> Result<BatchSnapshot, EngineError> {
        self.mutate(batch_id, |batch| rework::resolve_rework_item(batch, request))
    }

    pub fn reject_batch(
        &self,
        batch_id: &EntityId,
        reason: &str,
        by: Option<String>,
    ) -> Result<BatchSnapshot, EngineError> {
        self.mutate(batch_id, |batch| rejection::reject_batch(batch, reason, by))
    }

    pub fn get_batch(&self, batch_id: &EntityId) -> Result<BatchSnapshot, EngineError> {
        let batch = self.store.load(batch_id)?;
        BatchSnapshot::from_batch(&batch)
    }

    /// Load the raw batch document, event log included
    pub fn get_batch_document(&self, batch_id: &EntityId) -> Result<Batch, EngineError> {
        Ok(self.store.load(batch_id)?)
    }

    /// Every stored batch, oldest first; batches that fail to replay are skipped
    pub fn list_batches(&self) -> Result<Vec<BatchSnapshot>, EngineError> {
        let batches = self.store.list()?;
        let mut snapshots = Vec::with_capacity(batches.len());
        for batch in &batches {
            match BatchSnapshot::from_batch(batch) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(batch = %batch.id, error = %e, "skipping batch that does not replay"),
            }
        }
        Ok(snapshots)
    }

    fn mutate<F>(&self, batch_id: &EntityId, op: F) -> Result<BatchSnapshot, EngineError>
    where
        F: FnOnce(&mut Batch) -> Result<BatchState, EngineError>,
    {
        let mut batch = self.store.load(batch_id)?;
        let expected = batch.entity_revision;

        let state = op(&mut batch)?;

        batch.entity_revision = expected + 1;
        self.store.save(&batch, expected)?;
        Ok(BatchSnapshot::from_state(&batch, state))
    }
}
