//! FLOW entity type - linear production workflow definitions
//!
//! A workflow is an ordered list of stages. Batches never reference a workflow
//! file directly: they carry a [`WorkflowSnapshot`] taken at creation time, so
//! later edits to the definition cannot change a batch in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// Verification parameter declared on a stage (echoed into check samples)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationParameter {
    /// Parameter name (e.g. "Bore diameter")
    pub name: String,

    /// Specification text (e.g. "10.00 +/- 0.05 mm")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
}

/// A single stage in a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStage {
    /// Stage identifier (STG-xxx)
    pub stage_id: EntityId,

    /// Display name
    pub name: String,

    /// Position in the workflow; unique and ascending
    pub sequence_order: u32,

    /// Whether the stage is gated by a quality check
    #[serde(default)]
    pub quality_check_required: bool,

    /// Parameters verified during the quality check
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<VerificationParameter>,
}

impl WorkflowStage {
    /// Create a stage with a fresh id
    pub fn new(name: impl Into<String>, sequence_order: u32, quality_check_required: bool) -> Self {
        Self {
            stage_id: EntityId::new(EntityPrefix::Stg),
            name: name.into(),
            sequence_order,
            quality_check_required,
            parameters: Vec::new(),
        }
    }

    /// Look up a declared parameter's specification by name (case-insensitive)
    pub fn specification_for(&self, parameter: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(parameter))
            .and_then(|p| p.specification.as_deref())
    }
}

/// Problems with a workflow's stage list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("workflow has no stages")]
    NoStages,

    #[error("stage {0} appears more than once")]
    DuplicateStageId(String),

    #[error("sequence order {0} is used by more than one stage")]
    DuplicateSequence(u32),

    #[error("stage at sequence {0} has an empty name")]
    EmptyStageName(u32),
}

/// Workflow definition entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier (FLOW-xxx)
    pub id: EntityId,

    /// Descriptive title
    pub title: String,

    /// Stages (stored in any order; sorted by `sequence_order` when snapshotted)
    #[serde(default)]
    pub stages: Vec<WorkflowStage>,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Author
    pub author: String,
}

impl Entity for WorkflowDefinition {
    const PREFIX: EntityPrefix = EntityPrefix::Flow;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn author(&self) -> &str {
        &self.author
    }
}

impl WorkflowDefinition {
    /// Create an empty workflow
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Flow),
            title: title.into(),
            stages: Vec::new(),
            created: Utc::now(),
            author: author.into(),
        }
    }

    /// Append a stage after the current last one
    pub fn push_stage(&mut self, name: impl Into<String>, quality_check_required: bool) -> &mut WorkflowStage {
        let next = self
            .stages
            .iter()
            .map(|s| s.sequence_order)
            .max()
            .map_or(1, |m| m + 1);
        self.stages
            .push(WorkflowStage::new(name, next, quality_check_required));
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }

    /// Check the stage list is usable as a linear workflow
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.stages.is_empty() {
            return Err(WorkflowError::NoStages);
        }

        let mut ids = HashSet::new();
        let mut orders = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(WorkflowError::EmptyStageName(stage.sequence_order));
            }
            if !ids.insert(stage.stage_id.to_string()) {
                return Err(WorkflowError::DuplicateStageId(stage.stage_id.to_string()));
            }
            if !orders.insert(stage.sequence_order) {
                return Err(WorkflowError::DuplicateSequence(stage.sequence_order));
            }
        }
        Ok(())
    }

    /// Validate and take an immutable, ordered copy for a batch
    pub fn snapshot(&self) -> Result<WorkflowSnapshot, WorkflowError> {
        self.validate()?;
        let mut stages = self.stages.clone();
        stages.sort_by_key(|s| s.sequence_order);
        Ok(WorkflowSnapshot {
            workflow_id: self.id.clone(),
            title: self.title.clone(),
            stages,
        })
    }
}

/// Ordered stage list frozen into a batch at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// Workflow the snapshot was taken from
    pub workflow_id: EntityId,

    /// Workflow title at snapshot time
    pub title: String,

    /// Stages sorted by ascending `sequence_order`
    pub stages: Vec<WorkflowStage>,
}

impl WorkflowSnapshot {
    /// First stage of the workflow
    pub fn first_stage(&self) -> Option<&WorkflowStage> {
        self.stages.first()
    }

    /// Look up a stage by id
    pub fn stage(&self, stage_id: &EntityId) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| &s.stage_id == stage_id)
    }

    /// Stage following `stage_id`, or None if it is the last one
    pub fn next_stage(&self, stage_id: &EntityId) -> Option<&WorkflowStage> {
        let idx = self.stages.iter().position(|s| &s.stage_id == stage_id)?;
        self.stages.get(idx + 1)
    }

    /// Whether `stage_id` is the final stage
    pub fn is_last_stage(&self, stage_id: &EntityId) -> bool {
        self.stages
            .last()
            .is_some_and(|s| &s.stage_id == stage_id)
    }

    /// Find a stage by id string, id prefix, or case-insensitive name
    pub fn find_stage(&self, reference: &str) -> Option<&WorkflowStage> {
        self.stages
            .iter()
            .find(|s| s.stage_id.to_string() == reference)
            .or_else(|| {
                self.stages
                    .iter()
                    .find(|s| s.name.eq_ignore_ascii_case(reference))
            })
            .or_else(|| {
                let upper = reference.to_uppercase();
                let mut matches = self
                    .stages
                    .iter()
                    .filter(|s| s.stage_id.to_string().starts_with(&upper));
                match (matches.next(), matches.next()) {
                    (Some(stage), None) => Some(stage),
                    _ => None,
                }
            })
    }
}
