//! BAT entity type - production batch moving through a linear workflow
//!
//! A batch document stores only what cannot be derived: the workflow snapshot,
//! the planned quantity, and an append-only event log. Counters, the active
//! stage, stage history and rework items are rebuilt by replaying the log
//! (see [`crate::engine::projection`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::entities::workflow::WorkflowSnapshot;

/// Unit count type used for every batch quantity
pub type Quantity = u32;

/// Batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Main flow still has an active stage
    InProgress,
    /// Main flow finished, rework items still pending
    OnHold,
    /// Main flow finished and all rework resolved
    Completed,
    /// Closed by an operator
    Rejected,
}

impl BatchStatus {
    /// Terminal statuses accept no further mutations
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Rejected)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::InProgress => write!(f, "in_progress"),
            BatchStatus::OnHold => write!(f, "on_hold"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" | "inprogress" => Ok(BatchStatus::InProgress),
            "on_hold" | "onhold" => Ok(BatchStatus::OnHold),
            "completed" => Ok(BatchStatus::Completed),
            "rejected" => Ok(BatchStatus::Rejected),
            _ => Err(format!(
                "Invalid batch status: {}. Use in_progress, on_hold, completed, or rejected",
                s
            )),
        }
    }
}

/// Three-way split of the quantity at a quality check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub passed: Quantity,
    pub rework: Quantity,
    pub rejected: Quantity,
}

impl Disposition {
    pub fn new(passed: Quantity, rework: Quantity, rejected: Quantity) -> Self {
        Self {
            passed,
            rework,
            rejected,
        }
    }

    /// Sum of all three portions, widened so it cannot overflow
    pub fn total(&self) -> u64 {
        u64::from(self.passed) + u64::from(self.rework) + u64::from(self.rejected)
    }
}

/// Two-way split used to resolve a rework item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReworkDisposition {
    pub passed: Quantity,
    pub rejected: Quantity,
}

impl ReworkDisposition {
    pub fn new(passed: Quantity, rejected: Quantity) -> Self {
        Self { passed, rejected }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.passed) + u64::from(self.rejected)
    }
}

/// Pass/fail outcome of one sampled parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleResult {
    Pass,
    Fail,
}

impl std::fmt::Display for SampleResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleResult::Pass => write!(f, "pass"),
            SampleResult::Fail => write!(f, "fail"),
        }
    }
}

impl std::str::FromStr for SampleResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" | "ok" | "p" => Ok(SampleResult::Pass),
            "fail" | "nok" | "f" => Ok(SampleResult::Fail),
            _ => Err(format!("Invalid sample result: {}. Use pass or fail", s)),
        }
    }
}

/// Measurement recorded during a quality check
///
/// Specifications are echoed from the stage definition for reporting and are
/// not interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleData {
    pub parameter: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,

    pub observed: String,

    pub result: SampleResult,
}

/// Quality check record; appended, never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCheckRecord {
    /// Check identifier (QC-xxx)
    pub id: EntityId,

    /// Stage the check was performed at
    pub stage_id: EntityId,

    /// Stage name at the time of the check
    pub stage_name: String,

    /// Quantity that was at the stage when it was dispositioned
    pub quantity_checked: Quantity,

    pub disposition: Disposition,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples_data: Vec<SampleData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Person who performed the check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector: Option<String>,

    pub check_date: DateTime<Utc>,
}

/// Rework item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReworkStatus {
    Pending,
    Resolved,
}

impl std::fmt::Display for ReworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReworkStatus::Pending => write!(f, "pending"),
            ReworkStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Final outcome of a rework item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReworkResolution {
    pub passed: Quantity,
    pub rejected: Quantity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,

    pub resolved_date: DateTime<Utc>,
}

/// Sub-quantity pulled out of the main flow for remedial handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReworkItem {
    /// Rework identifier (RWK-xxx)
    pub id: EntityId,

    /// Stage the quantity was pulled from
    pub stage_id: EntityId,

    pub stage_name: String,

    pub quantity: Quantity,

    pub reason: String,

    pub status: ReworkStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ReworkResolution>,

    /// Quality check that created the item
    pub source_check: EntityId,
}

impl ReworkItem {
    pub fn is_pending(&self) -> bool {
        self.status == ReworkStatus::Pending
    }
}

/// Rework item spawned by a quality check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRework {
    pub id: EntityId,
    pub reason: String,
}

/// Append-only batch history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A disposition was applied at the active stage
    QualityChecked {
        record: QualityCheckRecord,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rework: Option<NewRework>,
    },

    /// Whole active quantity moved on from a stage without a required check
    StageAdvanced {
        stage_id: EntityId,
        quantity: Quantity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
        date: DateTime<Utc>,
    },

    /// A pending rework item was split into passed / rejected
    ReworkResolved {
        rework_id: EntityId,
        resolution: ReworkResolution,
    },

    /// Operator closed the batch as rejected
    BatchRejected {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        by: Option<String>,
        date: DateTime<Utc>,
    },
}

impl BatchEvent {
    /// Short label used in history listings
    pub fn label(&self) -> &'static str {
        match self {
            BatchEvent::QualityChecked { .. } => "quality_checked",
            BatchEvent::StageAdvanced { .. } => "stage_advanced",
            BatchEvent::ReworkResolved { .. } => "rework_resolved",
            BatchEvent::BatchRejected { .. } => "batch_rejected",
        }
    }

    /// When the event happened
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            BatchEvent::QualityChecked { record, .. } => record.check_date,
            BatchEvent::StageAdvanced { date, .. } => *date,
            BatchEvent::ReworkResolved { resolution, .. } => resolution.resolved_date,
            BatchEvent::BatchRejected { date, .. } => *date,
        }
    }
}

/// Production batch entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier (BAT-xxx)
    pub id: EntityId,

    /// Descriptive title
    pub title: String,

    /// Stage list frozen at creation
    pub workflow: WorkflowSnapshot,

    /// Units started into the batch
    pub quantity_planned: Quantity,

    /// Event log
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<BatchEvent>,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Author
    pub author: String,

    /// Optimistic concurrency token, bumped on every committed change
    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

fn default_revision() -> u32 {
    1
}

impl Entity for Batch {
    const PREFIX: EntityPrefix = EntityPrefix::Bat;

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

impl Batch {
    /// Create a new batch; see [`crate::engine::create_batch`] for the validated path
    pub fn new(
        title: String,
        workflow: WorkflowSnapshot,
        quantity_planned: Quantity,
        author: String,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Bat),
            title,
            workflow,
            quantity_planned,
            events: Vec::new(),
            created: Utc::now(),
            author,
            entity_revision: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_parsing() {
        assert_eq!(
            "in_progress".parse::<BatchStatus>().unwrap(),
            BatchStatus::InProgress
        );
        assert_eq!("on_hold".parse::<BatchStatus>().unwrap(), BatchStatus::OnHold);
        assert_eq!(
            "Completed".parse::<BatchStatus>().unwrap(),
            BatchStatus::Completed
        );
        assert!("scrapped".parse::<BatchStatus>().is_err());
        assert!(BatchStatus::Rejected.is_terminal());
        assert!(!BatchStatus::OnHold.is_terminal());
    }

    #[test]
    fn test_disposition_total_does_not_overflow() {
        let d = Disposition::new(u32::MAX, u32::MAX, 1);
        assert_eq!(d.total(), 2 * u64::from(u32::MAX) + 1);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = BatchEvent::BatchRejected {
            reason: "Contaminated coolant".to_string(),
            by: None,
            date: Utc::now(),
        };
        let yaml = serde_yml::to_string(&event).unwrap();
        assert!(yaml.contains("event: batch_rejected"));
        assert!(yaml.contains("Contaminated coolant"));

        let back: BatchEvent = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_sample_result_parsing() {
        assert_eq!("PASS".parse::<SampleResult>().unwrap(), SampleResult::Pass);
        assert_eq!("fail".parse::<SampleResult>().unwrap(), SampleResult::Fail);
        assert!("maybe".parse::<SampleResult>().is_err());
    }
}
