//! Engine error taxonomy

use miette::Diagnostic;
use thiserror::Error;

use crate::core::store::StoreError;
use crate::entities::batch::BatchStatus;
use crate::entities::workflow::WorkflowError;

/// Rejected request; nothing was changed and the caller may resubmit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("batch is {status}; only in-progress batches accept stage operations")]
    BatchNotInProgress { status: BatchStatus },

    #[error("batch is {status} and cannot be changed")]
    BatchClosed { status: BatchStatus },

    #[error("stage {requested} is not the active stage (active: {active})")]
    StaleStage { requested: String, active: String },

    #[error("disposition accounts for {actual} units but {expected} are at the stage")]
    DispositionMismatch { expected: u64, actual: u64 },

    #[error("{field} must not be negative (got {value})")]
    NegativeQuantity { field: &'static str, value: i64 },

    #[error("{field} is too large (got {value})")]
    QuantityTooLarge { field: &'static str, value: i64 },

    #[error("planned quantity must be greater than zero")]
    ZeroPlannedQuantity,

    #[error("rework item {0} does not exist on this batch")]
    UnknownReworkItem(String),

    #[error("rework item {0} is already resolved")]
    ReworkAlreadyResolved(String),

    #[error("rework resolution accounts for {actual} units but the item holds {expected}")]
    ReworkMismatch { expected: u32, actual: u64 },

    #[error("stage {stage} requires a quality check before the batch can move on")]
    QualityCheckRequired { stage: String },

    #[error("a reason is required")]
    MissingReason,

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowError),
}

/// Errors returned by engine operations
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid request for batch {batch_id}: {source}")]
    #[diagnostic(
        code(tbt::engine::validation),
        help("the batch was not changed; correct the values and resubmit")
    )]
    Validation {
        batch_id: String,
        #[source]
        source: ValidationError,
    },

    #[error("batch {batch_id} was modified concurrently: {detail}")]
    #[diagnostic(
        code(tbt::engine::conflict),
        help("reload the batch and retry the operation")
    )]
    Conflict { batch_id: String, detail: String },

    #[error("invariant violated on batch {batch_id}: {detail}")]
    #[diagnostic(
        code(tbt::engine::invariant),
        help("the change was aborted; this indicates a defect or a hand-edited batch file")
    )]
    InvariantViolation { batch_id: String, detail: String },

    #[error("{kind} '{id}' not found")]
    #[diagnostic(code(tbt::engine::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(StoreError),
}

impl EngineError {
    pub fn validation(batch_id: impl ToString, source: ValidationError) -> Self {
        EngineError::Validation {
            batch_id: batch_id.to_string(),
            source,
        }
    }

    pub fn invariant(batch_id: impl ToString, detail: impl Into<String>) -> Self {
        EngineError::InvariantViolation {
            batch_id: batch_id.to_string(),
            detail: detail.into(),
        }
    }

    /// Whether refetching and retrying may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    /// The validation failure, if this is one
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            EngineError::Validation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        let detail = err.to_string();
        match err {
            StoreError::NotFound(id) => EngineError::NotFound { kind: "batch", id },
            StoreError::RevisionMismatch { id, .. } | StoreError::Locked(id) => {
                EngineError::Conflict {
                    batch_id: id,
                    detail,
                }
            }
            other => EngineError::Storage(other),
        }
    }
}

/// Convert a signed quantity from an outer boundary into a unit count
pub fn quantity_from_signed(field: &'static str, value: i64) -> Result<u32, ValidationError> {
    if value < 0 {
        return Err(ValidationError::NegativeQuantity { field, value });
    }
    u32::try_from(value).map_err(|_| ValidationError::QuantityTooLarge { field, value })
}
