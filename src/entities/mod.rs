//! Entity type definitions
//!
//! - [`WorkflowDefinition`] - ordered production stages with check gates
//! - [`Batch`] - a quantity of units moving through a workflow snapshot

pub mod batch;
pub mod workflow;

pub use batch::Batch;
pub use workflow::WorkflowDefinition;
