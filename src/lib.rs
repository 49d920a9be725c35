//! TBT: Tessera Batch Tracker
//!
//! Tracks production batches through linear workflows as plain-text YAML
//! files. Quality checks split the quantity at each stage into passed, rework
//! and rejected portions, and every unit stays accounted for.

pub mod cli;
pub mod core;
pub mod engine;
pub mod entities;
pub mod yaml;
