//! CLI command implementations

pub mod batch;
pub mod completions;
pub mod flow;
pub mod init;
pub mod report;
