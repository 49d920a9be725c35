//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    batch::BatchCommands, completions::CompletionsArgs, flow::FlowCommands, init::InitArgs,
    report::ReportCommands,
};

#[derive(Parser)]
#[command(name = "tbt")]
#[command(author, version, about = "Tessera Batch Tracker")]
#[command(long_about = "Track production batches through linear workflows with quality checks, rework and yield accounting, stored as plain text files.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .tbt/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new TBT project
    Init(InitArgs),

    /// Workflow definitions (ordered production stages)
    #[command(subcommand)]
    Flow(FlowCommands),

    /// Production batches, quality checks and rework
    #[command(subcommand)]
    Batch(BatchCommands),

    /// Generate yield and rework reports
    #[command(subcommand)]
    Report(ReportCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (pretty for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Just IDs, one per line
    Id,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

impl GlobalOpts {
    /// Resolve `auto` against a configured default, then the command's default
    pub fn resolved_format(&self, configured: Option<&str>, fallback: OutputFormat) -> OutputFormat {
        match self.format {
            OutputFormat::Auto => configured
                .and_then(|f| f.parse::<OutputFormat>().ok())
                .filter(|f| *f != OutputFormat::Auto)
                .unwrap_or(fallback),
            f => f,
        }
    }
}
