//! `tbt report` command - Production reports across batches

mod batch_yield;
mod rework;

use clap::Subcommand;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::cli::GlobalOpts;

pub use batch_yield::YieldArgs;
pub use rework::ReworkArgs;

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Planned, produced and rejected quantities with yield per batch
    Yield(YieldArgs),

    /// Pending rework items across all batches
    Rework(ReworkArgs),
}

pub fn run(cmd: ReportCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ReportCommands::Yield(args) => batch_yield::run(args, global),
        ReportCommands::Rework(args) => rework::run(args, global),
    }
}

pub(crate) fn write_output(content: &str, output_path: Option<PathBuf>) -> Result<()> {
    match output_path {
        Some(path) => {
            let file = File::create(&path).into_diagnostic()?;
            let mut writer = BufWriter::new(file);
            writer.write_all(content.as_bytes()).into_diagnostic()?;
            writer.flush().into_diagnostic()?;
            println!("Report written to: {}", path.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
