//! Batch yield report

use miette::Result;
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{truncate_str, CommandContext};
use crate::cli::GlobalOpts;
use crate::core::shortid::ShortIdIndex;
use crate::engine::BatchSnapshot;
use crate::entities::batch::BatchStatus;

use super::write_output;

#[derive(clap::Args, Debug)]
pub struct YieldArgs {
    /// Only include completed and rejected batches
    #[arg(long)]
    pub closed: bool,

    /// Output to file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: YieldArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let mut batches = ctx.batch_service()?.list_batches()?;
    if args.closed {
        batches.retain(|b| b.status.is_terminal());
    }

    let content = render(&batches, &ctx.short_ids);
    write_output(&content, args.output)
}

fn percent(part: u64, whole: u64) -> String {
    if whole == 0 {
        "-".to_string()
    } else {
        format!("{:.1}%", part as f64 * 100.0 / whole as f64)
    }
}

fn render(batches: &[BatchSnapshot], short_ids: &ShortIdIndex) -> String {
    let mut output = String::new();
    output.push_str("# Batch Yield Report\n\n");

    if batches.is_empty() {
        output.push_str("No batches found.\n");
        return output;
    }

    let mut planned = 0u64;
    let mut produced = 0u64;
    let mut rejected = 0u64;
    let mut in_rework = 0u64;
    for b in batches {
        planned += u64::from(b.quantity_planned);
        produced += u64::from(b.quantity_produced);
        rejected += u64::from(b.quantity_rejected);
        in_rework += b.quantity_in_rework;
    }

    output.push_str("## Summary\n\n");
    let mut summary = Builder::default();
    summary.push_record(["Metric", "Value"]);
    summary.push_record(["Batches", &batches.len().to_string()]);
    summary.push_record([
        "Open batches",
        &batches
            .iter()
            .filter(|b| matches!(b.status, BatchStatus::InProgress | BatchStatus::OnHold))
            .count()
            .to_string(),
    ]);
    summary.push_record(["Units planned", &planned.to_string()]);
    summary.push_record(["Units produced", &produced.to_string()]);
    summary.push_record(["Units rejected", &rejected.to_string()]);
    summary.push_record(["Units in rework", &in_rework.to_string()]);
    summary.push_record(["Overall yield", &percent(produced, planned)]);
    output.push_str(&summary.build().with(Style::markdown()).to_string());

    output.push_str("\n\n## Batches\n\n");
    let mut table = Builder::default();
    table.push_record([
        "ID", "Title", "Workflow", "Status", "Planned", "Produced", "Rejected", "In Rework", "Yield",
    ]);
    for b in batches {
        let id = b.id.to_string();
        table.push_record([
            short_ids.get_short_id(&id).unwrap_or(id),
            truncate_str(&b.title, 30),
            truncate_str(&b.workflow_title, 24),
            b.status.to_string(),
            b.quantity_planned.to_string(),
            b.quantity_produced.to_string(),
            b.quantity_rejected.to_string(),
            b.quantity_in_rework.to_string(),
            percent(u64::from(b.quantity_produced), u64::from(b.quantity_planned)),
        ]);
    }
    output.push_str(&table.build().with(Style::markdown()).to_string());
    output.push('\n');
    output
}
