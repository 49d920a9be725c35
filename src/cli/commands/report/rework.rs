//! Pending rework report

use miette::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{format_short_id, truncate_str, CommandContext};
use crate::cli::GlobalOpts;
use crate::core::shortid::ShortIdIndex;
use crate::engine::BatchSnapshot;

use super::write_output;

#[derive(clap::Args, Debug)]
pub struct ReworkArgs {
    /// Include resolved items
    #[arg(long)]
    pub all: bool,

    /// Output to file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: ReworkArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let batches = ctx.batch_service()?.list_batches()?;
    let content = render(&batches, &ctx.short_ids, args.all);
    write_output(&content, args.output)
}

fn render(batches: &[BatchSnapshot], short_ids: &ShortIdIndex, include_resolved: bool) -> String {
    let mut output = String::new();
    output.push_str("# Rework Report\n\n");

    let items: Vec<_> = batches
        .iter()
        .flat_map(|b| b.rework_items.iter().map(move |r| (b, r)))
        .filter(|(_, r)| include_resolved || r.is_pending())
        .collect();

    if items.is_empty() {
        output.push_str("No rework items.\n");
        return output;
    }

    // Pending units per originating stage
    let mut by_stage: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for (_, item) in items.iter().filter(|(_, r)| r.is_pending()) {
        let entry = by_stage.entry(item.stage_name.as_str()).or_default();
        entry.0 += 1;
        entry.1 += u64::from(item.quantity);
    }

    if !by_stage.is_empty() {
        output.push_str("## Pending by Stage\n\n");
        let mut summary = Builder::default();
        summary.push_record(["Stage", "Items", "Units"]);
        for (stage, (count, units)) in &by_stage {
            summary.push_record([stage.to_string(), count.to_string(), units.to_string()]);
        }
        output.push_str(&summary.build().with(Style::markdown()).to_string());
        output.push_str("\n\n");
    }

    output.push_str("## Items\n\n");
    let mut table = Builder::default();
    table.push_record(["Batch", "Rework", "Stage", "Qty", "Status", "Outcome", "Reason"]);
    for (batch, item) in &items {
        let batch_id = batch.id.to_string();
        let outcome = item
            .resolution
            .as_ref()
            .map(|r| format!("{} passed / {} rejected", r.passed, r.rejected))
            .unwrap_or_default();
        table.push_record([
            short_ids.get_short_id(&batch_id).unwrap_or(batch_id),
            format_short_id(&item.id),
            item.stage_name.clone(),
            item.quantity.to_string(),
            item.status.to_string(),
            outcome,
            truncate_str(&item.reason, 40),
        ]);
    }
    output.push_str(&table.build().with(Style::markdown()).to_string());
    output.push('\n');
    output
}
