//! `tbt batch` command - Production batches, quality checks and rework

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;

use crate::cli::helpers::{
    confirm, format_date_local, format_short_id, print_csv, print_structured, short_id_hint, styled_status,
    truncate_str, CommandContext,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::loader::load_entity;
use crate::engine::{
    quantity_from_signed, ActiveStage, BatchSnapshot, EngineError, QualityCheckRequest, ReworkResolutionRequest,
    StageAdvanceRequest, StageOutcome, ValidationError,
};
use crate::entities::batch::{Batch, BatchEvent, BatchStatus, Disposition, ReworkDisposition, SampleData, SampleResult};
use crate::entities::workflow::WorkflowDefinition;

#[derive(Subcommand, Debug)]
pub enum BatchCommands {
    /// Start a new batch on a workflow
    New(NewArgs),

    /// List batches with filtering
    List(ListArgs),

    /// Show a batch's state, stage history and rework items
    Show(ShowArgs),

    /// Record a quality check at the active stage
    Check(CheckArgs),

    /// Move the active quantity past a stage that needs no check
    Advance(AdvanceArgs),

    /// Resolve a pending rework item
    Resolve(ResolveArgs),

    /// Reject the whole batch
    Reject(RejectArgs),

    /// Show the batch's event log
    History(ShowArgs),
}

/// Batch status filter
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    InProgress,
    OnHold,
    Completed,
    Rejected,
    All,
}

impl StatusFilter {
    fn matches(self, status: BatchStatus) -> bool {
        match self {
            StatusFilter::InProgress => status == BatchStatus::InProgress,
            StatusFilter::OnHold => status == BatchStatus::OnHold,
            StatusFilter::Completed => status == BatchStatus::Completed,
            StatusFilter::Rejected => status == BatchStatus::Rejected,
            StatusFilter::All => true,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Workflow ID or short ID (FLOW@N)
    #[arg(long, short = 'w')]
    pub workflow: String,

    /// Units started into the batch
    #[arg(long, short = 'Q', allow_negative_numbers = true)]
    pub quantity: i64,

    /// Batch title (default: "<workflow title> batch")
    #[arg(long, short = 't')]
    pub title: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by status
    #[arg(long, short = 's', default_value = "all")]
    pub status: StatusFilter,

    /// Show only active batches (in progress or on hold)
    #[arg(long)]
    pub active: bool,

    /// Search in title and workflow title
    #[arg(long)]
    pub search: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Batch ID or short ID (BAT@N)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Batch ID or short ID (BAT@N)
    pub id: String,

    /// Stage being checked, by name or ID
    ///
    /// Without it the check applies to whichever stage is active when the
    /// command runs, so a repeated command lands on the next stage. Pass it
    /// in scripts so a re-run fails as stale instead.
    #[arg(long)]
    pub stage: Option<String>,

    /// Units that pass and continue down the workflow
    #[arg(long, allow_negative_numbers = true)]
    pub passed: i64,

    /// Units pulled out for rework
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rework: i64,

    /// Units scrapped
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rejected: i64,

    /// Sample measurement as PARAM=OBSERVED:pass|fail (repeatable)
    #[arg(long = "sample")]
    pub samples: Vec<String>,

    /// Notes about the check
    #[arg(long, short = 'n')]
    pub notes: Option<String>,

    /// Reason recorded on the rework item (default: the notes)
    #[arg(long)]
    pub reason: Option<String>,

    /// Inspector name (defaults to config author)
    #[arg(long)]
    pub inspector: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct AdvanceArgs {
    /// Batch ID or short ID (BAT@N)
    pub id: String,

    /// Stage being passed, by name or ID
    ///
    /// Without it the stage active when the command runs is passed.
    #[arg(long)]
    pub stage: Option<String>,

    /// Operator name (defaults to config author)
    #[arg(long, short = 'o')]
    pub operator: Option<String>,

    /// Notes about the step
    #[arg(long, short = 'n')]
    pub notes: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Batch ID or short ID (BAT@N)
    pub id: String,

    /// Rework item ID, ID prefix, or its number in `batch show`
    pub rework: String,

    /// Reworked units that passed
    #[arg(long, allow_negative_numbers = true)]
    pub passed: i64,

    /// Reworked units scrapped
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rejected: i64,

    /// Notes about the resolution
    #[arg(long, short = 'n')]
    pub notes: Option<String>,

    /// Who resolved the item (defaults to config author)
    #[arg(long)]
    pub by: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RejectArgs {
    /// Batch ID or short ID (BAT@N)
    pub id: String,

    /// Why the batch is rejected
    #[arg(long, short = 'r')]
    pub reason: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Run a batch subcommand
pub fn run(cmd: BatchCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BatchCommands::New(args) => run_new(args, global),
        BatchCommands::List(args) => run_list(args, global),
        BatchCommands::Show(args) => run_show(args, global),
        BatchCommands::Check(args) => run_check(args, global),
        BatchCommands::Advance(args) => run_advance(args, global),
        BatchCommands::Resolve(args) => run_resolve(args, global),
        BatchCommands::Reject(args) => run_reject(args, global),
        BatchCommands::History(args) => run_history(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = CommandContext::open(global)?;

    let resolved = ctx
        .short_ids
        .resolve(&args.workflow)
        .ok_or_else(|| miette::miette!("Unknown short ID '{}'", args.workflow))?;
    let (_, workflow) = load_entity::<WorkflowDefinition>(&ctx.project, &resolved)?
        .ok_or_else(|| miette::miette!("No workflow found matching '{}'", args.workflow))?;

    let quantity = quantity_from_signed("quantity", args.quantity)
        .map_err(|e| EngineError::validation("(new)", e))?;

    let service = ctx.batch_service()?;
    let snapshot = service.create_batch(&workflow, quantity, args.title, &ctx.config.author())?;

    ctx.remember([snapshot.id.to_string()]);
    print_outcome(&ctx, global, &snapshot, "Created batch")
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = CommandContext::open(global)?;
    let service = ctx.batch_service()?;

    let mut batches: Vec<BatchSnapshot> = service
        .list_batches()?
        .into_iter()
        .filter(|b| args.status.matches(b.status))
        .filter(|b| !args.active || matches!(b.status, BatchStatus::InProgress | BatchStatus::OnHold))
        .filter(|b| {
            args.search.as_ref().map_or(true, |search| {
                let needle = search.to_lowercase();
                b.title.to_lowercase().contains(&needle) || b.workflow_title.to_lowercase().contains(&needle)
            })
        })
        .collect();

    if let Some(limit) = args.limit {
        batches.truncate(limit);
    }

    if args.count {
        println!("{}", batches.len());
        return Ok(());
    }
    if batches.is_empty() {
        println!("No batches found.");
        return Ok(());
    }

    ctx.remember(batches.iter().map(|b| b.id.to_string()));

    let format = ctx.format(global, OutputFormat::Tsv);
    if print_structured(&batches, format)? {
        return Ok(());
    }
    match format {
        OutputFormat::Id => {
            for batch in &batches {
                println!("{}", batch.id);
            }
        }
        OutputFormat::Csv => {
            print_csv(
                &[
                    "short_id", "id", "title", "status", "stage", "planned", "produced", "rejected", "in_rework",
                ],
                batches.iter().map(|b| {
                    vec![
                        ctx.short_ids.get_short_id(&b.id.to_string()).unwrap_or_default(),
                        b.id.to_string(),
                        b.title.clone(),
                        b.status.to_string(),
                        b.active_stage_name().unwrap_or("").to_string(),
                        b.quantity_planned.to_string(),
                        b.quantity_produced.to_string(),
                        b.quantity_rejected.to_string(),
                        b.quantity_in_rework.to_string(),
                    ]
                }),
            )?;
        }
        _ => {
            println!(
                "{:<8} {:<17} {:<24} {:<12} {:<18} {:>7} {:>8} {:>8} {:>7}",
                style("SHORT").bold().dim(),
                style("ID").bold(),
                style("TITLE").bold(),
                style("STATUS").bold(),
                style("STAGE").bold(),
                style("PLANNED").bold(),
                style("PRODUCED").bold(),
                style("REJECTED").bold(),
                style("REWORK").bold()
            );
            println!("{}", "-".repeat(118));
            for batch in &batches {
                println!(
                    "{:<8} {:<17} {:<24} {:<12} {:<18} {:>7} {:>8} {:>8} {:>7}",
                    style(ctx.short_ids.get_short_id(&batch.id.to_string()).unwrap_or_default()).cyan(),
                    format_short_id(&batch.id),
                    truncate_str(&batch.title, 22),
                    styled_status(batch.status),
                    truncate_str(batch.active_stage_name().unwrap_or("-"), 16),
                    batch.quantity_planned,
                    batch.quantity_produced,
                    batch.quantity_rejected,
                    batch.quantity_in_rework
                );
            }
            println!();
            println!(
                "{} batch(es) found. Use {} to reference by short ID.",
                style(batches.len()).cyan(),
                style(short_id_hint(EntityPrefix::Bat)).cyan()
            );
        }
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let id = ctx.resolve_id::<Batch>(&args.id)?;
    let snapshot = ctx.batch_service()?.get_batch(&id)?;

    let format = ctx.format(global, OutputFormat::Auto);
    if print_structured(&snapshot, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        println!("{}", snapshot.id);
        return Ok(());
    }

    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("ID").bold(), style(&snapshot.id.to_string()).cyan());
    println!("{}: {}", style("Title").bold(), style(&snapshot.title).yellow());
    println!(
        "{}: {} {}",
        style("Workflow").bold(),
        snapshot.workflow_title,
        style(format_short_id(&snapshot.workflow_id)).dim()
    );
    println!("{}: {}", style("Status").bold(), styled_status(snapshot.status));
    match &snapshot.current_stage {
        ActiveStage::AtStage(stage) => println!(
            "{}: {} ({} units)",
            style("Active Stage").bold(),
            style(&stage.name).yellow(),
            stage.quantity
        ),
        ActiveStage::NoActiveStage => println!("{}: {}", style("Active Stage").bold(), style("none").dim()),
    }
    if let Some(rejection) = &snapshot.rejection {
        println!("{}: {}", style("Rejected").bold(), style(&rejection.reason).red());
    }
    println!("{}", style("─".repeat(60)).dim());

    println!();
    println!("{}:", style("Quantities").bold());
    println!("  Planned:   {}", snapshot.quantity_planned);
    println!("  Produced:  {}", style(snapshot.quantity_produced).green());
    println!("  Rejected:  {}", style(snapshot.quantity_rejected).red());
    println!("  In rework: {}", style(snapshot.quantity_in_rework).yellow());
    if let Some(y) = snapshot.yield_percent() {
        println!("  Yield:     {:.1}%", y);
    }

    if !snapshot.stages_history.is_empty() {
        println!();
        println!("{} ({}):", style("Stage History").bold(), snapshot.stages_history.len());
        for record in &snapshot.stages_history {
            match &record.outcome {
                StageOutcome::QualityCheck(check) => {
                    let d = check.disposition;
                    println!(
                        "  {}. {} - checked {}: {} passed, {} rework, {} rejected",
                        record.sequence_order,
                        record.name,
                        record.quantity_in,
                        style(d.passed).green(),
                        style(d.rework).yellow(),
                        style(d.rejected).red()
                    );
                    for sample in &check.samples_data {
                        let result = match sample.result {
                            SampleResult::Pass => style(sample.result.to_string()).green(),
                            SampleResult::Fail => style(sample.result.to_string()).red(),
                        };
                        println!(
                            "       {} = {} [{}] {}",
                            sample.parameter,
                            sample.observed,
                            result,
                            style(sample.specification.as_deref().unwrap_or("")).dim()
                        );
                    }
                }
                StageOutcome::PassedThrough { .. } => {
                    println!(
                        "  {}. {} - passed through {}",
                        record.sequence_order, record.name, record.quantity_out
                    );
                }
            }
        }
    }

    if !snapshot.rework_items.is_empty() {
        println!();
        println!("{} ({}):", style("Rework Items").bold(), snapshot.rework_items.len());
        for (i, item) in snapshot.rework_items.iter().enumerate() {
            let status = if item.is_pending() {
                style(item.status.to_string()).yellow()
            } else {
                style(item.status.to_string()).green()
            };
            print!(
                "  {}. {} {} units from {} [{}]",
                i + 1,
                style(format_short_id(&item.id)).cyan(),
                item.quantity,
                item.stage_name,
                status
            );
            if let Some(res) = &item.resolution {
                print!(" - {} passed, {} rejected", res.passed, res.rejected);
            }
            println!();
            println!("     {}", style(&item.reason).dim());
        }
    }

    println!("{}", style("─".repeat(60)).dim());
    println!(
        "{}: {} | {}: {} | {}: {}",
        style("Author").dim(),
        snapshot.author,
        style("Created").dim(),
        format_date_local(&snapshot.created),
        style("Revision").dim(),
        snapshot.revision
    );
    Ok(())
}

fn run_check(args: CheckArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let id = ctx.resolve_id::<Batch>(&args.id)?;
    let service = ctx.batch_service()?;
    let batch = service.get_batch_document(&id)?;

    let disposition = Disposition::new(
        signed(&id, "passed", args.passed)?,
        signed(&id, "rework", args.rework)?,
        signed(&id, "rejected", args.rejected)?,
    );
    let samples_data = args
        .samples
        .iter()
        .map(String::as_str)
        .map(parse_sample)
        .collect::<Result<Vec<_>>>()?;

    let stage_id = target_stage(&batch, args.stage.as_deref())?;
    let action = format!("Recorded quality check at {} on", stage_label(&batch, &stage_id));
    let request = QualityCheckRequest {
        stage_id,
        disposition,
        samples_data,
        notes: args.notes,
        inspector: Some(ctx.operator(args.inspector)),
        rework_reason: args.reason,
    };

    let snapshot = service.perform_quality_check(&id, request)?;
    print_outcome(&ctx, global, &snapshot, &action)
}

fn run_advance(args: AdvanceArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let id = ctx.resolve_id::<Batch>(&args.id)?;
    let service = ctx.batch_service()?;
    let batch = service.get_batch_document(&id)?;

    let stage_id = target_stage(&batch, args.stage.as_deref())?;
    let action = format!("Advanced past {} on", stage_label(&batch, &stage_id));
    let request = StageAdvanceRequest {
        stage_id,
        operator: Some(ctx.operator(args.operator)),
        notes: args.notes,
    };
    let snapshot = service.advance_stage(&id, request)?;
    print_outcome(&ctx, global, &snapshot, &action)
}

fn run_resolve(args: ResolveArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let id = ctx.resolve_id::<Batch>(&args.id)?;
    let service = ctx.batch_service()?;
    let current = service.get_batch(&id)?;

    let rework_id = find_rework(&current, &args.rework)
        .ok_or_else(|| EngineError::validation(&id, ValidationError::UnknownReworkItem(args.rework.clone())))?;
    let mut request = ReworkResolutionRequest::new(
        rework_id,
        ReworkDisposition::new(
            signed(&id, "passed", args.passed)?,
            signed(&id, "rejected", args.rejected)?,
        ),
    );
    request.notes = args.notes;
    request.resolved_by = Some(ctx.operator(args.by));

    let snapshot = service.resolve_rework_item(&id, request)?;
    print_outcome(&ctx, global, &snapshot, "Resolved rework on")
}

fn run_reject(args: RejectArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let id = ctx.resolve_id::<Batch>(&args.id)?;
    let service = ctx.batch_service()?;

    let prompt = format!("Reject batch {}? This cannot be undone", ctx.display_id(&id));
    if !confirm(&prompt, args.yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    let snapshot = service.reject_batch(&id, &args.reason, Some(ctx.config.author()))?;
    print_outcome(&ctx, global, &snapshot, "Rejected")
}

fn run_history(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let id = ctx.resolve_id::<Batch>(&args.id)?;
    let batch = ctx.batch_service()?.get_batch_document(&id)?;

    let format = ctx.format(global, OutputFormat::Tsv);
    if print_structured(&batch.events, format)? {
        return Ok(());
    }
    if batch.events.is_empty() {
        println!("No events recorded for {}.", ctx.display_id(&id));
        return Ok(());
    }

    let rows: Vec<[String; 3]> = batch
        .events
        .iter()
        .map(|event| {
            [
                format_date_local(&event.date()),
                event.label().to_string(),
                describe_event(&batch, event),
            ]
        })
        .collect();

    match format {
        OutputFormat::Csv => print_csv(&["date", "event", "detail"], rows.into_iter().map(Vec::from))?,
        _ => {
            println!(
                "{:<17} {:<16} {}",
                style("DATE").bold(),
                style("EVENT").bold(),
                style("DETAIL").bold()
            );
            println!("{}", "-".repeat(80));
            for [date, label, detail] in rows {
                println!("{:<17} {:<16} {}", date, style(label).cyan(), detail);
            }
        }
    }
    Ok(())
}

fn describe_event(batch: &Batch, event: &BatchEvent) -> String {
    let stage_name = |id: &EntityId| {
        batch
            .workflow
            .stage(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    };
    match event {
        BatchEvent::QualityChecked { record, .. } => {
            let d = record.disposition;
            format!(
                "{}: {} passed, {} rework, {} rejected",
                record.stage_name, d.passed, d.rework, d.rejected
            )
        }
        BatchEvent::StageAdvanced { stage_id, quantity, .. } => {
            format!("{}: {} passed through", stage_name(stage_id), quantity)
        }
        BatchEvent::ReworkResolved { rework_id, resolution } => format!(
            "{}: {} passed, {} rejected",
            format_short_id(rework_id),
            resolution.passed,
            resolution.rejected
        ),
        BatchEvent::BatchRejected { reason, .. } => reason.clone(),
    }
}

/// Unsigned quantity from a CLI value, as a validation error on the batch
fn signed(batch_id: &EntityId, field: &'static str, value: i64) -> Result<u32> {
    quantity_from_signed(field, value).map_err(|e| EngineError::validation(batch_id, e).into())
}

/// Stage named on the command line, or the active one
fn target_stage(batch: &Batch, reference: Option<&str>) -> Result<EntityId> {
    if let Some(reference) = reference {
        return batch
            .workflow
            .find_stage(reference)
            .map(|s| s.stage_id.clone())
            .ok_or_else(|| miette::miette!("Batch {} has no stage matching '{}'", batch.id, reference));
    }

    let snapshot = BatchSnapshot::from_batch(batch)?;
    match snapshot.current_stage {
        ActiveStage::AtStage(stage) => Ok(stage.stage_id),
        ActiveStage::NoActiveStage => Err(EngineError::validation(
            &batch.id,
            ValidationError::BatchNotInProgress {
                status: snapshot.status,
            },
        )
        .into()),
    }
}

/// Stage name for messages, falling back to the ID
fn stage_label(batch: &Batch, stage_id: &EntityId) -> String {
    batch
        .workflow
        .stage(stage_id)
        .map_or_else(|| stage_id.to_string(), |s| s.name.clone())
}

/// Rework item by full ID, unique ID prefix, or 1-based position
fn find_rework(snapshot: &BatchSnapshot, reference: &str) -> Option<EntityId> {
    let items = &snapshot.rework_items;
    if let Ok(n) = reference.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| items.get(i)).map(|r| r.id.clone());
    }
    let wanted = reference.to_uppercase();
    if let Some(item) = items.iter().find(|r| r.id.to_string() == wanted) {
        return Some(item.id.clone());
    }
    let mut matches = items.iter().filter(|r| r.id.to_string().starts_with(&wanted));
    match (matches.next(), matches.next()) {
        (Some(item), None) => Some(item.id.clone()),
        _ => None,
    }
}

/// Parse `PARAM=OBSERVED:pass|fail`
fn parse_sample(spec: &str) -> Result<SampleData> {
    let (parameter, rest) = spec
        .split_once('=')
        .ok_or_else(|| miette::miette!("Sample '{}' must look like PARAM=OBSERVED:pass|fail", spec))?;
    let (observed, result) = rest
        .rsplit_once(':')
        .ok_or_else(|| miette::miette!("Sample '{}' must look like PARAM=OBSERVED:pass|fail", spec))?;
    let result: SampleResult = result.trim().parse().map_err(|e: String| miette::miette!("{}", e))?;
    Ok(SampleData {
        parameter: parameter.trim().to_string(),
        specification: None,
        observed: observed.trim().to_string(),
        result,
    })
}

/// Report the state after a mutation in the requested format
fn print_outcome(ctx: &CommandContext, global: &GlobalOpts, snapshot: &BatchSnapshot, action: &str) -> Result<()> {
    let format = ctx.format(global, OutputFormat::Auto);
    if print_structured(snapshot, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        println!("{}", snapshot.id);
        return Ok(());
    }
    if global.quiet {
        return Ok(());
    }

    println!(
        "{} {} {} {}",
        style("✓").green(),
        action,
        style(ctx.display_id(&snapshot.id)).cyan(),
        style(&snapshot.title).yellow()
    );
    let stage = match &snapshot.current_stage {
        ActiveStage::AtStage(s) => format!("{} ({} units)", s.name, s.quantity),
        ActiveStage::NoActiveStage => "none".to_string(),
    };
    println!("   Status: {} | Active stage: {}", styled_status(snapshot.status), stage);
    println!(
        "   Produced: {} | Rejected: {} | In rework: {} | Planned: {}",
        snapshot.quantity_produced, snapshot.quantity_rejected, snapshot.quantity_in_rework, snapshot.quantity_planned
    );
    for item in snapshot.pending_rework() {
        println!(
            "   Pending rework {} ({} units from {})",
            style(&item.id.to_string()).yellow(),
            item.quantity,
            item.stage_name
        );
    }
    Ok(())
}
