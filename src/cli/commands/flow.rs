//! `tbt flow` command - Workflow definition management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;

use crate::cli::helpers::{format_date_local, format_short_id, print_csv, print_structured, short_id_hint, truncate_str, CommandContext};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityPrefix;
use crate::core::loader::{load_all, load_entity, write_new};
use crate::entities::workflow::{VerificationParameter, WorkflowDefinition};

#[derive(Subcommand, Debug)]
pub enum FlowCommands {
    /// Define a new workflow
    New(NewArgs),

    /// List workflows
    List(ListArgs),

    /// Show a workflow's stages
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Workflow title
    #[arg(long, short = 't')]
    pub title: String,

    /// Stage in order; append `:qc` to require a quality check (e.g. `Machining:qc`)
    #[arg(long = "stage", short = 's', required = true)]
    pub stages: Vec<String>,

    /// Verification parameter as STAGE=NAME[:SPEC] (e.g. `Machining=Bore diameter:10.00 +/- 0.05 mm`)
    #[arg(long = "param", short = 'p')]
    pub params: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Search in title
    #[arg(long)]
    pub search: Option<String>,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Workflow ID or short ID (FLOW@N)
    pub id: String,
}

pub fn run(cmd: FlowCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        FlowCommands::New(args) => run_new(args, global),
        FlowCommands::List(args) => run_list(args, global),
        FlowCommands::Show(args) => run_show(args, global),
    }
}

/// Split `Name:qc` into the stage name and its check flag
fn parse_stage_spec(spec: &str) -> Result<(String, bool)> {
    let (name, qc) = match spec.rsplit_once(':') {
        Some((name, flag)) if flag.trim().eq_ignore_ascii_case("qc") => (name, true),
        _ => (spec, false),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(miette::miette!("Stage '{}' has no name", spec));
    }
    Ok((name.to_string(), qc))
}

/// Split `STAGE=NAME[:SPEC]`
fn parse_param_spec(spec: &str) -> Result<(String, VerificationParameter)> {
    let (stage, rest) = spec
        .split_once('=')
        .ok_or_else(|| miette::miette!("Parameter '{}' must look like STAGE=NAME[:SPEC]", spec))?;
    let (name, specification) = match rest.split_once(':') {
        Some((name, s)) => (name, Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        None => (rest, None),
    };
    if stage.trim().is_empty() || name.trim().is_empty() {
        return Err(miette::miette!("Parameter '{}' must look like STAGE=NAME[:SPEC]", spec));
    }
    Ok((
        stage.trim().to_string(),
        VerificationParameter {
            name: name.trim().to_string(),
            specification,
        },
    ))
}

fn build_workflow(args: &NewArgs, author: String) -> Result<WorkflowDefinition> {
    let mut flow = WorkflowDefinition::new(args.title.clone(), author);
    for spec in &args.stages {
        let (name, qc) = parse_stage_spec(spec)?;
        flow.push_stage(name, qc);
    }

    for spec in &args.params {
        let (stage_name, param) = parse_param_spec(spec)?;
        let stage = flow
            .stages
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(&stage_name))
            .ok_or_else(|| miette::miette!("Parameter '{}' names unknown stage '{}'", spec, stage_name))?;
        stage.parameters.push(param);
    }

    flow.validate()
        .map_err(|e| miette::miette!("Invalid workflow: {}", e))?;
    Ok(flow)
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = CommandContext::open(global)?;
    let flow = build_workflow(&args, ctx.config.author())?;
    let path = write_new(&ctx.project, &flow)?;
    tracing::info!(workflow = %flow.id, stages = flow.stages.len(), "workflow created");

    ctx.remember([flow.id.to_string()]);
    let display_id = ctx.display_id(&flow.id);

    match ctx.format(global, OutputFormat::Auto) {
        OutputFormat::Id => println!("{}", flow.id),
        f @ (OutputFormat::Json | OutputFormat::Yaml) => {
            print_structured(&flow, f)?;
        }
        _ => {
            if !global.quiet {
                println!(
                    "{} Created workflow {} {} ({} stages)",
                    style("✓").green(),
                    style(&display_id).cyan(),
                    style(&flow.title).yellow(),
                    flow.stages.len()
                );
                println!("   {}", style(path.display()).dim());
            }
        }
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = CommandContext::open(global)?;
    let mut flows: Vec<WorkflowDefinition> = load_all(&ctx.project)?;

    if let Some(ref search) = args.search {
        let needle = search.to_lowercase();
        flows.retain(|f| f.title.to_lowercase().contains(&needle));
    }
    flows.sort_by_key(|f| f.created);

    if args.count {
        println!("{}", flows.len());
        return Ok(());
    }
    if flows.is_empty() {
        println!("No workflows found.");
        return Ok(());
    }

    ctx.remember(flows.iter().map(|f| f.id.to_string()));

    let format = ctx.format(global, OutputFormat::Tsv);
    if print_structured(&flows, format)? {
        return Ok(());
    }
    match format {
        OutputFormat::Id => {
            for flow in &flows {
                println!("{}", flow.id);
            }
        }
        OutputFormat::Csv => {
            print_csv(
                &["short_id", "id", "title", "stages", "author", "created"],
                flows.iter().map(|f| {
                    vec![
                        ctx.short_ids.get_short_id(&f.id.to_string()).unwrap_or_default(),
                        f.id.to_string(),
                        f.title.clone(),
                        f.stages.len().to_string(),
                        f.author.clone(),
                        f.created.to_rfc3339(),
                    ]
                }),
            )?;
        }
        _ => {
            println!(
                "{:<8} {:<17} {:<30} {:<7} {}",
                style("SHORT").bold().dim(),
                style("ID").bold(),
                style("TITLE").bold(),
                style("STAGES").bold(),
                style("CREATED").bold()
            );
            println!("{}", "-".repeat(80));
            for flow in &flows {
                println!(
                    "{:<8} {:<17} {:<30} {:<7} {}",
                    style(ctx.short_ids.get_short_id(&flow.id.to_string()).unwrap_or_default()).cyan(),
                    format_short_id(&flow.id),
                    truncate_str(&flow.title, 28),
                    flow.stages.len(),
                    format_date_local(&flow.created)
                );
            }
            println!();
            println!(
                "{} workflow(s) found. Use {} to reference by short ID.",
                style(flows.len()).cyan(),
                style(short_id_hint(EntityPrefix::Flow)).cyan()
            );
        }
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = CommandContext::open(global)?;
    let resolved = ctx
        .short_ids
        .resolve(&args.id)
        .ok_or_else(|| miette::miette!("Unknown short ID '{}'", args.id))?;
    let (path, flow) = load_entity::<WorkflowDefinition>(&ctx.project, &resolved)?
        .ok_or_else(|| miette::miette!("No workflow found matching '{}'", args.id))?;

    match ctx.format(global, OutputFormat::Auto) {
        OutputFormat::Yaml => {
            print!("{}", fs::read_to_string(&path).into_diagnostic()?);
        }
        OutputFormat::Json => {
            print_structured(&flow, OutputFormat::Json)?;
        }
        OutputFormat::Id => println!("{}", flow.id),
        _ => {
            let snapshot = flow
                .snapshot()
                .map_err(|e| miette::miette!("Workflow {} is invalid: {}", flow.id, e))?;
            println!("{}", style("─".repeat(60)).dim());
            println!("{}: {}", style("ID").bold(), style(&flow.id.to_string()).cyan());
            println!("{}: {}", style("Title").bold(), style(&flow.title).yellow());
            println!("{}", style("─".repeat(60)).dim());
            println!();
            println!("{} ({}):", style("Stages").bold(), snapshot.stages.len());
            for stage in &snapshot.stages {
                let gate = if stage.quality_check_required {
                    style("quality check").yellow()
                } else {
                    style("pass-through").dim()
                };
                println!(
                    "  {}. {} [{}] {}",
                    stage.sequence_order,
                    stage.name,
                    gate,
                    style(format_short_id(&stage.stage_id)).dim()
                );
                for param in &stage.parameters {
                    println!(
                        "       {} {}",
                        param.name,
                        style(param.specification.as_deref().unwrap_or("")).dim()
                    );
                }
            }
            println!("{}", style("─".repeat(60)).dim());
            println!(
                "{}: {} | {}: {}",
                style("Author").dim(),
                flow.author,
                style("Created").dim(),
                format_date_local(&flow.created)
            );
        }
    }
    Ok(())
}
