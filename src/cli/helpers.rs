//! Shared helper functions for CLI commands
//!
//! This module contains utility functions that are used across multiple
//! command modules to avoid code duplication.

use chrono::{DateTime, Local, Utc};
use console::{style, StyledObject};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::loader::{file_id, find_entity_file};
use crate::core::project::Project;
use crate::core::shortid::ShortIdIndex;
use crate::core::store::FileBatchStore;
use crate::core::Config;
use crate::engine::BatchService;
use crate::entities::batch::BatchStatus;

/// Everything a project-scoped command needs
pub struct CommandContext {
    pub project: Project,
    pub config: Config,
    pub short_ids: ShortIdIndex,
}

impl CommandContext {
    /// Locate the project (honouring `--project`) and load config and short IDs
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = Project::locate(global.project.as_deref()).map_err(|e| miette::miette!("{}", e))?;
        let config = Config::load(Some(&project));
        let short_ids = ShortIdIndex::load(&project);
        Ok(Self {
            project,
            config,
            short_ids,
        })
    }

    /// Batch service backed by the project's batch directory
    pub fn batch_service(&self) -> Result<BatchService<FileBatchStore>> {
        let store = FileBatchStore::for_project(&self.project)?;
        Ok(BatchService::new(store))
    }

    /// Resolve a short ID, full ID or unambiguous ID prefix to an entity ID
    pub fn resolve_id<T: Entity>(&self, reference: &str) -> Result<EntityId> {
        let resolved = self
            .short_ids
            .resolve(reference)
            .ok_or_else(|| miette::miette!("Unknown short ID '{}'", reference))?;
        let path = find_entity_file::<T>(&self.project, &resolved)?
            .ok_or_else(|| miette::miette!("No {} found matching '{}'", T::PREFIX, reference))?;
        EntityId::parse_as(&file_id(&path), T::PREFIX).into_diagnostic()
    }

    /// Short ID if one is assigned, otherwise the truncated full ID
    pub fn display_id(&self, id: &EntityId) -> String {
        self.short_ids
            .get_short_id(&id.to_string())
            .unwrap_or_else(|| format_short_id(id))
    }

    /// Assign short IDs and persist the index; failures only cost the aliases
    pub fn remember(&mut self, ids: impl IntoIterator<Item = String>) {
        self.short_ids.ensure_all(ids);
        if let Err(e) = self.short_ids.save(&self.project) {
            tracing::warn!(error = %e, "could not save short ID index");
        }
    }

    /// Operator name for new records
    pub fn operator(&self, explicit: Option<String>) -> String {
        explicit.unwrap_or_else(|| self.config.author())
    }

    /// `--format` resolved against the configured default
    pub fn format(&self, global: &GlobalOpts, fallback: OutputFormat) -> OutputFormat {
        global.resolved_format(self.config.default_format.as_deref(), fallback)
    }
}

/// Format an EntityId for display, truncating if too long
///
/// IDs longer than 16 characters are truncated to 13 chars with "..." suffix.
pub fn format_short_id(id: &EntityId) -> String {
    let s = id.to_string();
    if s.len() > 16 {
        format!("{}...", &s[..13])
    } else {
        s
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Local-time rendering used in tables and history
pub fn format_date_local(date: &DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Status coloured the way list and show output use it
pub fn styled_status(status: BatchStatus) -> StyledObject<String> {
    let text = status.to_string();
    match status {
        BatchStatus::InProgress => style(text).green(),
        BatchStatus::OnHold => style(text).yellow(),
        BatchStatus::Completed => style(text).cyan(),
        BatchStatus::Rejected => style(text).red(),
    }
}

/// Print a value as JSON or YAML; returns false for other formats
pub fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(value).into_diagnostic()?);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Write CSV rows with a header to stdout
pub fn print_csv<I, R>(header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(header).into_diagnostic()?;
    for row in rows {
        writer
            .write_record(row.into_iter().collect::<Vec<_>>())
            .into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;
    Ok(())
}

/// Ask for confirmation unless `--yes` was given
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .into_diagnostic()
}

/// Prefix hint shown in list footers, e.g. `BAT@N`
pub fn short_id_hint(prefix: EntityPrefix) -> String {
    format!("{}@N", prefix)
}
