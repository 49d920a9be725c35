//! Entity loading utilities
//!
//! Generic helpers for reading `.tbt.yaml` documents of one entity type from a
//! project directory.

use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::entity::Entity;
use crate::core::project::Project;
use crate::yaml::parse_document;

/// Load all entities of type T from the project
///
/// Files that fail to parse are skipped with a warning so one bad file does
/// not hide the rest of a listing.
pub fn load_all<T: Entity>(project: &Project) -> Result<Vec<T>> {
    let mut entities = Vec::new();

    for path in project.iter_entity_files(T::PREFIX) {
        let content = fs::read_to_string(&path).into_diagnostic()?;
        match parse_document::<T>(&content, &path.display().to_string()) {
            Ok(entity) => entities.push(entity),
            Err(e) => tracing::warn!(path = %path.display(), error = %e.message(), "skipping unreadable file"),
        }
    }

    Ok(entities)
}

/// Find an entity file by full or partial ID
///
/// An exact file stem match wins; otherwise the prefix must be unambiguous.
pub fn find_entity_file<T: Entity>(project: &Project, id: &str) -> Result<Option<PathBuf>> {
    let wanted = id.to_uppercase();
    let mut candidates = Vec::new();

    for path in project.iter_entity_files(T::PREFIX) {
        let stem = file_id(&path);
        if stem == wanted {
            return Ok(Some(path));
        }
        if stem.starts_with(&wanted) {
            candidates.push(path);
        }
    }

    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        n => Err(miette::miette!(
            "'{}' matches {} {} files; use more characters of the ID",
            id,
            n,
            T::PREFIX
        )),
    }
}

/// Load a single entity by full or partial ID
pub fn load_entity<T: Entity>(project: &Project, id: &str) -> Result<Option<(PathBuf, T)>> {
    let Some(path) = find_entity_file::<T>(project, id)? else {
        return Ok(None);
    };
    let content = fs::read_to_string(&path).into_diagnostic()?;
    let entity = parse_document::<T>(&content, &path.display().to_string())?;
    Ok(Some((path, entity)))
}

/// Write a new entity document into its directory
pub fn write_new<T: Entity>(project: &Project, entity: &T) -> Result<PathBuf> {
    let path = project
        .entity_path(entity.id())
        .map_err(|e| miette::miette!("{}", e))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    let yaml = serde_yml::to_string(entity).into_diagnostic()?;
    fs::write(&path, yaml).into_diagnostic()?;
    Ok(path)
}

/// ID portion of a `<ID>.tbt.yaml` file name
pub fn file_id(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".tbt.yaml").to_uppercase())
        .unwrap_or_default()
}
