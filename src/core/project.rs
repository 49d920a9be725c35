//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::{EntityId, EntityPrefix};

/// Directory holding workflow definitions
pub const WORKFLOW_DIR: &str = "workflows";

/// Directory holding batch documents
pub const BATCH_DIR: &str = "batches";

/// Represents a TBT project
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the project (parent of .tbt/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(".tbt").is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Use an explicit project root, or discover one from the current directory
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ProjectError> {
        match explicit {
            Some(path) => Self::discover_from(path),
            None => Self::discover(),
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if root.join(".tbt").exists() {
            return Err(ProjectError::AlreadyExists(root));
        }

        Self::write_structure(root)
    }

    /// Force initialization even if .tbt/ exists
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::write_structure(root)
    }

    fn write_structure(root: PathBuf) -> Result<Self, ProjectError> {
        let tbt_dir = root.join(".tbt");
        std::fs::create_dir_all(&tbt_dir).map_err(|e| ProjectError::IoError(e.to_string()))?;

        std::fs::write(tbt_dir.join("config.yaml"), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        for dir in [WORKFLOW_DIR, BATCH_DIR] {
            std::fs::create_dir_all(root.join(dir))
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# TBT Project Configuration

# Default author / operator recorded on checks and new entities
# author: ""

# Default output format (auto, yaml, json, tsv, csv, id)
# default_format: auto

# Default log filter when RUST_LOG is not set (e.g. warn, info, tbt=debug)
# log_level: warn
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .tbt configuration directory
    pub fn tbt_dir(&self) -> PathBuf {
        self.root.join(".tbt")
    }

    /// Get the directory for a given entity prefix
    pub fn entity_directory(prefix: EntityPrefix) -> Option<&'static str> {
        match prefix {
            EntityPrefix::Bat => Some(BATCH_DIR),
            EntityPrefix::Flow => Some(WORKFLOW_DIR),
            EntityPrefix::Stg | EntityPrefix::Qc | EntityPrefix::Rwk => None,
        }
    }

    /// Get the absolute directory for a stored entity type
    pub fn dir_for(&self, prefix: EntityPrefix) -> Result<PathBuf, ProjectError> {
        Self::entity_directory(prefix)
            .map(|d| self.root.join(d))
            .ok_or(ProjectError::NotStored(prefix))
    }

    /// Get the path for an entity file
    pub fn entity_path(&self, id: &EntityId) -> Result<PathBuf, ProjectError> {
        Ok(self.dir_for(id.prefix())?.join(format!("{}.tbt.yaml", id)))
    }

    /// Iterate all entity files of a given prefix type
    pub fn iter_entity_files(&self, prefix: EntityPrefix) -> impl Iterator<Item = PathBuf> {
        let dir = Self::entity_directory(prefix).map(|d| self.root.join(d));
        dir.into_iter().flat_map(move |dir| {
            walkdir::WalkDir::new(dir)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(move |e| {
                    let name = e.file_name().to_string_lossy();
                    name.ends_with(".tbt.yaml") && EntityPrefix::from_filename(&name) == Some(prefix)
                })
                .map(|e| e.path().to_path_buf())
        })
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a TBT project (searched from {searched_from:?}). Run 'tbt init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("TBT project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("{0} entities are not stored as separate files")]
    NotStored(EntityPrefix),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.tbt_dir().join("config.yaml").exists());
        assert!(project.root().join("workflows").is_dir());
        assert!(project.root().join("batches").is_dir());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
        assert!(Project::init_force(tmp.path()).is_ok());
    }

    #[test]
    fn test_project_discover_finds_tbt_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("some/nested/dir");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_tbt_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn test_iter_entity_files_filters_by_prefix() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let id = EntityId::new(EntityPrefix::Bat);
        let path = project.entity_path(&id).unwrap();
        std::fs::write(&path, "id: x").unwrap();
        std::fs::write(project.root().join("batches/notes.txt"), "x").unwrap();

        let files: Vec<_> = project.iter_entity_files(EntityPrefix::Bat).collect();
        assert_eq!(files, vec![path]);
        assert!(project.entity_path(&EntityId::new(EntityPrefix::Rwk)).is_err());
    }
}
