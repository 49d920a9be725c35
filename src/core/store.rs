//! Batch persistence with optimistic concurrency
//!
//! Every save names the revision the caller loaded. The store refuses the
//! write when the stored document has moved on, so two writers can never both
//! commit against the same starting state.

use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::project::{Project, ProjectError};
use crate::entities::batch::Batch;
use crate::yaml::{parse_document, YamlSyntaxError};

/// Errors raised by a [`BatchStore`]
#[derive(Debug, Error, miette::Diagnostic)]
pub enum StoreError {
    #[error("batch {0} not found")]
    #[diagnostic(code(tbt::store::not_found))]
    NotFound(String),

    #[error("batch {0} already exists")]
    #[diagnostic(code(tbt::store::exists))]
    AlreadyExists(String),

    #[error("batch {id} changed since it was loaded (expected revision {expected}, found {found})")]
    #[diagnostic(code(tbt::store::conflict))]
    RevisionMismatch { id: String, expected: u32, found: u32 },

    #[error("batch {0} is being modified by another writer")]
    #[diagnostic(code(tbt::store::locked))]
    Locked(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Yaml(#[from] YamlSyntaxError),

    #[error("could not serialize batch: {0}")]
    Serialize(String),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage seam for batches
///
/// Implementations must make `save` a compare-and-swap on `entity_revision`:
/// succeed only when the stored revision equals `expected_revision`.
pub trait BatchStore {
    /// Fetch a batch by ID
    fn load(&self, id: &EntityId) -> Result<Batch, StoreError>;

    /// Store a brand-new batch
    fn insert(&self, batch: &Batch) -> Result<(), StoreError>;

    /// Replace a batch if its stored revision still equals `expected_revision`
    fn save(&self, batch: &Batch, expected_revision: u32) -> Result<(), StoreError>;

    /// All stored batches
    fn list(&self) -> Result<Vec<Batch>, StoreError>;
}

/// In-process store, for embedding the engine and for tests
#[derive(Debug, Default)]
pub struct MemoryBatchStore {
    batches: Mutex<HashMap<EntityId, Batch>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchStore for MemoryBatchStore {
    fn load(&self, id: &EntityId) -> Result<Batch, StoreError> {
        self.batches
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn insert(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut batches = self.batches.lock();
        if batches.contains_key(&batch.id) {
            return Err(StoreError::AlreadyExists(batch.id.to_string()));
        }
        batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    fn save(&self, batch: &Batch, expected_revision: u32) -> Result<(), StoreError> {
        let mut batches = self.batches.lock();
        let current = batches
            .get(&batch.id)
            .ok_or_else(|| StoreError::NotFound(batch.id.to_string()))?;
        if current.entity_revision != expected_revision {
            return Err(StoreError::RevisionMismatch {
                id: batch.id.to_string(),
                expected: expected_revision,
                found: current.entity_revision,
            });
        }
        batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Batch>, StoreError> {
        let mut all: Vec<Batch> = self.batches.lock().values().cloned().collect();
        all.sort_by_key(|b| b.created);
        Ok(all)
    }
}

/// YAML file store under `<project>/batches/`
///
/// An OS advisory lock on `<ID>.tbt.lock` is held while a save compares and
/// writes, and the new document is written to a temp file then renamed over
/// the old one. The lock dies with its process, so a crashed writer never
/// leaves a batch locked.
#[derive(Debug, Clone)]
pub struct FileBatchStore {
    dir: PathBuf,
}

impl FileBatchStore {
    /// Store rooted at a project's batch directory
    pub fn for_project(project: &Project) -> Result<Self, StoreError> {
        Ok(Self::at(project.dir_for(EntityPrefix::Bat)?))
    }

    /// Store rooted at an explicit directory
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &EntityId) -> PathBuf {
        self.dir.join(format!("{}.tbt.yaml", id))
    }

    fn read(&self, path: &Path, id: &EntityId) -> Result<Batch, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_document(&content, &path.display().to_string())?)
    }

    fn write_atomic(&self, path: &Path, batch: &Batch) -> Result<(), StoreError> {
        let yaml = serde_yml::to_string(batch).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Exclusive advisory lock, released when the handle is closed
///
/// The lock file itself is left in place; only the OS lock on it matters.
struct LockGuard {
    _file: File,
}

impl LockGuard {
    fn acquire(path: PathBuf, id: &EntityId) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(e) if is_contended(&e) => Err(StoreError::Locked(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl BatchStore for FileBatchStore {
    fn load(&self, id: &EntityId) -> Result<Batch, StoreError> {
        self.read(&self.path_for(id), id)
    }

    fn insert(&self, batch: &Batch) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&batch.id);
        let _lock = LockGuard::acquire(path.with_extension("lock"), &batch.id)?;
        if path.exists() {
            return Err(StoreError::AlreadyExists(batch.id.to_string()));
        }
        self.write_atomic(&path, batch)?;
        tracing::debug!(batch = %batch.id, path = %path.display(), "batch created");
        Ok(())
    }

    fn save(&self, batch: &Batch, expected_revision: u32) -> Result<(), StoreError> {
        let path = self.path_for(&batch.id);
        let _lock = LockGuard::acquire(path.with_extension("lock"), &batch.id)?;

        let current = self.read(&path, &batch.id)?;
        if current.entity_revision != expected_revision {
            tracing::warn!(
                batch = %batch.id,
                expected = expected_revision,
                found = current.entity_revision,
                "rejecting stale write"
            );
            return Err(StoreError::RevisionMismatch {
                id: batch.id.to_string(),
                expected: expected_revision,
                found: current.entity_revision,
            });
        }

        self.write_atomic(&path, batch)?;
        tracing::debug!(batch = %batch.id, revision = batch.entity_revision, "batch saved");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Batch>, StoreError> {
        let mut all = Vec::new();
        if !self.dir.exists() {
            return Ok(all);
        }
        for entry in walkdir::WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".tbt.yaml") || EntityPrefix::from_filename(&name) != Some(EntityPrefix::Bat) {
                continue;
            }
            let content = fs::read_to_string(entry.path())?;
            match parse_document::<Batch>(&content, &entry.path().display().to_string()) {
                Ok(batch) => all.push(batch),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e.message(), "skipping unreadable batch")
                }
            }
        }
        all.sort_by_key(|b| b.created);
        Ok(all)
    }
}
