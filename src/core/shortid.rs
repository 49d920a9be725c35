//! Short ID system for easier entity selection
//!
//! Listing entities assigns per-type aliases like `BAT@1` and `FLOW@2` that
//! map to full entity IDs. The index is stored in `.tbt/shortids.json` and
//! only grows: an entity keeps its alias once it has one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;

use crate::core::identity::EntityPrefix;
use crate::core::project::Project;

/// Index file location within a project
const INDEX_FILE: &str = ".tbt/shortids.json";

/// Mapping of short IDs (`PREFIX@N`) to full entity IDs
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ShortIdIndex {
    /// `PREFIX@N` to full entity ID
    entries: BTreeMap<String, String>,

    /// Next number to hand out, per prefix
    #[serde(default)]
    next: HashMap<String, u32>,

    #[serde(skip)]
    reverse: HashMap<String, String>,
}

impl ShortIdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index from a project, or start empty if missing or unreadable
    pub fn load(project: &Project) -> Self {
        let path = project.root().join(INDEX_FILE);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::new();
        };
        match serde_json::from_str::<ShortIdIndex>(&content) {
            Ok(mut index) => {
                index.reverse = index
                    .entries
                    .iter()
                    .map(|(short, full)| (full.clone(), short.clone()))
                    .collect();
                index
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt short ID index");
                Self::new()
            }
        }
    }

    pub fn save(&self, project: &Project) -> std::io::Result<()> {
        let path = project.root().join(INDEX_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
    }

    /// Assign aliases to any IDs that do not have one yet
    pub fn ensure_all(&mut self, entity_ids: impl IntoIterator<Item = String>) {
        for id in entity_ids {
            self.add(id);
        }
    }

    /// Add an entity ID and return its short ID
    pub fn add(&mut self, entity_id: String) -> String {
        if let Some(short) = self.reverse.get(&entity_id) {
            return short.clone();
        }

        let prefix = entity_id
            .split_once('-')
            .map(|(p, _)| p.to_string())
            .unwrap_or_default();
        let counter = self.next.entry(prefix.clone()).or_insert(1);
        let short = format!("{}@{}", prefix, counter);
        *counter += 1;

        self.entries.insert(short.clone(), entity_id.clone());
        self.reverse.insert(entity_id, short.clone());
        short
    }

    /// Resolve a reference to a full entity ID
    ///
    /// Accepts `PREFIX@N` (case-insensitive) and bare `@N` when only one type
    /// uses that number. Anything else is passed through unchanged for
    /// full or partial ID matching.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        let Some((prefix, number)) = reference.split_once('@') else {
            return Some(reference.to_string());
        };
        let number: u32 = number.parse().ok()?;

        if !prefix.is_empty() {
            let prefix: EntityPrefix = prefix.parse().ok()?;
            return self.entries.get(&format!("{}@{}", prefix, number)).cloned();
        }

        let suffix = format!("@{}", number);
        let mut matches = self.entries.iter().filter(|(short, _)| short.ends_with(&suffix));
        match (matches.next(), matches.next()) {
            (Some((_, full)), None) => Some(full.clone()),
            _ => None,
        }
    }

    /// Short ID for a full entity ID
    pub fn get_short_id(&self, entity_id: &str) -> Option<String> {
        self.reverse.get(entity_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
