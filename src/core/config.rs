//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;

use crate::core::Project;

/// TBT configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default author / operator for new entities and checks
    pub author: Option<String>,

    /// Default output format
    pub default_format: Option<String>,

    /// Log filter used when RUST_LOG is not set
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // Global user config (~/.config/tbt/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // Project config (.tbt/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read_file(&project.tbt_dir().join("config.yaml")) {
                config.merge(project_config);
            }
        }

        // Environment variables
        if let Ok(author) = std::env::var("TBT_AUTHOR") {
            config.author = Some(author);
        }
        if let Ok(level) = std::env::var("TBT_LOG") {
            config.log_level = Some(level);
        }

        config
    }

    fn read_file(path: &std::path::Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tbt")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.author.is_some() {
            self.author = other.author;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
    }

    /// Get the author name, falling back to git config or username
    pub fn author(&self) -> String {
        if let Some(ref author) = self.author {
            return author.clone();
        }

        if let Ok(output) = std::process::Command::new("git")
            .args(["config", "user.name"])
            .output()
        {
            if output.status.success() {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !name.is_empty() {
                    return name;
                }
            }
        }

        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Log filter to use when RUST_LOG is unset
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("warn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Config {
            author: Some("a".to_string()),
            default_format: Some("tsv".to_string()),
            log_level: None,
        };
        base.merge(Config {
            author: Some("b".to_string()),
            default_format: None,
            log_level: Some("debug".to_string()),
        });
        assert_eq!(base.author.as_deref(), Some("b"));
        assert_eq!(base.default_format.as_deref(), Some("tsv"));
        assert_eq!(base.log_level(), "debug");
    }

    #[test]
    fn test_project_config_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        std::fs::write(
            project.tbt_dir().join("config.yaml"),
            "author: Line Lead\nlog_level: info\n",
        )
        .unwrap();

        let config = Config::read_file(&project.tbt_dir().join("config.yaml")).unwrap();
        assert_eq!(config.author.as_deref(), Some("Line Lead"));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_default_log_level() {
        assert_eq!(Config::default().log_level(), "warn");
    }
}
