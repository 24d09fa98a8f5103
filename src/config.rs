// File: src/config.rs
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_LOG_LEVEL: &str = "info";
const DATA_FILE_NAME: &str = "items.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity the session runs as. Generated on first run.
    pub owner_id: String,
    /// Overrides where the offline collection lives.
    pub data_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_id: String::new(),
            data_file: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("org", "livelist", "livelist").context("No home directory found")
}

impl Config {
    pub fn path() -> anyhow::Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).with_context(|| format!("Invalid config at {}", path.display()))
    }

    /// Loads the config, assigning and saving an owner id if it has none.
    /// A config that exists but cannot be read is an error and is left alone.
    pub fn load_or_init() -> anyhow::Result<Self> {
        Self::load_or_init_from(&Self::path()?)
    }

    pub fn load_or_init_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load_from(path)?;
        if config.ensure_owner() {
            config
                .save_to(path)
                .with_context(|| format!("Saving owner id to {}", path.display()))?;
        }
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Assigns a fresh owner id when none is set. Returns whether it did.
    pub fn ensure_owner(&mut self) -> bool {
        if self.owner_id.trim().is_empty() {
            self.owner_id = Uuid::new_v4().to_string();
            true
        } else {
            false
        }
    }

    pub fn data_path(&self) -> anyhow::Result<PathBuf> {
        match &self.data_file {
            Some(p) => Ok(p.clone()),
            None => Ok(project_dirs()?.data_dir().join(DATA_FILE_NAME)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "owner_id = \"alice\"\n").unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.owner_id, "alice");
        assert_eq!(cfg.data_file, None);
        assert_eq!(cfg.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn ensure_owner_only_fills_blanks() {
        let mut cfg = Config::default();
        assert!(cfg.ensure_owner());
        let first = cfg.owner_id.clone();
        assert!(!cfg.ensure_owner());
        assert_eq!(cfg.owner_id, first);
    }

    #[test]
    fn data_file_override_wins() {
        let cfg = Config {
            data_file: Some(PathBuf::from("/tmp/x.json")),
            ..Config::default()
        };
        assert_eq!(cfg.data_path().unwrap(), PathBuf::from("/tmp/x.json"));
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "owner_id = [").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn init_generates_and_persists_owner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/config.toml");
        let first = Config::load_or_init_from(&path).unwrap();
        assert!(!first.owner_id.is_empty());
        let second = Config::load_or_init_from(&path).unwrap();
        assert_eq!(second.owner_id, first.owner_id);
    }

    #[test]
    fn init_refuses_unreadable_config_and_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let raw = "owner_id = \"alice\"\nlog_level = [\n";
        fs::write(&path, raw).unwrap();
        assert!(Config::load_or_init_from(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), raw);
    }
}
