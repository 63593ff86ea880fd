//! Configuration loader and validator for the resale catalog.
use crate::analytics::{AnalyticsSettings, DateMode, LeaderboardKey, TimeRange};
use crate::query::{ANALYTICS_PAGE_SIZE, CATALOG_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub analytics: AnalyticsSection,
    #[serde(default)]
    pub export: ExportSection,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Account every query is scoped to.
    pub user_id: String,
    pub max_backoff_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogSection {
    pub page_size: usize,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            page_size: CATALOG_PAGE_SIZE,
        }
    }
}

/// Dashboard defaults; the user can still override them per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyticsSection {
    pub page_size: usize,
    pub time_range: TimeRange,
    pub date_mode: DateMode,
    pub leaderboard_key: LeaderboardKey,
}

impl Default for AnalyticsSection {
    fn default() -> Self {
        Self {
            page_size: ANALYTICS_PAGE_SIZE,
            time_range: TimeRange::default(),
            date_mode: DateMode::default(),
            leaderboard_key: LeaderboardKey::default(),
        }
    }
}

impl AnalyticsSection {
    pub fn settings(&self) -> AnalyticsSettings {
        AnalyticsSettings {
            date_mode: self.date_mode,
            time_range: self.time_range,
            leaderboard_key: self.leaderboard_key,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSection {
    pub dir: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self { dir: ".".into() }
    }
}

impl Config {
    /// Ensure required directories exist (`app.data_dir` and `export.dir`).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        for dir in [&self.app.data_dir, &self.export.dir] {
            if !dir.trim().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// `DATABASE_URL` wins over the file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/catalog.db", self.app.data_dir))
    }

    pub fn export_dir(&self) -> PathBuf {
        PathBuf::from(&self.export.dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.user_id.trim().is_empty() {
        return Err(ConfigError::Invalid("app.user_id must be non-empty"));
    }
    if cfg.catalog.page_size == 0 {
        return Err(ConfigError::Invalid("catalog.page_size must be > 0"));
    }
    if cfg.analytics.page_size == 0 {
        return Err(ConfigError::Invalid("analytics.page_size must be > 0"));
    }
    if cfg.export.dir.trim().is_empty() {
        return Err(ConfigError::Invalid("export.dir must be non-empty"));
    }
    Ok(())
}

/// Example configuration, also shipped as `config.example.yaml`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  user_id: "local-user"
  max_backoff_seconds: 300

catalog:
  page_size: 10

analytics:
  page_size: 20
  time_range: "30d"
  date_mode: "sold"
  leaderboard_key: "profit"

export:
  dir: "./exports"
"#
}
