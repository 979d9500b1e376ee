//! Engine configuration loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DEBOUNCE_MS: u64 = 350;
pub const DEFAULT_CURRENCY: &str = "usd";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Tunables handed to a session at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Delay between a single-choice answer and the automatic `next()`.
    pub auto_advance_debounce_ms: u64,
    pub auto_advance: bool,
    /// Plan preselected at load time when the catalog offers it.
    pub default_plan_id: Option<String>,
    pub currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_advance_debounce_ms: DEFAULT_DEBOUNCE_MS,
            auto_advance: true,
            default_plan_id: None,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.auto_advance_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = toml::from_str("defaultPlanId = \"monthly\"").unwrap();
        assert_eq!(config.default_plan_id.as_deref(), Some("monthly"));
        assert_eq!(config.auto_advance_debounce_ms, 350);
        assert!(config.auto_advance);
        assert_eq!(config.currency, "usd");
    }

    #[test]
    fn load_reports_path_on_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intake.toml");
        std::fs::write(&path, "autoAdvanceDebounceMs = \"soon\"").unwrap();
        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("intake.toml"));
    }

    #[test]
    fn load_reads_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intake.toml");
        std::fs::write(&path, "autoAdvanceDebounceMs = 20\nautoAdvance = false\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(20));
        assert!(!config.auto_advance);
    }
}
