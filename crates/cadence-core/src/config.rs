//! Cadence configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CadenceError, Result};
use crate::traits::SettingsSource;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_data_dir() -> String { "~/.cadence".into() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            features: FeaturesConfig::default(),
            general: GeneralConfig::default(),
            llm: LlmConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Settings {
    /// Load config from the default path (~/.cadence/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CadenceError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CadenceError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CadenceError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Cadence home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cadence")
    }

    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    /// Resolve the LLM API key: config > CADENCE_API_KEY > OPENAI_API_KEY > empty.
    pub fn api_key(&self) -> String {
        if !self.llm.api_key.is_empty() {
            return self.llm.api_key.clone();
        }
        ["CADENCE_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .unwrap_or_default()
    }
}

/// Feature switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "bool_true")]
    pub agents: bool,
}

fn bool_true() -> bool { true }

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { agents: true }
    }
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String { "en-US".into() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { locale: default_locale() }
    }
}

/// LLM endpoint used by workflow agents that carry no model selector of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String { "openai".into() }
fn default_endpoint() -> String { "https://api.openai.com/v1".into() }
fn default_model() -> String { "gpt-4o-mini".into() }
fn default_temperature() -> f32 { 0.7 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Window (seconds) within which a cron occurrence counts as due.
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,
    /// Remember the last fired occurrence per agent and never fire it twice.
    #[serde(default)]
    pub dedupe_occurrences: bool,
    /// Deadline for a single agent run. None waits indefinitely.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

fn default_tolerance_secs() -> u64 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: default_tolerance_secs(),
            dedupe_occurrences: false,
            run_timeout_secs: None,
        }
    }
}

/// Settings re-read from disk on every call, so edits apply on the next tick.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for FileSettings {
    fn load_settings(&self) -> Result<Settings> {
        if self.path.exists() {
            Settings::load_from(&self.path)
        } else {
            Ok(Settings::default())
        }
    }
}

/// Fixed in-memory settings.
impl SettingsSource for Settings {
    fn load_settings(&self) -> Result<Settings> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.features.agents);
        assert_eq!(s.scheduler.tolerance_secs, 30);
        assert!(!s.scheduler.dedupe_occurrences);
        assert!(s.scheduler.run_timeout_secs.is_none());
        assert_eq!(s.general.locale, "en-US");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let s: Settings = toml::from_str(
            r#"
            [features]
            agents = false

            [scheduler]
            run_timeout_secs = 120
            "#,
        )
        .unwrap();
        assert!(!s.features.agents);
        assert_eq!(s.scheduler.tolerance_secs, 30);
        assert_eq!(s.scheduler.run_timeout_secs, Some(120));
        assert_eq!(s.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_file_settings_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let source = FileSettings::new(&path);
        assert!(source.load_settings().unwrap().features.agents);

        let mut s = Settings::default();
        s.features.agents = false;
        s.save_to(&path).unwrap();
        assert!(!source.load_settings().unwrap().features.agents);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "features = [").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(CadenceError::Config(_))));
    }
}
