//! Outreach configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OutreachError, Result};

/// Upper bound for every hour-valued setting (ten years).
pub const MAX_HOURS: u32 = 87_600;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutreachConfig {
    #[serde(default)]
    pub leads: LeadSearchConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl OutreachConfig {
    /// Load config from the default path (~/.outreach/config.toml).
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
            .map_err(|e| OutreachError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| OutreachError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| OutreachError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.leads.page_size == 0 {
            return Err(OutreachError::Config("leads.page_size must be > 0".into()));
        }
        if self.leads.max_pages == 0 {
            return Err(OutreachError::Config("leads.max_pages must be > 0".into()));
        }
        if self.store.timeout_ms == 0 {
            return Err(OutreachError::Config("store.timeout_ms must be > 0".into()));
        }
        for (field, hours) in [
            ("leads.hours_threshold", self.leads.hours_threshold),
            ("scheduling.min_hours_between_runs", self.scheduling.min_hours_between_runs),
            ("scheduling.running_stale_hours", self.scheduling.running_stale_hours),
        ] {
            if hours > MAX_HOURS {
                return Err(OutreachError::Config(format!(
                    "{field} must be <= {MAX_HOURS} hours, got {hours}"
                )));
            }
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the outreach home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".outreach")
    }
}

/// Candidate search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSearchConfig {
    /// Minimum candidate age before it may be contacted.
    #[serde(default = "default_hours_threshold")]
    pub hours_threshold: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_min_leads_required")]
    pub min_leads_required: u32,
    /// Pipeline stage whose non-pending tasks block eligibility.
    #[serde(default = "default_protected_stage")]
    pub protected_stage: String,
}

fn default_hours_threshold() -> u32 { 48 }
fn default_page_size() -> u32 { 30 }
fn default_max_pages() -> u32 { 10 }
fn default_min_leads_required() -> u32 { 1 }
fn default_protected_stage() -> String { "awareness".into() }

impl Default for LeadSearchConfig {
    fn default() -> Self {
        Self {
            hours_threshold: default_hours_threshold(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            min_leads_required: default_min_leads_required(),
            protected_stage: default_protected_stage(),
        }
    }
}

/// Decision table parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Short delay before retrying a failed run, independent of run spacing.
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: u32,
    #[serde(default = "default_min_hours_between_runs")]
    pub min_hours_between_runs: u32,
    /// RUNNING records older than this are reported as likely stuck.
    #[serde(default = "default_running_stale_hours")]
    pub running_stale_hours: u32,
}

fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_minutes() -> u32 { 15 }
fn default_min_hours_between_runs() -> u32 { 3 }
fn default_running_stale_hours() -> u32 { 2 }

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_minutes: default_retry_delay_minutes(),
            min_hours_between_runs: default_min_hours_between_runs(),
            running_stale_hours: default_running_stale_hours(),
        }
    }
}

/// Store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Per-call timeout applied by every component.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> String { "~/.outreach/outreach.db".into() }
fn default_timeout_ms() -> u64 { 10_000 }

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Sweep driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Sites evaluated concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Schedule every site with a valid channel, ignoring the decision table.
    #[serde(default)]
    pub force_schedule_all: bool,
}

fn default_concurrency() -> usize { 8 }

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            force_schedule_all: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = OutreachConfig::parse("").unwrap();
        assert_eq!(config.leads.page_size, 30);
        assert_eq!(config.leads.protected_stage, "awareness");
        assert_eq!(config.scheduling.max_retries, 3);
        assert_eq!(config.store.timeout(), Duration::from_secs(10));
        assert_eq!(config.sweep.concurrency, 8);
    }

    #[test]
    fn test_partial_override() {
        let config = OutreachConfig::parse(
            r#"
[leads]
page_size = 50
min_leads_required = 5

[scheduling]
retry_delay_minutes = 30
"#,
        )
        .unwrap();
        assert_eq!(config.leads.page_size, 50);
        assert_eq!(config.leads.min_leads_required, 5);
        assert_eq!(config.leads.max_pages, 10);
        assert_eq!(config.scheduling.retry_delay_minutes, 30);
        assert_eq!(config.scheduling.min_hours_between_runs, 3);
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let err = OutreachConfig::parse("[leads]\npage_size = 0\n").unwrap_err();
        assert!(matches!(err, OutreachError::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_hours() {
        let err = OutreachConfig::parse("[leads]\nhours_threshold = 4000000000\n").unwrap_err();
        assert!(matches!(err, OutreachError::Config(ref m) if m.contains("leads.hours_threshold")));
        let err =
            OutreachConfig::parse("[scheduling]\nmin_hours_between_runs = 100000\n").unwrap_err();
        assert!(matches!(err, OutreachError::Config(_)));
        assert!(OutreachConfig::parse("[leads]\nhours_threshold = 87600\n").is_ok());
    }

    #[test]
    fn test_save_to_custom_path() {
        let dir = std::env::temp_dir().join(format!("outreach-config-save-{}", std::process::id()));
        let path = dir.join("nested").join("outreach.toml");
        let mut config = OutreachConfig::default();
        config.leads.page_size = 12;
        config.save_to(&path).unwrap();

        let loaded = OutreachConfig::load_from(&path).unwrap();
        assert_eq!(loaded.leads.page_size, 12);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("outreach-config-test");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[sweep]\nforce_schedule_all = true\n").unwrap();
        let config = OutreachConfig::load_from(&path).unwrap();
        assert!(config.sweep.force_schedule_all);
        std::fs::remove_dir_all(&dir).ok();
    }
}
