//! Engine configuration structures

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::HookError;

/// Lifecycle engine configuration, usually read from `hooks.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the UI, used for report links
    #[serde(default = "default_ui_url")]
    pub ui_url: String,

    /// Transient collaborator failures tolerated per event
    #[serde(default = "default_max_retries")]
    pub max_retries: u64,

    /// Lookups of one unresolved analysis before it is marked Error
    #[serde(default = "default_max_analysis_checks")]
    pub max_analysis_checks: u64,

    /// Minimum delay between two polls of a dispatch's git-info operation
    #[serde(default = "default_git_info_check_interval_secs")]
    pub git_info_check_interval_secs: u64,

    /// JSONL file receiving lifecycle notices (optional)
    #[serde(default)]
    pub notices_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ui_url: default_ui_url(),
            max_retries: default_max_retries(),
            max_analysis_checks: default_max_analysis_checks(),
            git_info_check_interval_secs: default_git_info_check_interval_secs(),
            notices_log: None,
        }
    }
}

/// Longest accepted git-info check interval: one day.
pub const MAX_GIT_INFO_CHECK_INTERVAL_SECS: u64 = 86_400;

// Serde default functions
fn default_ui_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_retries() -> u64 {
    10
}

fn default_max_analysis_checks() -> u64 {
    60
}

fn default_git_info_check_interval_secs() -> u64 {
    5
}

impl EngineConfig {
    /// Load the config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, HookError> {
        let content = std::fs::read_to_string(path).map_err(|e| HookError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| HookError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if config.git_info_check_interval_secs > MAX_GIT_INFO_CHECK_INTERVAL_SECS {
            return Err(HookError::Config {
                path: path.display().to_string(),
                reason: format!(
                    "git_info_check_interval_secs {} exceeds {}",
                    config.git_info_check_interval_secs, MAX_GIT_INFO_CHECK_INTERVAL_SECS
                ),
            });
        }
        Ok(config)
    }

    /// Try to load the config, returning defaults if it can't be read.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Capped at [`MAX_GIT_INFO_CHECK_INTERVAL_SECS`] for configs built in code.
    pub fn git_info_check_interval(&self) -> Duration {
        let secs = self
            .git_info_check_interval_secs
            .min(MAX_GIT_INFO_CHECK_INTERVAL_SECS);
        Duration::seconds(secs as i64)
    }
}
