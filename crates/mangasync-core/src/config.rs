use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::source::SourceId;
use crate::throttle::ThrottleLimits;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of fetch attempts per item (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Per-source limits as written in config.toml.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLimitsConfig {
    /// Maximum concurrent in-flight requests to one source.
    pub max_concurrent: usize,
    /// Minimum spacing between successive request starts, in milliseconds.
    pub min_interval_ms: u64,
}

impl SourceLimitsConfig {
    pub fn to_limits(self) -> ThrottleLimits {
        ThrottleLimits::new(
            self.max_concurrent,
            Duration::from_millis(self.min_interval_ms),
        )
    }
}

/// `[throttle]` section: defaults plus per-source overrides keyed by source id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
    #[serde(default)]
    pub sources: HashMap<String, SourceLimitsConfig>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval_ms: 500,
            sources: HashMap::new(),
        }
    }
}

impl ThrottleConfig {
    pub fn default_limits(&self) -> ThrottleLimits {
        SourceLimitsConfig {
            max_concurrent: self.max_concurrent,
            min_interval_ms: self.min_interval_ms,
        }
        .to_limits()
    }

    /// Overrides with keys that parse as source ids; unparsable keys are logged and dropped.
    pub fn overrides(&self) -> HashMap<SourceId, ThrottleLimits> {
        let mut out = HashMap::with_capacity(self.sources.len());
        for (key, limits) in &self.sources {
            match key.parse::<i64>() {
                Ok(id) => {
                    out.insert(SourceId(id), limits.to_limits());
                }
                Err(_) => tracing::warn!(key = %key, "ignoring throttle override with non-numeric source id"),
            }
        }
        out
    }
}

/// Global configuration loaded from `~/.config/mangasync/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Worker-pool size for library update runs.
    pub max_update_workers: usize,
    /// Worker-pool size for chapter download runs.
    pub max_download_workers: usize,
    /// Deadline for a single fetch attempt, in seconds.
    pub fetch_timeout_secs: u64,
    /// Root directory for downloaded chapters (None = XDG data dir).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_update_workers: 8,
            max_download_workers: 4,
            fetch_timeout_secs: 30,
            download_dir: None,
            throttle: ThrottleConfig::default(),
            retry: None,
        }
    }
}

impl SyncConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    /// Chapter storage root: configured dir, else `~/.local/share/mangasync/chapters`.
    pub fn resolved_download_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.download_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mangasync")?;
        Ok(xdg_dirs.get_data_home().join("chapters"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mangasync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SyncConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<SyncConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: SyncConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
