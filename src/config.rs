use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::DebounceConfig;
use crate::fetch::{EndpointConfig, PacingConfig};
use crate::pipeline::PipelineConfig;
use crate::scheduler::{SchedulerConfig, SweeperConfig};

/// Longest accepted cache lifetime.
const MAX_TTL_DAYS: u64 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub pipeline: PipelineSettings,
    pub cache: CacheSettings,
    pub sweeper: SweeperSettings,
    pub discovery: DiscoverySettings,
    pub endpoints: EndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub batch_size: u64,
    pub batch_pause_ms: u64,
    pub error_cooldown_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            jitter_min_ms: 200,
            jitter_max_ms: 600,
            batch_size: 30,
            batch_pause_ms: 3000,
            error_cooldown_ms: 5000,
            fetch_timeout_ms: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub path: PathBuf,
    pub ttl_days: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME"))
                .join("cache.db"),
            ttl_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSettings {
    pub interval_secs: u64,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub change_debounce_ms: u64,
    pub scroll_debounce_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            change_debounce_ms: 250,
            scroll_debounce_ms: 200,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            pipeline: PipelineSettings::default(),
            cache: CacheSettings::default(),
            sweeper: SweeperSettings::default(),
            discovery: DiscoverySettings::default(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.concurrency == 0 {
            eyre::bail!("pipeline.concurrency must be at least 1");
        }
        if p.jitter_min_ms > p.jitter_max_ms {
            eyre::bail!(
                "pipeline.jitter_min_ms ({}) exceeds jitter_max_ms ({})",
                p.jitter_min_ms,
                p.jitter_max_ms
            );
        }
        if self.sweeper.interval_secs == 0 {
            eyre::bail!("sweeper.interval_secs must be at least 1");
        }
        if self.cache.ttl_days == 0 || self.cache.ttl_days > MAX_TTL_DAYS {
            eyre::bail!(
                "cache.ttl_days must be between 1 and {}, got {}",
                MAX_TTL_DAYS,
                self.cache.ttl_days
            );
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_days.saturating_mul(24 * 60 * 60))
    }

    /// Runtime settings for one pipeline session.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let p = &self.pipeline;
        PipelineConfig {
            scheduler: SchedulerConfig {
                concurrency: p.concurrency,
                error_cooldown: Duration::from_millis(p.error_cooldown_ms),
            },
            pacing: PacingConfig {
                jitter_min: Duration::from_millis(p.jitter_min_ms),
                jitter_max: Duration::from_millis(p.jitter_max_ms),
                batch_size: p.batch_size,
                batch_pause: Duration::from_millis(p.batch_pause_ms),
                fetch_timeout: Duration::from_millis(p.fetch_timeout_ms),
            },
            sweeper: SweeperConfig {
                interval: Duration::from_secs(self.sweeper.interval_secs),
            },
            debounce: DebounceConfig {
                change_quiet: Duration::from_millis(self.discovery.change_debounce_ms),
                scroll_quiet: Duration::from_millis(self.discovery.scroll_debounce_ms),
            },
            ttl: self.ttl(),
        }
    }
}
