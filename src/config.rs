// src/config.rs

//! Manages engine configuration: loading, coercion, and validation.
//!
//! Configuration is loaded once at startup and never mutated afterwards.
//! Every field has a declared type with exactly one documented coercion:
//! boolean fields additionally accept the strings `"true"`, `"false"`,
//! `"1"`, and `"0"`. Anything else fails validation and the process does
//! not start.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Component, Path};

/// Accepts a TOML boolean or one of the four documented boolean strings.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Flag(flag) => Ok(flag),
        Raw::Text(text) => match text.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean value '{other}' (expected true/false/1/0)"
            ))),
        },
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8378
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration for the cache store and key variants.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for cache entry artifacts.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Directory for cross-process lock artifacts.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,
    /// Default TTL in seconds for new entries. `0` means never expire.
    #[serde(default = "default_ttl")]
    pub default_ttl: u64,
    /// Two-level sharded layout instead of a flat directory.
    #[serde(default = "default_use_sharding", deserialize_with = "lenient_bool")]
    pub use_sharding: bool,
    /// Variant axes derived from the request. Subset of
    /// `{device, language}`.
    #[serde(default)]
    pub variant_axes: Vec<String>,
}

fn default_cache_dir() -> String {
    "restatic_data/cache".to_string()
}
fn default_lock_dir() -> String {
    "restatic_data/locks".to_string()
}
fn default_ttl() -> u64 {
    60
}
fn default_use_sharding() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            lock_dir: default_lock_dir(),
            default_ttl: default_ttl(),
            use_sharding: default_use_sharding(),
            variant_axes: Vec::new(),
        }
    }
}

/// Configuration for freshness classification.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FreshnessConfig {
    /// The stale window `W` in seconds. Unset means `W = ttl` per entry.
    #[serde(default)]
    pub stale_window_seconds: Option<u64>,
}

/// Configuration for background regeneration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackgroundConfig {
    /// Generation budget in seconds; also the lock lifetime for
    /// background regenerations.
    #[serde(default = "default_background_timeout")]
    pub timeout: u64,
    /// Reserved for future retry policies; validated but unused.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Bound of the dispatch queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Interval of the expired-lock sweeper.
    #[serde(default = "default_lock_sweep")]
    pub lock_sweep_seconds: u64,
    /// Interval of the store pruner.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_seconds: u64,
}

fn default_background_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_queue_depth() -> usize {
    1024
}
fn default_lock_sweep() -> u64 {
    600 // 10 minutes
}
fn default_prune_interval() -> u64 {
    3600 // 1 hour
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            timeout: default_background_timeout(),
            max_retries: default_max_retries(),
            queue_depth: default_queue_depth(),
            lock_sweep_seconds: default_lock_sweep(),
            prune_interval_seconds: default_prune_interval(),
        }
    }
}

/// Configuration for the stats recorder.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatsConfig {
    /// When false, a no-op recorder is used and snapshots read zero.
    #[serde(default = "default_stats_enabled", deserialize_with = "lenient_bool")]
    pub enabled: bool,
}

fn default_stats_enabled() -> bool {
    true
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: default_stats_enabled(),
        }
    }
}

/// Configuration for response compression.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompressionConfig {
    #[serde(
        default = "default_compression_enabled",
        deserialize_with = "lenient_bool"
    )]
    pub enabled: bool,
    /// Gzip level, 1 (fastest) through 9 (smallest).
    #[serde(default = "default_compression_level")]
    pub level: u32,
}

fn default_compression_enabled() -> bool {
    true
}
fn default_compression_level() -> u32 {
    6
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: default_compression_enabled(),
            level: default_compression_level(),
        }
    }
}

/// The validated engine configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            cache: CacheConfig::default(),
            freshness: FreshnessConfig::default(),
            background: BackgroundConfig::default(),
            stats: StatsConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }

        validate_base_path("cache.dir", &self.cache.dir)?;
        validate_base_path("cache.lock_dir", &self.cache.lock_dir)?;
        if self.cache.dir == self.cache.lock_dir {
            return Err(anyhow!("cache.dir and cache.lock_dir must differ"));
        }

        for axis in &self.cache.variant_axes {
            if axis != "device" && axis != "language" {
                return Err(anyhow!(
                    "unknown variant axis '{axis}' (expected 'device' or 'language')"
                ));
            }
        }

        if self.background.queue_depth == 0 {
            return Err(anyhow!("background.queue_depth cannot be 0"));
        }
        if self.background.lock_sweep_seconds == 0 {
            return Err(anyhow!("background.lock_sweep_seconds cannot be 0"));
        }
        if self.background.prune_interval_seconds == 0 {
            return Err(anyhow!("background.prune_interval_seconds cannot be 0"));
        }

        if !(1..=9).contains(&self.compression.level) {
            return Err(anyhow!(
                "compression.level must be between 1 and 9, got {}",
                self.compression.level
            ));
        }
        Ok(())
    }
}

/// Rejects empty paths and any path that escapes its base via `..`.
fn validate_base_path(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field} cannot be empty"));
    }
    let traverses = Path::new(value)
        .components()
        .any(|c| matches!(c, Component::ParentDir));
    if traverses {
        return Err(anyhow!("{field} must not contain '..' components"));
    }
    Ok(())
}
