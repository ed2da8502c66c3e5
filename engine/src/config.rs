//! Engine configuration (TOML)
//!
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [consensus]
//! approve_threshold = 0.6
//! max_votes = 15
//!
//! [rate_limit]
//! max_votes_per_hour = 20
//!
//! [rewards.submission_pricing]
//! finance = 1.5
//!
//! [storage]
//! backend = "sled"
//! data_dir = "./spot-data"
//! ```

use serde::{Deserialize, Serialize};
use spot_consensus::{ConsensusConfig, RateLimitConfig};
use spot_core::{ConfigError, ConfigResult};
use spot_treasury::RewardConfig;
use spot_validator::ReputationConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Commit retry and store-call bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts at an optimistic commit before giving up with a race conflict
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Upper bound on any single store call
    pub store_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 500,
            store_timeout_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::MustBePositive("max_attempts"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::MustBePositive("store_timeout_ms"));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Inconsistent(format!(
                "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.base_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Input limits enforced before a vote is considered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub max_reasoning_chars: usize,
    pub max_id_len: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_reasoning_chars: 2_000,
            max_id_len: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,

    /// Flush the sled database after every committed write
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            data_dir: PathBuf::from("./spot-data"),
            sync_writes: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub consensus: ConsensusConfig,
    pub rate_limit: RateLimitConfig,
    pub reputation: ReputationConfig,
    pub rewards: RewardConfig,
    pub retry: RetryConfig,
    pub guard: GuardConfig,
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigLoadError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.consensus.validate()?;
        self.rate_limit.validate()?;
        self.reputation.validate()?;
        self.rewards.validate()?;
        self.retry.validate()?;
        if self.guard.max_id_len == 0 {
            return Err(ConfigError::MustBePositive("max_id_len"));
        }
        Ok(())
    }

    /// An ephemeral in-memory setup, handy for tests and dry runs
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
