use serde::{Deserialize, Serialize};
use shoebox_types::config::DEFAULT_PERSIST_THRESHOLD;
use std::{fs, path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;

/// Games per play above which the per-game table is withheld.
pub const DEFAULT_SIZE_LIMIT: u64 = 500;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_RETAINED_SIMULATIONS: usize = 8;

/// Configuration for the simulation server, as read from YAML.
///
/// Every field has a default so an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Worker pool size; 0 selects the available parallelism.
    #[serde(default)]
    pub worker_threads: usize,

    #[serde(default = "default_persist_threshold")]
    pub persist_threshold: u64,
    #[serde(default = "default_size_limit")]
    pub size_limit: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    #[serde(default = "default_max_retained_simulations")]
    pub max_retained_simulations: usize,

    /// Requests per second per client IP. Unset disables rate limiting.
    #[serde(default)]
    pub rate_limit_per_second: Option<u64>,
}

fn default_port() -> u16 {
    3001
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_persist_threshold() -> u64 {
    DEFAULT_PERSIST_THRESHOLD
}

fn default_size_limit() -> u64 {
    DEFAULT_SIZE_LIMIT
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_worker_timeout_secs() -> u64 {
    DEFAULT_WORKER_TIMEOUT_SECS
}

fn default_max_retained_simulations() -> usize {
    DEFAULT_MAX_RETAINED_SIMULATIONS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
            json_logs: false,
            worker_threads: 0,
            persist_threshold: DEFAULT_PERSIST_THRESHOLD,
            size_limit: DEFAULT_SIZE_LIMIT,
            default_page_size: DEFAULT_PAGE_SIZE,
            worker_timeout_secs: DEFAULT_WORKER_TIMEOUT_SECS,
            max_retained_simulations: DEFAULT_MAX_RETAINED_SIMULATIONS,
            rate_limit_per_second: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("could not read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("default_page_size must be at most {max} (got {value})")]
    PageSizeTooLarge { value: u32, max: u32 },
}

/// Limits and pool sizing used by the simulator itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatorSettings {
    pub worker_threads: usize,
    pub persist_threshold: u64,
    pub size_limit: u64,
    pub default_page_size: u32,
    pub worker_timeout: Duration,
    pub max_retained_simulations: usize,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            persist_threshold: DEFAULT_PERSIST_THRESHOLD,
            size_limit: DEFAULT_SIZE_LIMIT,
            default_page_size: DEFAULT_PAGE_SIZE,
            worker_timeout: Duration::from_secs(DEFAULT_WORKER_TIMEOUT_SECS),
            max_retained_simulations: DEFAULT_MAX_RETAINED_SIMULATIONS,
        }
    }
}

pub struct ValidatedServerConfig {
    pub port: u16,
    pub log_level: Level,
    pub json_logs: bool,
    pub rate_limit_per_second: Option<u64>,
    pub settings: SimulatorSettings,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ServerConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ServerConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ServerConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn validate(self) -> Result<ValidatedServerConfig, ServerConfigError> {
        for (field, value) in [
            ("persist_threshold", self.persist_threshold),
            ("size_limit", self.size_limit),
            ("default_page_size", self.default_page_size as u64),
            ("worker_timeout_secs", self.worker_timeout_secs),
            ("max_retained_simulations", self.max_retained_simulations as u64),
            (
                "rate_limit_per_second",
                self.rate_limit_per_second.unwrap_or(1),
            ),
        ] {
            if value == 0 {
                return Err(ServerConfigError::InvalidNonZero { field, value });
            }
        }
        if self.default_page_size > MAX_PAGE_SIZE {
            return Err(ServerConfigError::PageSizeTooLarge {
                value: self.default_page_size,
                max: MAX_PAGE_SIZE,
            });
        }

        let log_level = Level::from_str(&self.log_level).map_err(|_| {
            ServerConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            }
        })?;

        Ok(ValidatedServerConfig {
            port: self.port,
            log_level,
            json_logs: self.json_logs,
            rate_limit_per_second: self.rate_limit_per_second,
            settings: SimulatorSettings {
                worker_threads: self.worker_threads,
                persist_threshold: self.persist_threshold,
                size_limit: self.size_limit,
                default_page_size: self.default_page_size,
                worker_timeout: Duration::from_secs(self.worker_timeout_secs),
                max_retained_simulations: self.max_retained_simulations,
            },
        })
    }
}
