//! Fleet configuration.
//!
//! Plain serde structs with complete defaults: a default fleet is one
//! sensor of each kind sampling every two seconds into
//! `data/raw_data.csv`. A JSON file with the same shape overrides any of
//! it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sonde_core::{ClampRange, DistributionSpec, SensorKind};

use crate::producer::{JitterSpec, RetryPolicy};

/// Default cadence between samples.
const DEFAULT_INTERVAL_MS: u64 = 2_000;

/// One configured sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// Stable identifier; auto-assigned (`TEMP-001`) when omitted.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub jitter: JitterSpec,
    /// Override of the documented default shape for `kind`.
    #[serde(default)]
    pub distribution: Option<DistributionSpec>,
    /// Optional physical bounds; readings keep their tails when unset.
    #[serde(default)]
    pub clamp: Option<ClampRange>,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl SensorConfig {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            id: None,
            interval_ms: DEFAULT_INTERVAL_MS,
            jitter: JitterSpec::default(),
            distribution: None,
            clamp: None,
        }
    }

    /// Distribution to sample, falling back to the documented default.
    pub fn spec(&self) -> DistributionSpec {
        self.distribution
            .unwrap_or_else(|| DistributionSpec::default_for(self.kind))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Whole-run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub sensors: Vec<SensorConfig>,
    /// Raw record store path.
    pub output: PathBuf,
    /// Bound on the store's writer queue.
    pub queue_capacity: usize,
    /// How often producers re-check the control signal.
    pub poll_interval_ms: u64,
    pub retry: RetryPolicy,
    pub shutdown_timeout_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            sensors: SensorKind::ALL.iter().map(|&k| SensorConfig::new(k)).collect(),
            output: PathBuf::from("data/raw_data.csv"),
            queue_capacity: 8_192,
            poll_interval_ms: 25,
            retry: RetryPolicy::default(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl FleetConfig {
    /// Loads a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Read(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolved sensor ids, auto-numbering unnamed sensors per kind.
    pub fn sensor_ids(&self) -> Vec<String> {
        let mut per_kind: HashMap<SensorKind, u32> = HashMap::new();
        self.sensors
            .iter()
            .map(|sensor| {
                let n = per_kind.entry(sensor.kind).or_insert(0);
                *n += 1;
                sensor
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{}-{:03}", sensor.kind.id_prefix(), n))
            })
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Failure to load a config file.
#[derive(Debug, Clone)]
pub enum ConfigError {
    Read(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(e) => write!(f, "failed to read config: {}", e),
            Self::Parse(e) => write!(f, "failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
