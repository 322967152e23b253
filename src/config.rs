//! Configuration for the activity agent.

use crate::core::pipeline::PersistencePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the activity agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minimum time between two committed label changes of one kind
    #[serde(with = "duration_ms_serde")]
    pub debounce_dwell: Duration,

    /// How recent the secondary source must be to count as live
    #[serde(with = "duration_ms_serde")]
    pub liveness_window: Duration,

    /// Samples with any axis beyond this magnitude (in g) are dropped
    pub max_abs_acceleration: f32,

    /// Model files for the five cascade stages
    pub models: ModelPaths,

    /// Path for storing stats and the event store
    pub data_path: PathBuf,

    /// Append-only event store (JSON lines)
    pub store_path: PathBuf,

    /// IANA timezone used to group history by day
    pub timezone: String,

    /// Which decisions are persisted
    pub persistence: PersistencePolicy,

    /// Capacity of the event sink queue
    pub sink_queue_capacity: usize,

    /// Capacity of each lane's delivery queue
    pub lane_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wearable-activity-agent");

        Self {
            debounce_dwell: Duration::from_millis(1000),
            liveness_window: Duration::from_millis(1000),
            max_abs_acceleration: 16.0,
            models: ModelPaths::in_dir(&data_dir.join("models")),
            store_path: data_dir.join("events.jsonl"),
            data_path: data_dir,
            timezone: "UTC".to_string(),
            persistence: PersistencePolicy::EveryDecision,
            sink_queue_capacity: 1024,
            lane_queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wearable-activity-agent")
            .join("config.json")
    }

    /// Path of the persisted pipeline counters.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.store_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_pipeline_limits(
            self.max_abs_acceleration,
            self.sink_queue_capacity,
            self.lane_queue_capacity,
        )
        .map_err(ConfigError::InvalidValue)?;
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "unknown timezone '{}'",
                self.timezone
            )));
        }
        Ok(())
    }

    /// The configured timezone, falling back to UTC.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

/// Limits every running pipeline needs, whether they come from the config
/// file or are set on the builder directly.
pub(crate) fn check_pipeline_limits(
    max_abs_acceleration: f32,
    sink_queue_capacity: usize,
    lane_queue_capacity: usize,
) -> Result<(), String> {
    if max_abs_acceleration.is_nan() || max_abs_acceleration <= 0.0 {
        return Err(format!(
            "max_abs_acceleration must be positive, got {max_abs_acceleration}"
        ));
    }
    if sink_queue_capacity == 0 || lane_queue_capacity == 0 {
        return Err("queue capacities must be positive".to_string());
    }
    Ok(())
}

/// Model file locations, one per cascade stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPaths {
    pub branch: PathBuf,
    pub static_activity: PathBuf,
    pub dynamic_activity: PathBuf,
    pub secondary_aux: PathBuf,
    pub respiratory: PathBuf,
}

impl ModelPaths {
    /// Conventional file names inside one directory.
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            branch: dir.join("branch.json"),
            static_activity: dir.join("static.json"),
            dynamic_activity: dir.join("dynamic.json"),
            secondary_aux: dir.join("secondary_aux.json"),
            respiratory: dir.join("respiratory.json"),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
