use crate::core::errors::{DiningError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Table configuration: how many philosophers sit down and how long they
/// think and eat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Number of philosophers (and forks) around the table
    pub actors: usize,

    // Timing
    /// Shortest think interval
    pub think_min: Duration,
    /// Longest think interval (inclusive)
    pub think_max: Duration,
    /// Shortest eat interval
    pub eat_min: Duration,
    /// Longest eat interval (inclusive)
    pub eat_max: Duration,

    // Broadcasting
    /// Frames buffered per remote subscriber before the oldest is dropped
    pub snapshot_channel_capacity: usize,

    // Shutdown
    /// Upper bound for `await_shutdown`; `None` waits as long as it takes
    pub shutdown_timeout: Option<Duration>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            actors: 5,
            think_min: Duration::from_secs(1),
            think_max: Duration::from_secs(3),
            eat_min: Duration::from_secs(1),
            eat_max: Duration::from_secs(3),
            snapshot_channel_capacity: 64,
            shutdown_timeout: None,
        }
    }
}

impl TableConfig {
    /// Create a new builder for TableConfig
    pub fn builder() -> TableConfigBuilder {
        TableConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.actors < 1 {
            return Err(DiningError::configuration_field(
                "actor count must be at least 1",
                "actors",
            ));
        }
        if self.think_min > self.think_max {
            return Err(DiningError::configuration_field(
                "think_min cannot exceed think_max",
                "think_min",
            ));
        }
        if self.eat_min > self.eat_max {
            return Err(DiningError::configuration_field(
                "eat_min cannot exceed eat_max",
                "eat_min",
            ));
        }
        if self.snapshot_channel_capacity == 0 {
            return Err(DiningError::configuration_field(
                "snapshot_channel_capacity must be greater than 0",
                "snapshot_channel_capacity",
            ));
        }
        Ok(())
    }

    /// Configuration with no think or eat time, for deterministic runs
    pub fn instant(actors: usize) -> Self {
        Self {
            actors,
            think_min: Duration::ZERO,
            think_max: Duration::ZERO,
            eat_min: Duration::ZERO,
            eat_max: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Parse a YAML document; missing keys fall back to the defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: TableConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DiningError::io(format!("read config {}", path.display()), e))?;
        Self::from_yaml_str(&text)
    }
}

/// Builder for TableConfig
pub struct TableConfigBuilder {
    config: TableConfig,
}

impl TableConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: TableConfig::default(),
        }
    }

    /// Set the number of philosophers
    pub fn actors(mut self, actors: usize) -> Self {
        self.config.actors = actors;
        self
    }

    /// Set the think interval range
    pub fn think_range(mut self, min: Duration, max: Duration) -> Self {
        self.config.think_min = min;
        self.config.think_max = max;
        self
    }

    /// Set the eat interval range
    pub fn eat_range(mut self, min: Duration, max: Duration) -> Self {
        self.config.eat_min = min;
        self.config.eat_max = max;
        self
    }

    /// Set the remote channel capacity
    pub fn snapshot_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.snapshot_channel_capacity = capacity;
        self
    }

    /// Bound the time `await_shutdown` may take
    pub fn shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<TableConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for TableConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
