//! VIGIL configuration loaded from `~/.vigil/config.yaml`.
//!
//! Every field has a default, so an absent file or a partial file is fine.
//!
//! ```yaml
//! render_interval_ms: 250
//! recent_events_capacity: 50
//! demo:
//!   agents: 4
//!   tick_ms: 700
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VigilError};
use crate::feed::DEFAULT_EVENT_BUFFER;

/// Get the default config path (`~/.vigil/config.yaml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".vigil/config.yaml"))
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Input loop poll interval
    pub input_poll_ms: u64,

    /// Render loop interval
    pub render_interval_ms: u64,

    /// Capacity of the recent significant events sequence
    pub recent_events_capacity: usize,

    /// Capacity of the recent memory operations sequence
    pub memory_ops_capacity: usize,

    /// Per-agent spark history length
    pub spark_capacity: usize,

    /// Agents remembered at once; offline agents are forgotten first
    pub agent_capacity: usize,

    /// Two Esc presses closer than this trigger emergency exit
    pub double_escape_ms: u64,

    /// How long the runtime waits for an escalation answer
    pub escalation_timeout_secs: u64,

    /// Broadcast capacity of the event bus
    pub event_buffer: usize,

    /// Base delay before resubscribing after the feed drops
    pub resubscribe_backoff_ms: u64,

    /// Show routine events as well as significant ones
    pub verbose: bool,

    /// Demo runtime settings
    pub demo: DemoConfig,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            input_poll_ms: 50,
            render_interval_ms: 250,
            recent_events_capacity: 50,
            memory_ops_capacity: 20,
            spark_capacity: 30,
            agent_capacity: 64,
            double_escape_ms: 300,
            escalation_timeout_secs: 120,
            event_buffer: DEFAULT_EVENT_BUFFER,
            resubscribe_backoff_ms: 200,
            verbose: false,
            demo: DemoConfig::default(),
        }
    }
}

/// Demo runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of simulated agents
    pub agents: usize,

    /// Delay between simulated steps
    pub tick_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            agents: 4,
            tick_ms: 700,
        }
    }
}

impl VigilConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields defaults. A file that exists but does not parse
    /// or validate is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| VigilError::io("reading config", &path, e))?;
        let config = Self::parse(&content).map_err(|message| VigilError::ConfigInvalid {
            path: path.clone(),
            message,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Reject zero intervals and capacities.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, u64); 10] = [
            ("input_poll_ms", self.input_poll_ms),
            ("render_interval_ms", self.render_interval_ms),
            ("recent_events_capacity", self.recent_events_capacity as u64),
            ("memory_ops_capacity", self.memory_ops_capacity as u64),
            ("spark_capacity", self.spark_capacity as u64),
            ("agent_capacity", self.agent_capacity as u64),
            ("double_escape_ms", self.double_escape_ms),
            ("escalation_timeout_secs", self.escalation_timeout_secs),
            ("event_buffer", self.event_buffer as u64),
            ("demo.tick_ms", self.demo.tick_ms),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(VigilError::ConfigValidation {
                message: format!("{name} must be greater than zero"),
            });
        }
        if self.input_poll_ms > self.render_interval_ms {
            return Err(VigilError::ConfigValidation {
                message: format!(
                    "input_poll_ms ({}) must not exceed render_interval_ms ({})",
                    self.input_poll_ms, self.render_interval_ms
                ),
            });
        }
        Ok(())
    }

    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn double_escape(&self) -> Duration {
        Duration::from_millis(self.double_escape_ms)
    }

    pub fn escalation_timeout(&self) -> Duration {
        Duration::from_secs(self.escalation_timeout_secs)
    }

    pub fn resubscribe_backoff(&self) -> Duration {
        Duration::from_millis(self.resubscribe_backoff_ms)
    }
}
