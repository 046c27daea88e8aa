//! Daemon configuration: TOML file with every field defaulted, so an empty
//! file (or no file at all) yields a working setup.

use chrono::TimeDelta;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration. Sections mirror the daemon's components.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub paths: PathsConfig,
    pub wake: WakeConfig,
    pub actuator: ActuatorConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Bluetooth device name to track. Empty means record-only: transitions
    /// are persisted but no command is ever published.
    pub target: String,
    /// Disconnect debounce window in milliseconds.
    pub debounce_window_ms: u64,
    /// How often the live connectivity probe runs, in milliseconds.
    pub poll_interval_ms: u64,
    /// When false, transitions are recorded but no command is published.
    pub automation_enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            debounce_window_ms: 5000,
            poll_interval_ms: 2000,
            automation_enabled: true,
        }
    }
}

impl MonitorConfig {
    pub fn debounce_window(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.debounce_window_ms as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Monitor state database (connection + debounce records).
    pub state_db: String,
    /// Relay database shared with the actuator process.
    pub relay_db: String,
    /// Unix socket for the control interface.
    pub socket: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_db: "/tmp/tetherd/state.db".into(),
            relay_db: "/tmp/tetherd/relay.db".into(),
            socket: "/tmp/tetherd/tetherd.sock".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WakeConfig {
    /// Optional program run before publishing an Enable command, used to
    /// wake the host display. Best-effort; failure only clears the
    /// command's was_woken flag.
    pub program: Option<String>,
    pub timeout_ms: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            program: None,
            timeout_ms: 3000,
        }
    }
}

impl WakeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActuatorConfig {
    /// How often the actuator polls the relay, in milliseconds.
    pub poll_interval_ms: u64,
    /// External program that performs the hotspot toggle. Receives the
    /// command context in TETHERD_* environment variables.
    pub driver_program: Option<String>,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            driver_program: None,
        }
    }
}

impl ActuatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Parse a TOML string. Unknown keys are rejected to catch typos.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ─── Tests ────────────────────────────────────────────────────────
