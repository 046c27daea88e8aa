//! Live connectivity probe over a [`BtCommandRunner`].

use crate::error::BtError;
use crate::parser::{is_device_connected, parse_powered};
use crate::runner::BtCommandRunner;

/// Answers "is the named device currently connected?" by shelling out to
/// bluetoothctl. Sync; callers on an async runtime run it on a blocking
/// thread.
pub struct ConnectivityProbe {
    runner: Box<dyn BtCommandRunner>,
}

impl ConnectivityProbe {
    pub fn new(runner: Box<dyn BtCommandRunner>) -> Self {
        Self { runner }
    }

    /// Whether the named device appears among the connected devices.
    pub fn is_connected(&self, target: &str) -> Result<bool, BtError> {
        let output = self.runner.run(&["devices", "Connected"])?;
        Ok(is_device_connected(&output, target))
    }

    /// Whether a controller exists and is powered on.
    pub fn controller_powered(&self) -> Result<bool, BtError> {
        let output = self.runner.run(&["show"])?;
        Ok(parse_powered(&output).unwrap_or(false))
    }
}

// ─── Tests ────────────────────────────────────────────────────────
