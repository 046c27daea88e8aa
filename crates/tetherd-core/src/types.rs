use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Commands ─────────────────────────────────────────────────────

/// Desired hotspot state requested from the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Enable,
    Disable,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            _ => Err(ParseError::CommandKind(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command kind: {0:?}")]
    CommandKind(String),
}

/// A single actuation request handed to the relay.
///
/// At most one of these is ever pending; a newer publish overwrites an
/// unconsumed older one. Last-write-wins, no queueing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommand {
    pub kind: CommandKind,
    pub target: String,
    /// Whether the host had to be woken before this command was issued.
    /// The actuator may wait longer for the UI to settle when set.
    pub was_woken: bool,
}

// ─── Link state ───────────────────────────────────────────────────

/// Debounced connection snapshot for the monitored target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub target: String,
    /// Debounced connection state, not the raw radio state.
    pub connected: bool,
    pub last_change: DateTime<Utc>,
    /// Hotspot state as last reported by the actuator. Never feeds the
    /// state machine; display and persistence only.
    pub hotspot_enabled: bool,
}

impl LinkSnapshot {
    pub fn disconnected(target: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            target: target.into(),
            connected: false,
            last_change: now,
            hotspot_enabled: false,
        }
    }
}

/// An in-flight disconnect debounce, persisted so a restart can resume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceRecord {
    /// When the raw disconnect was observed.
    pub disconnected_at: DateTime<Utc>,
}

// ─── Activity feed ────────────────────────────────────────────────

/// One entry in the observability feed. Fire-and-forget: no ordering or
/// delivery guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action: String,
    pub subject: String,
    pub success: bool,
    pub details: String,
    pub at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        action: impl Into<String>,
        subject: impl Into<String>,
        success: bool,
        details: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            action: action.into(),
            subject: subject.into(),
            success,
            details: details.into(),
            at,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
