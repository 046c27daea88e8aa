//! Startup reconciliation arithmetic.
//!
//! A restart must resume an in-flight debounce window, not restart it:
//! given a disconnect at `T0` and window `W`, a resumed timer fires at
//! `T0 + W` no matter when the process came back. A window that expired
//! while the process was down completes immediately.

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::{DebounceRecord, LinkSnapshot};

/// What the monitor must do with persisted state at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePlan {
    /// No usable record (none stored, or it names a different target):
    /// start disconnected with no window open.
    FreshStart,
    /// Record restored; no debounce was in flight.
    Restored,
    /// Window still open: reschedule completion for the remainder.
    Resume { remaining: TimeDelta },
    /// Window expired during downtime: run the completion logic now.
    CompleteNow,
}

/// Decide how to resume from persisted state.
pub fn plan(
    stored: Option<&LinkSnapshot>,
    debounce: Option<DebounceRecord>,
    configured_target: &str,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> ReconcilePlan {
    let Some(snapshot) = stored else {
        return ReconcilePlan::FreshStart;
    };
    if snapshot.target != configured_target {
        return ReconcilePlan::FreshStart;
    }

    match debounce {
        None => ReconcilePlan::Restored,
        Some(record) => {
            let elapsed = now.signed_duration_since(record.disconnected_at);
            if elapsed >= window {
                ReconcilePlan::CompleteNow
            } else {
                // A stored timestamp in the future (clock went backwards)
                // yields remaining > window; clamp to one full window.
                ReconcilePlan::Resume {
                    remaining: (window - elapsed).min(window),
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
