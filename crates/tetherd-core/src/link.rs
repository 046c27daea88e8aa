//! Debounced connection-state machine for the monitored peripheral.
//!
//! Transition rules:
//!
//! - **Connect edge**: acts instantly. Cancels any pending disconnect
//!   debounce and requests `Enable` so the actuated state tracks physical
//!   presence with minimal latency.
//! - **Disconnect edge**: requests nothing yet. Opens a debounce window;
//!   a reconnect inside the window suppresses the disconnect entirely.
//! - **Debounce completion**: fires after the window with no intervening
//!   reconnect and requests `Disable`.
//!
//! This module is pure: it decides, the caller persists, schedules timers,
//! and publishes commands.

use chrono::{DateTime, Utc};

use crate::types::{CommandKind, DebounceRecord};

/// In-memory state of the link state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    /// Debounced connection state (not the raw radio state).
    pub connected: bool,
    /// When the debounced state last changed.
    pub last_change: DateTime<Utc>,
    /// `Some` while a disconnect debounce window is open.
    pub debounce: Option<DebounceRecord>,
}

impl LinkState {
    /// Initial state when nothing is known: disconnected, no window open.
    pub fn disconnected(now: DateTime<Utc>) -> Self {
        Self {
            connected: false,
            last_change: now,
            debounce: None,
        }
    }

    pub fn debounce_pending(&self) -> bool {
        self.debounce.is_some()
    }
}

/// Effects requested by a single raw-signal observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserveOutput {
    /// Whether the debounced state changed in this update.
    pub changed: bool,
    /// Command to publish to the relay, if any. Only ever `Enable` here;
    /// `Disable` comes from [`complete_debounce`].
    pub command: Option<CommandKind>,
    /// Caller must schedule a debounce completion after the full window.
    pub arm_debounce: bool,
    /// Caller must cancel a previously scheduled completion.
    pub cancel_debounce: bool,
}

impl ObserveOutput {
    fn noop() -> Self {
        Self {
            changed: false,
            command: None,
            arm_debounce: false,
            cancel_debounce: false,
        }
    }
}

/// Apply one raw connectivity observation.
///
/// Idempotent: if the debounced state already equals `connected` this is a
/// no-op (an open debounce window stays open — repeated raw disconnects do
/// not restart the clock).
///
/// `automation_enabled` and `has_target` gate command emission only; the
/// state transition itself is always recorded.
pub fn observe(
    state: &LinkState,
    connected: bool,
    now: DateTime<Utc>,
    automation_enabled: bool,
    has_target: bool,
) -> (LinkState, ObserveOutput) {
    if state.connected == connected {
        return (state.clone(), ObserveOutput::noop());
    }

    if connected {
        // Connect edge: cancel any pending debounce, enable immediately.
        let cancel_debounce = state.debounce.is_some();
        let next = LinkState {
            connected: true,
            last_change: now,
            debounce: None,
        };
        let command = (automation_enabled && has_target).then_some(CommandKind::Enable);
        (
            next,
            ObserveOutput {
                changed: true,
                command,
                arm_debounce: false,
                cancel_debounce,
            },
        )
    } else {
        // Disconnect edge: open the window, decide nothing yet. The window
        // is armed even with automation disabled so persisted state stays
        // identical either way; emission is gated at completion time.
        let next = LinkState {
            connected: false,
            last_change: now,
            debounce: Some(DebounceRecord {
                disconnected_at: now,
            }),
        };
        (
            next,
            ObserveOutput {
                changed: true,
                command: None,
                arm_debounce: true,
                cancel_debounce: false,
            },
        )
    }
}

/// Complete a debounce window that elapsed with no intervening reconnect.
///
/// Clears the window record regardless; requests `Disable` only when
/// automation is enabled and a target is configured.
pub fn complete_debounce(
    state: &LinkState,
    automation_enabled: bool,
    has_target: bool,
) -> (LinkState, Option<CommandKind>) {
    let next = LinkState {
        debounce: None,
        ..state.clone()
    };
    let command = (automation_enabled && has_target).then_some(CommandKind::Disable);
    (next, command)
}

// ─── Tests ────────────────────────────────────────────────────────


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeDelta;
    use proptest::prelude::*;

    const WINDOW_MS: i64 = 5000;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    proptest! {
        /// observe never requests Disable; only completion may.
        #[test]
        fn observe_never_disables(
            signals in proptest::collection::vec((any::<bool>(), 0u64..20_000), 0..40),
        ) {
            let mut state = LinkState::disconnected(t0());
            let mut now = t0();
            for (connected, dt_ms) in signals {
                now += TimeDelta::milliseconds(dt_ms as i64);
                let (next, out) = observe(&state, connected, now, true, true);
                prop_assert_ne!(out.command, Some(CommandKind::Disable));
                state = next;
            }
        }

        /// Model the caller's scheduler: a Disable is only ever emitted when
        /// a full window elapsed with no intervening reconnect.
        #[test]
        fn disable_requires_full_quiet_window(
            signals in proptest::collection::vec((any::<bool>(), 0u64..20_000), 0..40),
        ) {
            let mut state = LinkState::disconnected(t0());
            let mut now = t0();
            let mut deadline: Option<DateTime<Utc>> = None;

            for (connected, dt_ms) in signals {
                now += TimeDelta::milliseconds(dt_ms as i64);

                // Fire a due completion before handling the next signal.
                if let Some(d) = deadline {
                    if now >= d {
                        let opened = state.debounce.map(|r| r.disconnected_at);
                        let (next, command) = complete_debounce(&state, true, true);
                        if command == Some(CommandKind::Disable) {
                            let opened = opened.expect("window was open");
                            prop_assert!(d - opened >= TimeDelta::milliseconds(WINDOW_MS));
                        }
                        state = next;
                        deadline = None;
                    }
                }

                let (next, out) = observe(&state, connected, now, true, true);
                if out.cancel_debounce {
                    deadline = None;
                }
                if out.arm_debounce {
                    deadline = Some(now + TimeDelta::milliseconds(WINDOW_MS));
                }
                state = next;
            }
        }
    }
}
