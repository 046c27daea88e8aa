//! The connection monitor event loop.
//!
//! Everything runs serialized on one task: raw probe signals, control
//! requests from the server, and debounce completions all arrive as queued
//! events, so the state machine itself needs no locking. The pure
//! transition logic lives in `tetherd_core::link`; this module owns the
//! timer, persistence, the relay, and the activity feed around it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use tetherd_bt::ConnectivityProbe;
use tetherd_core::config::{MonitorConfig, WakeConfig};
use tetherd_core::link::{self, LinkState};
use tetherd_core::reconcile::{self, ReconcilePlan};
use tetherd_core::types::{ActivityEntry, CommandKind, LinkSnapshot, PendingCommand};

use crate::debounce::DebounceTimer;
use crate::relay::CommandRelay;
use crate::server::{SharedState, StatusInfo};
use crate::store::StateStore;
use crate::wake;

/// Events consumed by the monitor loop. Control requests are fire-and-forget;
/// the server answers clients from the shared status snapshot.
#[derive(Debug)]
pub enum MonitorEvent {
    /// Raw connectivity observation from the poll source.
    Raw { connected: bool, at: DateTime<Utc> },
    /// Switch the monitored device.
    SetTarget { target: String },
    /// Toggle command emission. Transitions are recorded either way.
    SetAutomation { enabled: bool },
    /// Best-effort hotspot state report from the actuator. Never feeds the
    /// state machine.
    ActuationReport { enabled: bool },
    /// Explicit stop: clear persisted records, then shut the daemon down.
    Stop,
}

pub struct Monitor {
    cfg: MonitorConfig,
    wake_cfg: WakeConfig,
    target: String,
    automation_enabled: bool,
    hotspot_enabled: bool,
    state: LinkState,
    store: StateStore,
    relay: CommandRelay,
    timer: DebounceTimer,
    probe: Arc<ConnectivityProbe>,
    rx: mpsc::Receiver<MonitorEvent>,
    shared: SharedState,
    activity_tx: broadcast::Sender<ActivityEntry>,
    cancel: CancellationToken,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: MonitorConfig,
        wake_cfg: WakeConfig,
        store: StateStore,
        relay: CommandRelay,
        probe: Arc<ConnectivityProbe>,
        rx: mpsc::Receiver<MonitorEvent>,
        shared: SharedState,
        activity_tx: broadcast::Sender<ActivityEntry>,
        cancel: CancellationToken,
    ) -> Self {
        let target = cfg.target.clone();
        let automation_enabled = cfg.automation_enabled;
        Self {
            cfg,
            wake_cfg,
            target,
            automation_enabled,
            hotspot_enabled: false,
            state: LinkState::disconnected(Utc::now()),
            store,
            relay,
            timer: DebounceTimer::new(),
            probe,
            rx,
            shared,
            activity_tx,
            cancel,
        }
    }

    /// Run the monitor: reconcile persisted state, take one authoritative
    /// probe reading, then serve events until cancelled.
    pub async fn run(mut self) {
        self.reconcile(Utc::now()).await;
        self.initial_check().await;
        self.log("monitoring started", true, "connection monitor running", Utc::now())
            .await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.timer.fired() => {
                    self.on_debounce_complete(Utc::now()).await;
                }
                event = self.rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        tracing::info!("monitor loop stopped");
    }

    pub(crate) async fn handle_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Raw { connected, at } => self.handle_raw(connected, at).await,
            MonitorEvent::SetTarget { target } => self.set_target(target).await,
            MonitorEvent::SetAutomation { enabled } => self.set_automation(enabled).await,
            MonitorEvent::ActuationReport { enabled } => self.actuation_report(enabled).await,
            MonitorEvent::Stop => self.stop().await,
        }
    }

    // ── Startup ─────────────────────────────────────────────────────

    /// Resume or complete a persisted debounce window. The resumed timer
    /// keeps the original deadline; restarting must not reset the clock.
    pub(crate) async fn reconcile(&mut self, now: DateTime<Utc>) {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load persisted state, starting fresh");
                None
            }
        };
        let (snapshot, debounce) = match stored {
            Some((snapshot, debounce)) => (Some(snapshot), debounce),
            None => (None, None),
        };

        let plan = reconcile::plan(
            snapshot.as_ref(),
            debounce,
            &self.target,
            now,
            self.cfg.debounce_window(),
        );
        match (plan, snapshot) {
            (ReconcilePlan::FreshStart, _) | (_, None) => {
                self.state = LinkState::disconnected(now);
                self.hotspot_enabled = false;
                self.persist(now).await;
                tracing::info!(target = %self.target, "no usable persisted state, starting fresh");
            }
            (ReconcilePlan::Restored, Some(snapshot)) => {
                self.state = LinkState {
                    connected: snapshot.connected,
                    last_change: snapshot.last_change,
                    debounce: None,
                };
                self.hotspot_enabled = snapshot.hotspot_enabled;
                self.sync_shared().await;
                tracing::info!(connected = snapshot.connected, "restored persisted state");
            }
            (ReconcilePlan::Resume { remaining }, Some(snapshot)) => {
                self.state = LinkState {
                    connected: snapshot.connected,
                    last_change: snapshot.last_change,
                    debounce,
                };
                self.hotspot_enabled = snapshot.hotspot_enabled;
                let remaining = remaining.to_std().unwrap_or_default();
                self.timer.schedule(remaining, now);
                self.sync_shared().await;
                self.log(
                    "debounce resumed",
                    true,
                    format!("{}ms remaining after restart", remaining.as_millis()),
                    now,
                )
                .await;
            }
            (ReconcilePlan::CompleteNow, Some(snapshot)) => {
                self.state = LinkState {
                    connected: snapshot.connected,
                    last_change: snapshot.last_change,
                    debounce,
                };
                self.hotspot_enabled = snapshot.hotspot_enabled;
                self.log(
                    "debounce expired offline",
                    true,
                    "window elapsed while the daemon was down",
                    now,
                )
                .await;
                self.on_debounce_complete(now).await;
            }
        }
    }

    /// One authoritative probe reading to correct drift that happened while
    /// the daemon was not observing (e.g. a reconnect entirely during
    /// downtime, which would otherwise never fire a transition).
    pub(crate) async fn initial_check(&mut self) {
        if self.target.is_empty() {
            tracing::debug!("no target configured, skipping initial probe");
            return;
        }
        let connected = self.probe_connected().await;
        self.handle_raw(connected, Utc::now()).await;
    }

    async fn probe_connected(&mut self) -> bool {
        let probe = Arc::clone(&self.probe);
        let target = self.target.clone();
        match tokio::task::spawn_blocking(move || probe.is_connected(&target)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "connectivity probe failed, assuming disconnected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "probe task failed, assuming disconnected");
                false
            }
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    async fn handle_raw(&mut self, connected: bool, at: DateTime<Utc>) {
        let (next, out) = link::observe(
            &self.state,
            connected,
            at,
            self.automation_enabled,
            !self.target.is_empty(),
        );
        if !out.changed {
            return;
        }

        if out.cancel_debounce {
            self.timer.cancel();
            self.log(
                "debounce cancelled",
                true,
                "reconnected inside the window",
                at,
            )
            .await;
        }

        self.state = next;
        self.persist(at).await;

        if connected {
            let details = if out.command.is_some() {
                "connection established".to_string()
            } else if !self.automation_enabled {
                "automation disabled - no action taken".to_string()
            } else {
                "no target configured - no action taken".to_string()
            };
            self.log("device connected", true, details, at).await;
        } else {
            self.log(
                "device disconnected",
                true,
                format!("starting {}ms debounce window", self.cfg.debounce_window_ms),
                at,
            )
            .await;
        }

        if out.arm_debounce {
            self.timer
                .schedule(self.cfg.debounce_window().to_std().unwrap_or_default(), at);
            self.sync_shared().await;
        }

        if let Some(kind) = out.command {
            self.publish(kind, at).await;
        }
    }

    async fn on_debounce_complete(&mut self, now: DateTime<Utc>) {
        let (next, command) = link::complete_debounce(
            &self.state,
            self.automation_enabled,
            !self.target.is_empty(),
        );
        self.state = next;
        self.persist(now).await;

        match command {
            Some(kind) => {
                self.log(
                    "debounce completed",
                    true,
                    "connection lost for the full window",
                    now,
                )
                .await;
                self.publish(kind, now).await;
            }
            None => {
                self.log(
                    "debounce completed",
                    true,
                    "automation disabled - no action taken",
                    now,
                )
                .await;
            }
        }
    }

    // ── Control ─────────────────────────────────────────────────────

    async fn set_target(&mut self, target: String) {
        if target == self.target {
            return;
        }
        let old = std::mem::replace(&mut self.target, target);
        let now = Utc::now();
        // In-flight debounce for the old device is meaningless now.
        self.timer.cancel();
        self.state = LinkState::disconnected(now);
        self.hotspot_enabled = false;
        self.persist(now).await;
        self.log(
            "target changed",
            true,
            format!("changed from {old:?} to {:?}", self.target),
            now,
        )
        .await;
        // Fresh signal check against live connectivity for the new device.
        self.initial_check().await;
    }

    async fn set_automation(&mut self, enabled: bool) {
        if enabled == self.automation_enabled {
            return;
        }
        self.automation_enabled = enabled;
        self.sync_shared().await;
        // No retroactive commands for transitions missed while disabled.
        let details = if enabled { "automation enabled" } else { "automation disabled" };
        self.log("automation toggled", true, details, Utc::now()).await;
    }

    async fn actuation_report(&mut self, enabled: bool) {
        self.hotspot_enabled = enabled;
        if let Err(first) = self.store.update_hotspot(enabled) {
            tracing::debug!(error = %first, "hotspot write failed, retrying once");
            if let Err(second) = self.store.update_hotspot(enabled) {
                tracing::warn!(error = %second, "hotspot write failed twice, continuing in memory");
            }
        }
        self.sync_shared().await;
        self.log(
            "actuation reported",
            true,
            format!("actuator observed hotspot {}", if enabled { "on" } else { "off" }),
            Utc::now(),
        )
        .await;
    }

    async fn stop(&mut self) {
        self.log("monitoring stopped", true, "explicit stop requested", Utc::now())
            .await;
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear persisted state on stop");
        }
        self.cancel.cancel();
    }

    // ── Effects ─────────────────────────────────────────────────────

    async fn publish(&mut self, kind: CommandKind, at: DateTime<Utc>) {
        let was_woken = match (kind, self.wake_cfg.program.clone()) {
            (CommandKind::Enable, Some(program)) => {
                let woken = wake::run_wake_program(&program, self.wake_cfg.timeout()).await;
                self.log(
                    "wake prep",
                    woken,
                    if woken { "host woken for actuation" } else { "wake program failed" },
                    at,
                )
                .await;
                woken
            }
            _ => false,
        };

        let command = PendingCommand {
            kind,
            target: self.target.clone(),
            was_woken,
        };
        // Publish failures are not retried: the next transition republishes
        // the then-current desired state anyway.
        match self.relay.publish(&command) {
            Ok(()) => {
                self.log(
                    &format!("hotspot {kind} requested"),
                    true,
                    "command left in relay slot",
                    at,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = %kind, "relay publish failed");
                self.log(&format!("hotspot {kind} requested"), false, e.to_string(), at)
                    .await;
            }
        }
    }

    fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            target: self.target.clone(),
            connected: self.state.connected,
            last_change: self.state.last_change,
            hotspot_enabled: self.hotspot_enabled,
        }
    }

    /// Durable write, retried once. After a second failure the in-memory
    /// state stays authoritative until the next successful write; startup
    /// reconciliation recomputes from raw signals either way.
    async fn persist(&mut self, _at: DateTime<Utc>) {
        let snapshot = self.snapshot();
        let debounce = self.state.debounce;
        if let Err(first) = self.store.save(&snapshot, debounce) {
            tracing::debug!(error = %first, "state write failed, retrying once");
            if let Err(second) = self.store.save(&snapshot, debounce) {
                tracing::warn!(error = %second, "state write failed twice, continuing in memory");
            }
        }
        self.sync_shared().await;
    }

    async fn sync_shared(&mut self) {
        let mut shared = self.shared.write().await;
        *shared = StatusInfo {
            target: self.target.clone(),
            connected: self.state.connected,
            last_change: self.state.last_change.to_rfc3339(),
            automation_enabled: self.automation_enabled,
            hotspot_enabled: self.hotspot_enabled,
            debounce_active: self.state.debounce.is_some(),
            debounce_deadline: self.timer.deadline().map(|d| d.to_rfc3339()),
        };
    }

    async fn log(
        &mut self,
        action: &str,
        success: bool,
        details: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        let entry = ActivityEntry::new(action, &self.target, success, details, at);
        tracing::info!(
            action = %entry.action,
            subject = %entry.subject,
            success = entry.success,
            details = %entry.details,
            "activity"
        );
        // Fire-and-forget: nobody subscribed is fine.
        let _ = self.activity_tx.send(entry);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tetherd_bt::runner::BtCommandRunner;
    use tetherd_bt::BtError;
    use tetherd_core::types::DebounceRecord;
    use tokio::sync::RwLock;

    const WINDOW_MS: u64 = 5000;

    /// Runner that always reports the same connected-device listing.
    struct StaticRunner {
        devices: &'static str,
    }

    impl BtCommandRunner for StaticRunner {
        fn run(&self, _args: &[&str]) -> Result<String, BtError> {
            Ok(self.devices.to_string())
        }
    }

    struct Harness {
        monitor: Monitor,
        tx: mpsc::Sender<MonitorEvent>,
        cancel: CancellationToken,
        shared: SharedState,
        activity_rx: broadcast::Receiver<ActivityEntry>,
        relay_path: PathBuf,
        store_path: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn harness(target: &str, automation: bool, devices: &'static str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("state.db");
        let relay_path = dir.path().join("relay.db");

        let cfg = MonitorConfig {
            target: target.into(),
            debounce_window_ms: WINDOW_MS,
            poll_interval_ms: 2000,
            automation_enabled: automation,
        };
        let (tx, rx) = mpsc::channel(16);
        let (activity_tx, activity_rx) = broadcast::channel(64);
        let shared: SharedState = Arc::new(RwLock::new(StatusInfo::default()));
        let cancel = CancellationToken::new();

        let monitor = Monitor::new(
            cfg,
            WakeConfig::default(),
            StateStore::open(&store_path).unwrap(),
            CommandRelay::open(&relay_path).unwrap(),
            Arc::new(ConnectivityProbe::new(Box::new(StaticRunner { devices }))),
            rx,
            Arc::clone(&shared),
            activity_tx,
            cancel.clone(),
        );
        Harness {
            monitor,
            tx,
            cancel,
            shared,
            activity_rx,
            relay_path,
            store_path,
            _dir: dir,
        }
    }

    /// Block until the monitor emits an activity entry with this action.
    async fn wait_for(rx: &mut broadcast::Receiver<ActivityEntry>, action: &str) {
        loop {
            match rx.recv().await {
                Ok(entry) if entry.action == action => return,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => panic!("activity channel closed"),
            }
        }
    }

    fn consume(relay_path: &PathBuf) -> Option<PendingCommand> {
        CommandRelay::open(relay_path).unwrap().poll_and_consume().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn send(tx: &mpsc::Sender<MonitorEvent>, event: MonitorEvent) {
        tx.send(event).await.unwrap();
        // Paused clock: let the monitor task process the event.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // ── Scenario: flap inside the window ────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn reconnect_inside_window_suppresses_disable() {
        let mut h = harness("CarKit", true, "");
        let tx = h.tx.clone();
        tokio::spawn(h.monitor.run());
        wait_for(&mut h.activity_rx, "monitoring started").await;

        // Connect first so the disconnect is a real transition.
        send(&tx, MonitorEvent::Raw { connected: true, at: t0() }).await;
        assert_eq!(consume(&h.relay_path).map(|c| c.kind), Some(CommandKind::Enable));

        // Disconnect at t=0: no command yet, window persisted as active.
        send(&tx, MonitorEvent::Raw { connected: false, at: t0() }).await;
        assert_eq!(consume(&h.relay_path), None);
        assert!(h.shared.read().await.debounce_active);
        let (_, debounce) = StateStore::open(&h.store_path).unwrap().load().unwrap().unwrap();
        assert!(debounce.is_some());

        // Reconnect at t=3s: Enable, window cleared.
        tokio::time::sleep(Duration::from_millis(3000)).await;
        send(
            &tx,
            MonitorEvent::Raw { connected: true, at: t0() + TimeDelta::seconds(3) },
        )
        .await;
        assert_eq!(consume(&h.relay_path).map(|c| c.kind), Some(CommandKind::Enable));
        assert!(!h.shared.read().await.debounce_active);

        // Let the original deadline pass: the cancelled completion must
        // never fire, so no Disable is ever published.
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(consume(&h.relay_path), None);

        h.cancel.cancel();
    }

    // ── Scenario: no reconnect ──────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn full_window_publishes_disable_exactly_once() {
        let mut h = harness("CarKit", true, "");
        let tx = h.tx.clone();
        tokio::spawn(h.monitor.run());
        wait_for(&mut h.activity_rx, "monitoring started").await;

        send(&tx, MonitorEvent::Raw { connected: true, at: t0() }).await;
        consume(&h.relay_path);
        send(&tx, MonitorEvent::Raw { connected: false, at: t0() }).await;

        // Just before the window: nothing.
        tokio::time::sleep(Duration::from_millis(WINDOW_MS - 100)).await;
        assert_eq!(consume(&h.relay_path), None);

        // Past the window: exactly one Disable.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let command = consume(&h.relay_path).expect("disable published");
        assert_eq!(command.kind, CommandKind::Disable);
        assert!(!command.was_woken);
        assert_eq!(consume(&h.relay_path), None);
        assert!(!h.shared.read().await.debounce_active);

        h.cancel.cancel();
    }

    // ── Scenario: repeated raw disconnects keep the original deadline ──

    #[tokio::test(start_paused = true)]
    async fn repeated_disconnect_signal_does_not_extend_window() {
        let mut h = harness("CarKit", true, "");
        let tx = h.tx.clone();
        tokio::spawn(h.monitor.run());
        wait_for(&mut h.activity_rx, "monitoring started").await;

        send(&tx, MonitorEvent::Raw { connected: true, at: t0() }).await;
        consume(&h.relay_path);
        send(&tx, MonitorEvent::Raw { connected: false, at: t0() }).await;

        // A poller re-observes the disconnect mid-window; idempotent no-op.
        tokio::time::sleep(Duration::from_millis(3000)).await;
        send(
            &tx,
            MonitorEvent::Raw { connected: false, at: t0() + TimeDelta::seconds(3) },
        )
        .await;

        // Original deadline (t=5s) still applies.
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(consume(&h.relay_path).map(|c| c.kind), Some(CommandKind::Disable));

        h.cancel.cancel();
    }

    // ── Automation toggle ───────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn automation_off_suppresses_commands_but_persists_state() {
        let mut h = harness("CarKit", false, "");

        h.monitor.handle_raw(true, t0()).await;
        assert_eq!(consume(&h.relay_path), None);

        h.monitor.handle_raw(false, t0() + TimeDelta::seconds(10)).await;
        assert_eq!(consume(&h.relay_path), None);

        // Persisted state is identical to the enabled case: disconnected,
        // window active with the disconnect timestamp.
        let (snapshot, debounce) =
            StateStore::open(&h.store_path).unwrap().load().unwrap().unwrap();
        assert!(!snapshot.connected);
        assert_eq!(
            debounce,
            Some(DebounceRecord { disconnected_at: t0() + TimeDelta::seconds(10) }),
        );

        // Completion clears the window but still publishes nothing.
        h.monitor.on_debounce_complete(t0() + TimeDelta::seconds(15)).await;
        assert_eq!(consume(&h.relay_path), None);
        let (_, debounce) = StateStore::open(&h.store_path).unwrap().load().unwrap().unwrap();
        assert!(debounce.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn enabling_automation_is_not_retroactive() {
        let mut h = harness("CarKit", false, "");
        h.monitor.handle_raw(true, t0()).await;
        assert_eq!(consume(&h.relay_path), None);

        h.monitor.handle_event(MonitorEvent::SetAutomation { enabled: true }).await;
        // The missed connect does not replay; next real transition acts.
        assert_eq!(consume(&h.relay_path), None);
        assert!(h.shared.read().await.automation_enabled);
    }

    // ── Empty target ────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn empty_target_records_without_publishing() {
        let mut h = harness("", true, "");
        h.monitor.handle_raw(true, t0()).await;
        assert_eq!(consume(&h.relay_path), None);
        let (snapshot, _) = StateStore::open(&h.store_path).unwrap().load().unwrap().unwrap();
        assert!(snapshot.connected);
    }

    // ── Restart reconciliation ──────────────────────────────────────

    fn seed_store(path: &PathBuf, disconnected_at: DateTime<Utc>) {
        let store = StateStore::open(path).unwrap();
        store
            .save(
                &LinkSnapshot {
                    target: "CarKit".into(),
                    connected: false,
                    last_change: disconnected_at,
                    hotspot_enabled: true,
                },
                Some(DebounceRecord { disconnected_at }),
            )
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_mid_window_resumes_original_deadline() {
        let h = harness("CarKit", true, "");
        seed_store(&h.store_path, t0());
        let mut monitor = h.monitor;

        // Restart 2s into a 5s window: the timer must target t0+5s.
        let now = t0() + TimeDelta::seconds(2);
        monitor.reconcile(now).await;

        assert!(monitor.timer.is_pending());
        assert_eq!(monitor.timer.deadline(), Some(t0() + TimeDelta::seconds(5)));
        assert!(monitor.state.debounce.is_some());
        assert_eq!(consume(&h.relay_path), None, "resume publishes nothing");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_window_completes_immediately() {
        let h = harness("CarKit", true, "");
        seed_store(&h.store_path, t0());
        let mut monitor = h.monitor;

        // Crash at t=2s, restart at t=7s: elapsed 7s >= 5s window.
        monitor.reconcile(t0() + TimeDelta::seconds(7)).await;

        let command = consume(&h.relay_path).expect("immediate disable");
        assert_eq!(command.kind, CommandKind::Disable);
        assert!(!monitor.timer.is_pending());
        let (_, debounce) = StateStore::open(&h.store_path).unwrap().load().unwrap().unwrap();
        assert!(debounce.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_with_foreign_target_starts_fresh() {
        let h = harness("NewKit", true, "");
        seed_store(&h.store_path, t0());
        let mut monitor = h.monitor;

        monitor.reconcile(t0() + TimeDelta::seconds(2)).await;

        assert!(!monitor.timer.is_pending());
        assert!(monitor.state.debounce.is_none());
        assert_eq!(consume(&h.relay_path), None);
        let (snapshot, _) = StateStore::open(&h.store_path).unwrap().load().unwrap().unwrap();
        assert_eq!(snapshot.target, "NewKit");
        assert!(!snapshot.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_check_corrects_offline_reconnect() {
        // Persisted says disconnected; the live probe says the device is
        // back. The startup check must fire the connect transition.
        let h = harness("CarKit", true, "Device AA:BB:CC:DD:EE:FF CarKit\n");
        let store = StateStore::open(&h.store_path).unwrap();
        store
            .save(
                &LinkSnapshot {
                    target: "CarKit".into(),
                    connected: false,
                    last_change: t0(),
                    hotspot_enabled: false,
                },
                None,
            )
            .unwrap();
        drop(store);

        let mut monitor = h.monitor;
        monitor.reconcile(t0() + TimeDelta::seconds(60)).await;
        monitor.initial_check().await;

        assert_eq!(consume(&h.relay_path).map(|c| c.kind), Some(CommandKind::Enable));
        assert!(monitor.state.connected);
    }

    // ── Target change ───────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn target_change_discards_window_and_rechecks() {
        let mut h = harness("OldKit", true, "Device AA:BB:CC:DD:EE:FF NewKit\n");

        // OldKit disconnects mid-session; window opens.
        h.monitor.handle_raw(true, t0()).await;
        consume(&h.relay_path);
        h.monitor.handle_raw(false, t0() + TimeDelta::seconds(1)).await;
        assert!(h.monitor.timer.is_pending());

        h.monitor
            .handle_event(MonitorEvent::SetTarget { target: "NewKit".into() })
            .await;

        assert!(!h.monitor.timer.is_pending(), "old window discarded");
        // The fresh probe sees NewKit connected and enables for it.
        let command = consume(&h.relay_path).expect("enable for new target");
        assert_eq!(command.kind, CommandKind::Enable);
        assert_eq!(command.target, "NewKit");
    }

    // ── Actuation report & stop ─────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn actuation_report_updates_snapshot_only() {
        let mut h = harness("CarKit", true, "");
        h.monitor.handle_raw(true, t0()).await;
        consume(&h.relay_path);

        h.monitor
            .handle_event(MonitorEvent::ActuationReport { enabled: true })
            .await;

        assert!(h.shared.read().await.hotspot_enabled);
        let (snapshot, _) = StateStore::open(&h.store_path).unwrap().load().unwrap().unwrap();
        assert!(snapshot.hotspot_enabled);
        // The report never feeds the state machine.
        assert!(h.monitor.state.connected);
        assert_eq!(consume(&h.relay_path), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_persisted_state_and_cancels() {
        let mut h = harness("CarKit", true, "");
        h.monitor.handle_raw(true, t0()).await;
        consume(&h.relay_path);

        h.monitor.handle_event(MonitorEvent::Stop).await;

        assert!(h.cancel.is_cancelled());
        assert!(StateStore::open(&h.store_path).unwrap().load().unwrap().is_none());
    }
}
