use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tetherd_core::types::{CommandKind, PendingCommand};

use crate::client::DaemonClient;
use crate::relay::CommandRelay;

/// Applies a relayed command to the actual hotspot toggle.
///
/// Implementations run on a blocking thread; shelling out is fine.
pub trait HotspotDriver: Send + Sync {
    fn apply(&self, command: &PendingCommand) -> std::io::Result<()>;
}

/// Driver that delegates to an external program, the way the toggle is
/// actually automated on a given host (a UI-automation script, nmcli
/// wrapper, vendor CLI). The command context is passed via environment:
///
///   TETHERD_COMMAND   -- `enable` or `disable`
///   TETHERD_TARGET    -- monitored device name
///   TETHERD_WAS_WOKEN -- `1` if wake prep ran before this command
pub struct ExecDriver {
    program: String,
}

impl ExecDriver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl HotspotDriver for ExecDriver {
    fn apply(&self, command: &PendingCommand) -> std::io::Result<()> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.program)
            .env("TETHERD_COMMAND", command.kind.as_str())
            .env("TETHERD_TARGET", &command.target)
            .env("TETHERD_WAS_WOKEN", if command.was_woken { "1" } else { "0" })
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "driver program exited with {status}"
            )))
        }
    }
}

/// Fallback driver when no program is configured: log what would happen.
pub struct LogDriver;

impl HotspotDriver for LogDriver {
    fn apply(&self, command: &PendingCommand) -> std::io::Result<()> {
        tracing::info!(
            kind = %command.kind,
            target = %command.target,
            was_woken = command.was_woken,
            "no driver program configured, command logged only"
        );
        Ok(())
    }
}

/// The actuator process loop: poll the relay slot, apply whatever command
/// is pending, and report the resulting hotspot state back to the daemon.
///
/// The relay is deliberately lossy; the actuator only ever sees the latest
/// desired state, so there is no queue to drain and no ordering to track.
pub struct Actuator {
    relay: CommandRelay,
    driver: Arc<dyn HotspotDriver>,
    socket_path: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
}

impl Actuator {
    pub fn new(
        relay: CommandRelay,
        driver: Arc<dyn HotspotDriver>,
        socket_path: impl Into<PathBuf>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            relay,
            driver,
            socket_path: socket_path.into(),
            interval,
            cancel,
        }
    }

    /// Run the poll loop until cancelled.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("actuator stopped");
    }

    pub(crate) async fn tick(&mut self) {
        let command = match self.relay.poll_and_consume() {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "relay poll failed");
                return;
            }
        };

        tracing::info!(kind = %command.kind, target = %command.target, "applying command");
        let applied = {
            let driver = Arc::clone(&self.driver);
            let cmd = command.clone();
            match tokio::task::spawn_blocking(move || driver.apply(&cmd)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, kind = %command.kind, "driver failed");
                    false
                }
                Err(e) => {
                    tracing::warn!(error = %e, "driver task failed");
                    false
                }
            }
        };

        if applied {
            self.report(command.kind == CommandKind::Enable).await;
        }
    }

    /// Best-effort state report back to the daemon. The monitor treats the
    /// actuator as invisible, so a dead daemon costs nothing here.
    async fn report(&self, enabled: bool) {
        let result = async {
            let mut client = DaemonClient::connect(&self.socket_path).await?;
            client
                .report_actuation(enabled)
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))
        }
        .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "actuation report not delivered");
        }
    }
}
