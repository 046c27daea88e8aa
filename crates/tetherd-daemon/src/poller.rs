use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tetherd_bt::ConnectivityProbe;

use crate::monitor::MonitorEvent;
use crate::server::SharedState;

/// Periodically probes live connectivity for the monitored device and feeds
/// raw observations to the monitor.
///
/// An unavailable signal source (controller gone, tool missing) is reported
/// as disconnected rather than an error: the debounce window absorbs brief
/// outages the same way it absorbs link flaps.
pub struct ProbeSource {
    probe: Arc<ConnectivityProbe>,
    state: SharedState,
    tx: mpsc::Sender<MonitorEvent>,
    interval: Duration,
    cancel: CancellationToken,
}

impl ProbeSource {
    pub fn new(
        probe: Arc<ConnectivityProbe>,
        state: SharedState,
        tx: mpsc::Sender<MonitorEvent>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            probe,
            state,
            tx,
            interval,
            cancel,
        }
    }

    /// Run the polling loop until cancelled.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
        tracing::debug!("probe source stopped");
    }

    async fn poll_once(&self) {
        // The monitor owns the target; follow whatever it currently is.
        let target = self.state.read().await.target.clone();
        if target.is_empty() {
            return;
        }

        // is_connected shells out, so run it off the async workers.
        let connected = {
            let probe = Arc::clone(&self.probe);
            match tokio::task::spawn_blocking(move || probe.is_connected(&target)).await {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "probe failed, treating device as disconnected");
                    false
                }
                Err(e) => {
                    tracing::warn!(error = %e, "probe task failed, treating device as disconnected");
                    false
                }
            }
        };

        let event = MonitorEvent::Raw {
            connected,
            at: Utc::now(),
        };
        if self.tx.send(event).await.is_err() {
            tracing::debug!("monitor gone, probe observation dropped");
        }
    }
}
