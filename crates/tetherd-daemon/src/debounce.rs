//! Single-slot debounce timer for the monitor's event loop.
//!
//! There is only ever zero or one outstanding timer. Each armed timer
//! carries a generation number; cancelling (or re-arming) bumps the
//! generation, so a sleep task that already fired for a cancelled window
//! delivers a stale generation and is discarded. This makes the completion
//! event ordered after any cancellation issued before it fired, even
//! though the sleep itself cannot be revoked once spawned.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct DebounceTimer {
    generation: u64,
    deadline: Option<DateTime<Utc>>,
    tx: mpsc::Sender<u64>,
    rx: mpsc::Receiver<u64>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(8);
        Self {
            generation: 0,
            deadline: None,
            tx,
            rx,
        }
    }

    /// Arm the timer to fire after `after`. An already pending timer is
    /// cancelled first.
    pub fn schedule(&mut self, after: Duration, now: DateTime<Utc>) {
        self.generation += 1;
        self.deadline =
            Some(now + TimeDelta::milliseconds(after.as_millis().min(i64::MAX as u128) as i64));
        let generation = self.generation;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Receiver gone means the monitor is shutting down.
            let _ = tx.send(generation).await;
        });
    }

    /// Cancel a pending timer. No-op when none is pending.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Deadline of the pending timer, if any.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Resolve when the currently armed timer fires. Stale generations from
    /// cancelled timers are silently drained. Pends forever when no timer
    /// is armed, so it is safe to poll inside `select!`.
    pub async fn fired(&mut self) {
        loop {
            match self.rx.recv().await {
                Some(generation)
                    if generation == self.generation && self.deadline.is_some() =>
                {
                    self.deadline = None;
                    return;
                }
                Some(_) => continue,
                // Unreachable: we hold a sender for the timer's lifetime.
                None => std::future::pending().await,
            }
        }
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_window() {
        let mut timer = DebounceTimer::new();
        timer.schedule(Duration::from_millis(5000), Utc::now());
        assert!(timer.is_pending());

        timer.fired().await;
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let mut timer = DebounceTimer::new();
        timer.schedule(Duration::from_millis(5000), Utc::now());
        timer.cancel();
        assert!(!timer.is_pending());

        // Let the original deadline pass; the stale generation must be
        // discarded, so fired() keeps pending.
        let fired = tokio::time::timeout(Duration::from_millis(20_000), timer.fired()).await;
        assert!(fired.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_pending_timer() {
        let mut timer = DebounceTimer::new();
        let now = Utc::now();
        timer.schedule(Duration::from_millis(5000), now);
        timer.schedule(Duration::from_millis(1000), now);

        // Fires at the new (shorter) deadline and only once.
        tokio::time::timeout(Duration::from_millis(2000), timer.fired())
            .await
            .expect("rescheduled timer fires");
        let second = tokio::time::timeout(Duration::from_millis(20_000), timer.fired()).await;
        assert!(second.is_err(), "old timer generation must be discarded");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_reflects_schedule_time() {
        let mut timer = DebounceTimer::new();
        let now = Utc::now();
        timer.schedule(Duration::from_millis(3000), now);
        assert_eq!(timer.deadline(), Some(now + TimeDelta::milliseconds(3000)));
        timer.cancel();
        assert_eq!(timer.deadline(), None);
    }
}
