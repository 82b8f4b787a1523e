//! Periodic re-announcement of the local presence record.
//!
//! The scheduler only beats while the channel is `Connected`, the host has
//! not suspended it and the local user is online. Any change to those
//! inputs, or to the timing config, restarts the wait so a new interval
//! applies immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::PresenceChannelClient;
use crate::network::PresenceConfig;
use crate::protocol::{ConnectionStatus, PresenceRecord};

/// Whether a beat due `now` should be sent given the last successful send.
pub(crate) fn should_beat(last_sent: Option<Instant>, now: Instant, window: Duration) -> bool {
    match last_sent {
        Some(last) => now.saturating_duration_since(last) >= window,
        None => true,
    }
}

pub struct HeartbeatScheduler {
    suspended: watch::Sender<bool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatScheduler {
    /// Spawn the scheduler. `record` is the local user's current record,
    /// `None` while offline.
    pub fn start(
        client: Arc<PresenceChannelClient>,
        record: watch::Receiver<Option<PresenceRecord>>,
        status: watch::Receiver<ConnectionStatus>,
        config: watch::Receiver<PresenceConfig>,
    ) -> Self {
        let (suspended, suspended_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            client,
            Inputs {
                record,
                status,
                config,
                suspended: suspended_rx,
            },
            cancel.clone(),
        ));
        Self {
            suspended,
            cancel,
            task,
        }
    }

    /// Stop beating until `resume()`.
    pub fn suspend(&self) {
        if !self.suspended.send_replace(true) {
            debug!("heartbeat suspended");
        }
    }

    pub fn resume(&self) {
        if self.suspended.send_replace(false) {
            debug!("heartbeat resumed");
        }
    }

    pub fn is_suspended(&self) -> bool {
        *self.suspended.borrow()
    }

    /// Stop for good. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Inputs {
    record: watch::Receiver<Option<PresenceRecord>>,
    status: watch::Receiver<ConnectionStatus>,
    config: watch::Receiver<PresenceConfig>,
    suspended: watch::Receiver<bool>,
}

impl Inputs {
    /// Marks every input as seen, so no short-circuiting here.
    fn active(&mut self) -> bool {
        let connected = *self.status.borrow_and_update() == ConnectionStatus::Connected;
        let suspended = *self.suspended.borrow_and_update();
        let online = self.record.borrow_and_update().is_some();
        connected && !suspended && online
    }

    /// Resolves when any input changes. `false` once an input is gone.
    async fn changed(&mut self) -> bool {
        tokio::select! {
            r = self.status.changed() => r.is_ok(),
            r = self.suspended.changed() => r.is_ok(),
            r = self.record.changed() => r.is_ok(),
            r = self.config.changed() => r.is_ok(),
        }
    }
}

async fn run(client: Arc<PresenceChannelClient>, mut inputs: Inputs, cancel: CancellationToken) {
    loop {
        let active = inputs.active();
        let config = *inputs.config.borrow_and_update();

        if !active {
            tokio::select! {
                _ = cancel.cancelled() => return,
                alive = inputs.changed() => if !alive { return },
            }
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(config.heartbeat_interval) => {
                beat(&client, &inputs.record, &config).await;
            }
            alive = inputs.changed() => {
                if !alive {
                    return;
                }
                debug!("heartbeat rescheduled");
            }
        }
    }
}

async fn beat(
    client: &PresenceChannelClient,
    record: &watch::Receiver<Option<PresenceRecord>>,
    config: &PresenceConfig,
) {
    let record = record.borrow().clone();
    let Some(record) = record else {
        return;
    };
    if !should_beat(client.last_sent().await, Instant::now(), config.debounce_window()) {
        debug!("heartbeat debounced");
        return;
    }
    match client.track(record.refreshed()).await {
        Ok(()) => debug!(user_id = %record.user_id, "heartbeat sent"),
        Err(e) => warn!(error = %e, "heartbeat failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkQuality;
    use crate::transport::{MemoryHub, MemoryTransport, PresenceTransport};

    struct Rig {
        transport: MemoryTransport,
        client: Arc<PresenceChannelClient>,
        record: watch::Sender<Option<PresenceRecord>>,
        status: watch::Sender<ConnectionStatus>,
        config: watch::Sender<PresenceConfig>,
        _events: tokio::sync::mpsc::Receiver<crate::channel::ChannelEvent>,
    }

    async fn rig() -> (Rig, HeartbeatScheduler) {
        let hub = MemoryHub::new();
        let transport = hub.transport();
        let shared: Arc<dyn PresenceTransport> = Arc::new(transport.clone());
        let (client, events) = PresenceChannelClient::new(shared, "fleet", "u1");
        let client = Arc::new(client);
        client.connect().await.unwrap();

        let record = PresenceRecord::new("u1".into(), "u1".into(), "U1".into(), None, None);
        client.track(record.clone()).await.unwrap();

        let (record_tx, record_rx) = watch::channel(Some(record));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let (config_tx, config_rx) = watch::channel(NetworkQuality::Fast.presence_config());
        let scheduler =
            HeartbeatScheduler::start(Arc::clone(&client), record_rx, status_rx, config_rx);
        let rig = Rig {
            transport,
            client,
            record: record_tx,
            status: status_tx,
            config: config_tx,
            _events: events,
        };
        (rig, scheduler)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn debounce_window_check() {
        let now = Instant::now();
        let window = Duration::from_secs(8);
        assert!(should_beat(None, now, window));
        assert!(!should_beat(Some(now), now + Duration::from_secs(7), window));
        assert!(should_beat(Some(now), now + Duration::from_secs(8), window));
    }

    #[tokio::test(start_paused = true)]
    async fn beats_every_interval_while_connected() {
        let (rig, _scheduler) = rig().await;
        assert_eq!(rig.transport.tracks_sent(), 1);

        advance(10_100).await;
        assert_eq!(rig.transport.tracks_sent(), 2);
        advance(10_000).await;
        assert_eq!(rig.transport.tracks_sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_explicit_track_suppresses_beat() {
        let (rig, _scheduler) = rig().await;

        advance(9_000).await;
        let record = rig.record.borrow().clone().unwrap();
        rig.client.track(record.refreshed()).await.unwrap();
        assert_eq!(rig.transport.tracks_sent(), 2);

        // Due at 10s, but only 1s after the explicit track.
        advance(1_500).await;
        assert_eq!(rig.transport.tracks_sent(), 2);

        advance(10_000).await;
        assert_eq!(rig.transport.tracks_sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn config_change_reschedules() {
        let (rig, _scheduler) = rig().await;

        advance(5_000).await;
        rig.config.send_replace(NetworkQuality::Slow.presence_config());

        advance(5_500).await;
        assert_eq!(rig.transport.tracks_sent(), 1, "old 10s timer must not fire");

        // Slow is 30s, counted from the change at 5s.
        advance(24_000).await;
        assert_eq!(rig.transport.tracks_sent(), 1);
        advance(1_000).await;
        assert_eq!(rig.transport.tracks_sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_unless_connected_and_online() {
        let (rig, _scheduler) = rig().await;

        rig.status.send_replace(ConnectionStatus::Disconnected);
        advance(60_000).await;
        assert_eq!(rig.transport.tracks_sent(), 1);

        rig.status.send_replace(ConnectionStatus::Connected);
        rig.record.send_replace(None);
        advance(60_000).await;
        assert_eq!(rig.transport.tracks_sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_and_resume() {
        let (rig, scheduler) = rig().await;

        scheduler.suspend();
        assert!(scheduler.is_suspended());
        advance(60_000).await;
        assert_eq!(rig.transport.tracks_sent(), 1);

        scheduler.resume();
        advance(10_100).await;
        assert_eq!(rig.transport.tracks_sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_beat_does_not_stop_scheduler() {
        let (rig, scheduler) = rig().await;

        rig.transport.fail_sends(true);
        advance(10_100).await;
        assert_eq!(rig.transport.tracks_sent(), 1);
        assert!(scheduler.is_running());

        rig.transport.fail_sends(false);
        advance(10_000).await;
        assert_eq!(rig.transport.tracks_sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_immediate_and_idempotent() {
        let (rig, scheduler) = rig().await;
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        advance(60_000).await;
        assert_eq!(rig.transport.tracks_sent(), 1);
    }
}
