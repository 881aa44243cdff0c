//! Heartbeat loop
//!
//! Pings the api on a fixed interval. A failed ping is retried inline after
//! the same interval; once a single tick has used up its attempts the
//! heartbeat stops for good. The rest of the client keeps running.

use crate::transport::Pinger;
use beacon_shared::{api, defaults};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Delay between pings, and between retries of a failed ping
    pub delay: Duration,
    /// Ping attempts per tick before giving up
    pub max_attempts: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(defaults::HEARTBEAT_DELAY_SECS),
            max_attempts: defaults::HEARTBEAT_MAX_ATTEMPTS,
        }
    }
}

/// Why the heartbeat loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// [`HeartbeatHandle::stop`] was called
    Stopped,
    /// A tick ran out of ping attempts
    Exhausted,
}

/// Handle to stop a running heartbeat
pub struct HeartbeatHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<HeartbeatExit>,
}

impl HeartbeatHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the loop to end
    pub async fn join(self) -> HeartbeatExit {
        self.task.await.unwrap_or(HeartbeatExit::Stopped)
    }
}

/// Spawn the heartbeat loop
pub fn start<P: Pinger + ?Sized + 'static>(pinger: Arc<P>, config: HeartbeatConfig) -> HeartbeatHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(pinger, config, stop_rx));

    HeartbeatHandle { stop_tx, task }
}

async fn run<P: Pinger + ?Sized>(
    pinger: Arc<P>,
    config: HeartbeatConfig,
    mut stop_rx: watch::Receiver<bool>,
) -> HeartbeatExit {
    info!("[HEARTBEAT] Heartbeat starting, every {:?}", config.delay);

    // interval() panics on a zero period
    let delay = config.delay.max(Duration::from_millis(1));
    let mut ticker = interval(delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the first ping waits a full delay.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.changed() => break,
        }

        let mut attempts = 0;
        loop {
            attempts += 1;

            match pinger.ping(api::HEARTBEAT_PAYLOAD).await {
                Ok(()) => {
                    debug!("[HEARTBEAT] Successfully pinged api host");
                    break;
                }
                Err(e) if attempts >= config.max_attempts => {
                    error!(
                        "[HEARTBEAT] Unable to ping after {} attempts, stopping: {}",
                        attempts, e
                    );
                    return HeartbeatExit::Exhausted;
                }
                Err(e) => {
                    warn!("[HEARTBEAT] Ping attempt {} failed: {}", attempts, e);
                }
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop_rx.changed() => return HeartbeatExit::Stopped,
            }
        }
    }

    info!("[HEARTBEAT] Heartbeat stopped");
    HeartbeatExit::Stopped
}
