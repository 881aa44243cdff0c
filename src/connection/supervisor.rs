//! Reconnection supervisor - owns the read loop and the retry counter

use crate::feedback::Feedback;
use crate::transport::Subscriber;
use anyhow::{bail, Result};
use beacon_shared::defaults;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Configuration for the reconnection supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Consecutive failed reads tolerated; the read that makes it
    /// `retries + 1 == max_retries` is terminal
    pub max_retries: u32,
    /// Pause before each reconnection attempt
    pub retry_delay: Duration,
    /// Name to pre-register again before each reconnection attempt
    pub device_name: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_delay: Duration::from_secs(defaults::RETRY_DELAY_SECS),
            device_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connected,
    Retrying,
    Exhausted,
}

/// Reads messages into the command queue and keeps the subscriber alive
pub struct Supervisor<S: Subscriber + ?Sized> {
    subscriber: Arc<S>,
    config: SupervisorConfig,
    commands: Option<mpsc::Sender<Bytes>>,
    feedback: Option<mpsc::Sender<Feedback>>,
    retries: u32,
    state: SupervisorState,
}

impl<S: Subscriber + ?Sized> Supervisor<S> {
    /// The supervisor takes ownership of the queue senders it closes on exit
    pub fn new(
        subscriber: Arc<S>,
        config: SupervisorConfig,
        commands: mpsc::Sender<Bytes>,
        feedback: mpsc::Sender<Feedback>,
    ) -> Self {
        Self {
            subscriber,
            config,
            commands: Some(commands),
            feedback: Some(feedback),
            retries: 0,
            state: SupervisorState::Connected,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run until retries are exhausted; returns the retry count at exit
    pub async fn run(mut self) -> u32 {
        info!("[SUPERVISOR] Read loop starting");

        loop {
            let failure = match self.read_once().await {
                Ok(buffer) => {
                    self.retries = 0;
                    self.state = SupervisorState::Connected;

                    if !self.enqueue(buffer).await {
                        break;
                    }
                    continue;
                }
                Err(e) => e,
            };

            if self.retries + 1 >= self.config.max_retries {
                error!("[SUPERVISOR] Max retries reached & bad read: {}", failure);
                break;
            }

            self.retries += 1;
            self.state = SupervisorState::Retrying;

            warn!(
                "[SUPERVISOR] Bad read: {}, retrying after {:?}",
                failure, self.config.retry_delay
            );
            tokio::time::sleep(self.config.retry_delay).await;

            info!("[SUPERVISOR] Attempting retry: {}", self.retries);
            self.reconnect().await;
        }

        self.shutdown();
        warn!(
            "[SUPERVISOR] Connection loop terminated after {} retries",
            self.retries
        );
        self.retries
    }

    async fn read_once(&self) -> Result<Bytes> {
        if !self.subscriber.is_connected() {
            bail!("Not connected");
        }

        let mut buffer = BytesMut::new();
        self.subscriber.read_into(&mut buffer).await?;
        Ok(buffer.freeze())
    }

    async fn enqueue(&self, buffer: Bytes) -> bool {
        let Some(commands) = &self.commands else {
            return false;
        };

        debug!("[SUPERVISOR] Queueing {} byte message", buffer.len());
        if commands.send(buffer).await.is_err() {
            error!("[SUPERVISOR] Command stream receiver gone, stopping");
            return false;
        }
        true
    }

    /// Re-register (if configured) and reconnect; outcomes are only logged
    async fn reconnect(&self) {
        if let Some(name) = &self.config.device_name {
            if let Err(e) = self.subscriber.preregister(name).await {
                warn!("[SUPERVISOR] Failed preregister \"{}\" on retry: {}", name, e);
            }
        }

        if let Err(e) = self.subscriber.connect().await {
            warn!("[SUPERVISOR] Reconnect failed: {}", e);
        }
    }

    /// Close both queues; consumers drain what is already queued
    fn shutdown(&mut self) {
        self.state = SupervisorState::Exhausted;

        let commands = self.commands.take();
        let feedback = self.feedback.take();
        if commands.is_some() || feedback.is_some() {
            info!("[SUPERVISOR] Closing command and feedback streams");
        }
    }
}
