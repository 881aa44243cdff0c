//! Control executor - applies a frame sequence to the device
//!
//! Each accepted control message gets a fresh [`ExecutionToken`]. Minting a
//! token makes it current, which is the only way a running sequence is
//! preempted: executors compare their token against the current one before
//! every frame and stop once they have been superseded. A device call that is
//! already in flight is never interrupted.

use super::{Registration, RegistrationCell};
use crate::device::Device;
use crate::feedback::Feedback;
use beacon_shared::{ColorState, ControlMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Value held by [`ExecutionSlot`] while no sequence is running
const IDLE: u64 = 0;

/// Opaque marker for one accepted control sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionToken(u64);

/// Tracks which control sequence is currently authoritative
#[derive(Debug)]
pub struct ExecutionSlot {
    current: AtomicU64,
    next: AtomicU64,
}

impl ExecutionSlot {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(IDLE),
            next: AtomicU64::new(IDLE + 1),
        }
    }

    /// Mint a new token and make it current
    pub fn mint(&self) -> ExecutionToken {
        let token = self.next.fetch_add(1, Ordering::SeqCst);
        self.current.store(token, Ordering::SeqCst);
        ExecutionToken(token)
    }

    pub fn is_current(&self, token: ExecutionToken) -> bool {
        self.current.load(Ordering::SeqCst) == token.0
    }

    /// Return to idle, but only if `token` is still current
    pub fn release(&self, token: ExecutionToken) -> bool {
        self.current
            .compare_exchange(token.0, IDLE, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn current(&self) -> Option<ExecutionToken> {
        match self.current.load(Ordering::SeqCst) {
            IDLE => None,
            token => Some(ExecutionToken(token)),
        }
    }
}

impl Default for ExecutionSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// How a control sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every frame was applied
    Completed { applied: usize },
    /// A newer sequence took over before all frames were applied
    Superseded { applied: usize },
    /// The device rejected a frame
    DeviceFailed { applied: usize },
}

/// Runs one control sequence against the device
pub struct ControlExecutor {
    device: Arc<dyn Device>,
    slot: Arc<ExecutionSlot>,
    registrations: Arc<RegistrationCell>,
    feedback: mpsc::Sender<Feedback>,
}

impl ControlExecutor {
    pub fn new(
        device: Arc<dyn Device>,
        slot: Arc<ExecutionSlot>,
        registrations: Arc<RegistrationCell>,
        feedback: mpsc::Sender<Feedback>,
    ) -> Self {
        Self {
            device,
            slot,
            registrations,
            feedback,
        }
    }

    /// Apply `control` frame by frame while `token` stays current
    ///
    /// `registration` is the snapshot the sequence was accepted under; each
    /// feedback item carries the newest snapshot available when it is made.
    pub async fn execute(
        self,
        control: ControlMessage,
        token: ExecutionToken,
        registration: Arc<Registration>,
    ) -> ExecutionOutcome {
        debug!(
            "[COMMAND] Executing control message w/ {} frames ({:?})",
            control.frames.len(),
            token
        );

        let outcome = self.apply_frames(&control, token, registration).await;

        // A newer sequence owns the slot if this fails; leave it alone.
        self.slot.release(token);

        debug!("[COMMAND] Control {:?} finished: {:?}", token, outcome);
        outcome
    }

    async fn apply_frames(
        &self,
        control: &ControlMessage,
        token: ExecutionToken,
        accepted_under: Arc<Registration>,
    ) -> ExecutionOutcome {
        for (applied, frame) in control.frames.iter().enumerate() {
            if !self.slot.is_current(token) {
                debug!("[COMMAND] Control {:?} superseded after {} frames", token, applied);
                return ExecutionOutcome::Superseded { applied };
            }

            let state = ColorState::from(frame);
            let registration = self
                .registrations
                .snapshot()
                .unwrap_or_else(|| accepted_under.clone());

            if let Err(e) = self.device.set_state(state).await {
                error!(
                    "[COMMAND] Unable to set device state, aborting control frames: {}",
                    e
                );
                self.emit(Feedback::error(registration, e)).await;
                return ExecutionOutcome::DeviceFailed { applied };
            }

            self.emit(Feedback::state(registration, state)).await;

            if let Some(hold) = frame.hold() {
                tokio::time::sleep(hold).await;
            }
        }

        ExecutionOutcome::Completed {
            applied: control.frames.len(),
        }
    }

    async fn emit(&self, feedback: Feedback) {
        if self.feedback.send(feedback).await.is_err() {
            warn!("[COMMAND] Feedback stream closed, dropping feedback");
        }
    }
}
