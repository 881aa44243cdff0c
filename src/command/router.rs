//! Command router - authenticates inbound buffers and dispatches by type

use super::{
    ControlExecutor, ExecutionOutcome, ExecutionSlot, ExecutionToken, Registration,
    RegistrationCell,
};
use crate::device::Device;
use crate::feedback::Feedback;
use beacon_shared::codec::{self, AuthenticatedMessage, MessageError};
use beacon_shared::security::DeviceKey;
use beacon_shared::{ColorState, DeviceMessageType};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the router did with an authenticated message
#[derive(Debug)]
pub enum Dispatch {
    /// A welcome replaced the registration
    Registered(Arc<Registration>),
    /// A control sequence was started
    Executing {
        token: ExecutionToken,
        task: JoinHandle<ExecutionOutcome>,
    },
    /// A control message carried no frames
    Skipped,
    /// The message type was not understood; the device was turned off
    Reset,
}

/// Owns the registration and the execution slot; consumes the command queue
pub struct CommandRouter {
    device: Arc<dyn Device>,
    key: Arc<DeviceKey>,
    registrations: Arc<RegistrationCell>,
    slot: Arc<ExecutionSlot>,
    feedback: mpsc::Sender<Feedback>,
}

impl CommandRouter {
    pub fn new(device: Arc<dyn Device>, key: Arc<DeviceKey>, feedback: mpsc::Sender<Feedback>) -> Self {
        Self {
            device,
            key,
            registrations: Arc::new(RegistrationCell::new()),
            slot: Arc::new(ExecutionSlot::new()),
            feedback,
        }
    }

    pub fn registrations(&self) -> Arc<RegistrationCell> {
        self.registrations.clone()
    }

    pub fn slot(&self) -> Arc<ExecutionSlot> {
        self.slot.clone()
    }

    /// Process the command queue until it is closed and drained
    pub async fn run(self, mut commands: mpsc::Receiver<Bytes>) {
        info!("[COMMAND] Command router starting");

        while let Some(buffer) = commands.recv().await {
            match self.handle(&buffer).await {
                Ok(dispatch) => debug!("[COMMAND] Dispatched: {:?}", dispatch),
                Err(e) => warn!("[COMMAND] Dropping message: {}", e),
            }
        }

        info!("[COMMAND] Command stream closed, router stopping");
    }

    /// Authenticate one buffer and act on it
    pub async fn handle(&self, buffer: &[u8]) -> Result<Dispatch, MessageError> {
        let message = codec::authenticate(buffer, &self.key)?;

        debug!(
            "[COMMAND] Received message digest: {}",
            message.digest_prefix()
        );

        match message.message_type() {
            Some(DeviceMessageType::Welcome) => self.handle_welcome(message),
            Some(DeviceMessageType::Control) => self.handle_control(message),
            None => {
                warn!(
                    "[COMMAND] Unknown message type {}, turning device off",
                    message.raw_type
                );
                if let Err(e) = self.device.set_state(ColorState::off()).await {
                    warn!("[COMMAND] Unable to turn device off: {}", e);
                }
                Ok(Dispatch::Reset)
            }
        }
    }

    fn handle_welcome(&self, message: AuthenticatedMessage) -> Result<Dispatch, MessageError> {
        let server_key = codec::decode_welcome(&message.payload)?;

        info!(
            "[COMMAND] Received welcome, device_id={}",
            message.device_id
        );

        let registration = self.registrations.install(Registration {
            server_key,
            device_id: message.device_id,
        });

        Ok(Dispatch::Registered(registration))
    }

    fn handle_control(&self, message: AuthenticatedMessage) -> Result<Dispatch, MessageError> {
        let registration = self
            .registrations
            .snapshot()
            .ok_or(MessageError::Unregistered)?;

        let control = codec::decode_control(&message.payload)?;

        if control.frames.is_empty() {
            debug!("[COMMAND] Skipping control message, no valid frames");
            return Ok(Dispatch::Skipped);
        }

        let token = self.slot.mint();
        let executor = ControlExecutor::new(
            self.device.clone(),
            self.slot.clone(),
            self.registrations.clone(),
            self.feedback.clone(),
        );

        let task = tokio::spawn(executor.execute(control, token, registration));

        Ok(Dispatch::Executing { token, task })
    }
}
