//! Beacon Shared Protocol Types
//!
//! This crate provides the wire messages, envelope codec and key handling
//! used by the beacon device client to talk to the beacon api.

pub mod codec;
pub mod proto;
pub mod security;

use std::time::Duration;

// Re-export commonly used types at crate root
pub use proto::*;

/// Fixed endpoints and headers of the beacon api
pub mod api {
    /// Path used both for pre-registration and for opening the websocket
    pub const REGISTRATION_ENDPOINT: &str = "register";

    /// Path feedback envelopes are posted to
    pub const FEEDBACK_ENDPOINT: &str = "feedback";

    /// Content type of feedback posts
    pub const FEEDBACK_CONTENT_TYPE: &str = "application/octet-stream";

    /// Header carrying the shared secret when opening the websocket
    pub const AUTHORIZATION_HEADER: &str = "x-device-auth";

    /// Body of every heartbeat ping
    pub const HEARTBEAT_PAYLOAD: &[u8] = b"ping";
}

/// Runtime defaults for the client
pub mod defaults {
    /// Capacity of the command and feedback queues
    pub const COMMAND_BUFFER: usize = 2;

    /// Seconds between heartbeat pings
    pub const HEARTBEAT_DELAY_SECS: u64 = 10;

    /// Ping attempts per heartbeat tick before the heartbeat gives up
    pub const HEARTBEAT_MAX_ATTEMPTS: u32 = 100;

    /// Seconds to wait before each reconnection attempt
    pub const RETRY_DELAY_SECS: u64 = 5;

    /// Consecutive failed reads tolerated before the client shuts down
    pub const MAX_RETRIES: u32 = 10;
}

/// Color (and fade) the output device is asked to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorState {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Transition time from the previous state
    pub fade: Duration,
}

impl ColorState {
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            fade: Duration::ZERO,
        }
    }

    /// Zero state; the device is dark
    pub const fn off() -> Self {
        Self::rgb(0, 0, 0)
    }
}

/// Wire channels are u32; anything above 255 saturates to full intensity
/// instead of wrapping modulo 256
fn channel(value: u32) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

fn to_std_duration(value: &Option<prost_types::Duration>) -> Option<Duration> {
    value
        .as_ref()
        .and_then(|d| Duration::try_from(d.clone()).ok())
}

impl ControlFrame {
    /// How long the frame should be held after it is applied
    pub fn hold(&self) -> Option<Duration> {
        to_std_duration(&self.duration).filter(|d| !d.is_zero())
    }
}

impl From<&ControlFrame> for ColorState {
    fn from(frame: &ControlFrame) -> Self {
        Self {
            red: channel(frame.red),
            green: channel(frame.green),
            blue: channel(frame.blue),
            fade: to_std_duration(&frame.fade_time).unwrap_or_default(),
        }
    }
}

impl From<ColorState> for ReportMessage {
    fn from(state: ColorState) -> Self {
        Self {
            red: state.red.into(),
            green: state.green.into(),
            blue: state.blue.into(),
        }
    }
}

/// Builder helpers for creating messages
impl DeviceMessage {
    pub fn new(
        message_type: DeviceMessageType,
        message_digest: impl Into<String>,
        device_id: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            r#type: message_type.into(),
            authentication: Some(DeviceMessageAuthentication {
                message_digest: message_digest.into(),
                device_id: device_id.into(),
            }),
            payload,
        }
    }
}

impl WelcomeMessage {
    /// Welcome advertising `key` as the server key
    pub fn for_key(
        key: &rsa::RsaPublicKey,
        device_id: impl Into<String>,
    ) -> Result<Self, security::KeyError> {
        let der = security::ServerKey::new(key.clone()).to_der()?;

        Ok(Self {
            device_id: device_id.into(),
            shared_secret: hex::encode(der),
        })
    }
}

impl ControlFrame {
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: red.into(),
            green: green.into(),
            blue: blue.into(),
            fade_time: None,
            duration: None,
        }
    }
}
