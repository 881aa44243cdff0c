//! Wire messages exchanged with the beacon api
//!
//! Every message is protobuf encoded. Inbound traffic arrives as a
//! [`DeviceMessage`] envelope whose payload is one of the typed messages
//! below; outbound reports travel inside a [`FeedbackMessage`].

use prost::{Enumeration, Message};

/// Declared type of an inbound envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum DeviceMessageType {
    Welcome = 0,
    Control = 1,
}

/// Declared type of an outbound feedback envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum FeedbackMessageType {
    Report = 0,
}

/// Authentication block shared by inbound and outbound envelopes
#[derive(Clone, PartialEq, Message)]
pub struct DeviceMessageAuthentication {
    #[prost(string, tag = "1")]
    pub message_digest: String,

    #[prost(string, tag = "2")]
    pub device_id: String,
}

/// Inbound envelope
#[derive(Clone, PartialEq, Message)]
pub struct DeviceMessage {
    #[prost(enumeration = "DeviceMessageType", tag = "1")]
    pub r#type: i32,

    #[prost(message, optional, tag = "2")]
    pub authentication: Option<DeviceMessageAuthentication>,

    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

/// Sent by the server once it has accepted the device's shared secret
#[derive(Clone, PartialEq, Message)]
pub struct WelcomeMessage {
    #[prost(string, tag = "1")]
    pub device_id: String,

    /// Hex encoded DER (SubjectPublicKeyInfo) server public key
    #[prost(string, tag = "2")]
    pub shared_secret: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ControlFrame {
    #[prost(uint32, tag = "1")]
    pub red: u32,

    #[prost(uint32, tag = "2")]
    pub green: u32,

    #[prost(uint32, tag = "3")]
    pub blue: u32,

    #[prost(message, optional, tag = "4")]
    pub fade_time: Option<prost_types::Duration>,

    #[prost(message, optional, tag = "5")]
    pub duration: Option<prost_types::Duration>,
}

/// Ordered sequence of frames to apply to the device
#[derive(Clone, PartialEq, Message)]
pub struct ControlMessage {
    #[prost(message, repeated, tag = "1")]
    pub frames: Vec<ControlFrame>,
}

/// State report payload carried by a [`FeedbackMessage`]
#[derive(Clone, PartialEq, Message)]
pub struct ReportMessage {
    #[prost(uint32, tag = "1")]
    pub red: u32,

    #[prost(uint32, tag = "2")]
    pub green: u32,

    #[prost(uint32, tag = "3")]
    pub blue: u32,
}

/// Outbound envelope posted to the feedback endpoint
#[derive(Clone, PartialEq, Message)]
pub struct FeedbackMessage {
    #[prost(enumeration = "FeedbackMessageType", tag = "1")]
    pub r#type: i32,

    #[prost(message, optional, tag = "2")]
    pub authentication: Option<DeviceMessageAuthentication>,

    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}
