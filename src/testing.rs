//! Key and message builders shared by the pipeline tests

use crate::command::Registration;
use beacon_shared::security::{encrypt_oaep, DeviceKey, ServerKey, AUTHENTICATION_LABEL};
use beacon_shared::{ControlFrame, ControlMessage, DeviceMessage, DeviceMessageType, WelcomeMessage};
use prost::Message;
use rsa::RsaPrivateKey;

pub fn test_private_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("key generation failed")
}

pub fn registration_for(server_private: &RsaPrivateKey, device_id: &str) -> Registration {
    Registration {
        server_key: ServerKey::new(server_private.to_public_key()),
        device_id: device_id.to_string(),
    }
}

/// Digest the given device will accept
pub fn digest_for(device: &DeviceKey) -> String {
    let ciphertext = encrypt_oaep(&device.public_key(), AUTHENTICATION_LABEL, b"digest")
        .expect("encrypt failed");
    hex::encode(ciphertext)
}

pub fn welcome_bytes(device: &DeviceKey, server_private: &RsaPrivateKey, device_id: &str) -> Vec<u8> {
    let welcome = WelcomeMessage::for_key(&server_private.to_public_key(), device_id)
        .expect("welcome encode failed");

    DeviceMessage::new(
        DeviceMessageType::Welcome,
        digest_for(device),
        device_id,
        welcome.encode_to_vec(),
    )
    .encode_to_vec()
}

pub fn control_bytes(device: &DeviceKey, frames: Vec<ControlFrame>) -> Vec<u8> {
    DeviceMessage::new(
        DeviceMessageType::Control,
        digest_for(device),
        "abc",
        ControlMessage { frames }.encode_to_vec(),
    )
    .encode_to_vec()
}

/// Subscriber that replays a fixed list of messages, then fails every read
pub struct ReplaySubscriber {
    messages: parking_lot::Mutex<std::collections::VecDeque<Vec<u8>>>,
}

impl ReplaySubscriber {
    pub fn new(messages: Vec<Vec<u8>>) -> Self {
        Self {
            messages: parking_lot::Mutex::new(messages.into()),
        }
    }
}

#[async_trait::async_trait]
impl crate::transport::Subscriber for ReplaySubscriber {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn read_into(&self, sink: &mut bytes::BytesMut) -> anyhow::Result<()> {
        let next = self.messages.lock().pop_front();
        match next {
            Some(message) => {
                sink.extend_from_slice(&message);
                Ok(())
            }
            None => Err(anyhow::anyhow!("connection reset")),
        }
    }

    async fn preregister(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
