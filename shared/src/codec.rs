//! Envelope decoding, authentication and report sealing
//!
//! Inbound buffers go through three stages before anything acts on them:
//!
//! ```text
//! bytes -> DeviceMessage (protobuf) -> authentication present
//!       -> digest hex-decodes -> digest decrypts with the device key
//! ```
//!
//! Only once all three pass is the declared message type looked at. The
//! decrypted digest is not compared against the payload hash.

use prost::Message;
use thiserror::Error;

use crate::security::{DeviceKey, KeyError, ServerKey};
use crate::{
    ColorState, ControlMessage, DeviceMessage, DeviceMessageAuthentication, DeviceMessageType,
    FeedbackMessage, FeedbackMessageType, ReportMessage, WelcomeMessage,
};

/// Reasons an inbound message is dropped or an outbound one cannot be built
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Message is missing authentication information")]
    MissingAuthentication,

    #[error("Message digest is not valid hex: {0}")]
    InvalidDigest(#[from] hex::FromHexError),

    #[error("Message failed authentication: {0}")]
    Authentication(#[source] KeyError),

    #[error("Shared secret is not an rsa public key: {0}")]
    InvalidPublicKeyFormat(String),

    #[error("Control message received before any welcome")]
    Unregistered,

    #[error("Unable to seal report digest: {0}")]
    Seal(#[source] KeyError),
}

/// An inbound envelope that passed authentication
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedMessage {
    /// Raw declared type; may name a type this client does not know
    pub raw_type: i32,
    pub device_id: String,
    pub message_digest: String,
    pub payload: Vec<u8>,
}

impl AuthenticatedMessage {
    /// The declared type, or `None` if it is not one this client understands
    pub fn message_type(&self) -> Option<DeviceMessageType> {
        DeviceMessageType::try_from(self.raw_type).ok()
    }

    /// Short digest prefix for log lines
    pub fn digest_prefix(&self) -> &str {
        self.message_digest
            .get(..7)
            .unwrap_or(&self.message_digest)
    }
}

/// Decode the outer envelope without looking at its payload
pub fn decode_envelope(buf: &[u8]) -> Result<DeviceMessage, MessageError> {
    Ok(DeviceMessage::decode(buf)?)
}

/// Decode and authenticate an inbound buffer
pub fn authenticate(buf: &[u8], key: &DeviceKey) -> Result<AuthenticatedMessage, MessageError> {
    let message = decode_envelope(buf)?;

    let DeviceMessageAuthentication {
        message_digest,
        device_id,
    } = message
        .authentication
        .ok_or(MessageError::MissingAuthentication)?;

    let ciphertext = hex::decode(&message_digest)?;
    key.decrypt(&ciphertext)
        .map_err(MessageError::Authentication)?;

    Ok(AuthenticatedMessage {
        raw_type: message.r#type,
        device_id,
        message_digest,
        payload: message.payload,
    })
}

/// Extract the server key from a welcome payload
pub fn decode_welcome(payload: &[u8]) -> Result<ServerKey, MessageError> {
    let welcome = WelcomeMessage::decode(payload)?;

    ServerKey::from_shared_secret(&welcome.shared_secret).map_err(|e| match e {
        KeyError::InvalidPublicKeyFormat(reason) => MessageError::InvalidPublicKeyFormat(reason),
        other => MessageError::InvalidPublicKeyFormat(other.to_string()),
    })
}

pub fn decode_control(payload: &[u8]) -> Result<ControlMessage, MessageError> {
    Ok(ControlMessage::decode(payload)?)
}

/// Build the encoded feedback envelope for an applied state
///
/// The report bytes are hashed and the hash encrypted with the server key;
/// the hex of that ciphertext becomes the envelope's message digest.
pub fn seal_report(
    state: &ColorState,
    server_key: &ServerKey,
    device_id: &str,
) -> Result<Vec<u8>, MessageError> {
    let payload = ReportMessage::from(*state).encode_to_vec();
    let sealed = server_key
        .seal_digest(&payload)
        .map_err(MessageError::Seal)?;

    let feedback = FeedbackMessage {
        r#type: FeedbackMessageType::Report.into(),
        authentication: Some(DeviceMessageAuthentication {
            message_digest: hex::encode(sealed),
            device_id: device_id.to_string(),
        }),
        payload,
    };

    Ok(feedback.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::tests::test_private_key;
    use crate::security::{encrypt_oaep, AUTHENTICATION_LABEL, REPORT_LABEL};
    use rsa::{Oaep, RsaPrivateKey};
    use sha2::{Digest, Sha256};

    fn digest_for(device: &DeviceKey) -> String {
        let ciphertext =
            encrypt_oaep(&device.public_key(), AUTHENTICATION_LABEL, b"digest").unwrap();
        hex::encode(ciphertext)
    }

    #[test]
    fn test_authenticate_valid_message() {
        let device = DeviceKey::new(test_private_key());
        let buf = DeviceMessage::new(
            DeviceMessageType::Control,
            digest_for(&device),
            "abc",
            vec![1, 2, 3],
        )
        .encode_to_vec();

        let message = authenticate(&buf, &device).expect("authentication failed");
        assert_eq!(message.message_type(), Some(DeviceMessageType::Control));
        assert_eq!(message.device_id, "abc");
        assert_eq!(message.payload, vec![1, 2, 3]);
        assert_eq!(message.digest_prefix().len(), 7);
    }

    #[test]
    fn test_malformed_bytes() {
        let device = DeviceKey::new(test_private_key());
        let result = authenticate(&[0xff, 0xff, 0xff], &device);
        assert!(matches!(result, Err(MessageError::Decode(_))));
    }

    #[test]
    fn test_missing_authentication() {
        let device = DeviceKey::new(test_private_key());
        let buf = DeviceMessage {
            r#type: DeviceMessageType::Control.into(),
            authentication: None,
            payload: vec![],
        }
        .encode_to_vec();

        let result = authenticate(&buf, &device);
        assert!(matches!(result, Err(MessageError::MissingAuthentication)));
    }

    #[test]
    fn test_digest_not_hex() {
        let device = DeviceKey::new(test_private_key());
        let buf = DeviceMessage::new(DeviceMessageType::Welcome, "not-hex", "abc", vec![])
            .encode_to_vec();

        let result = authenticate(&buf, &device);
        assert!(matches!(result, Err(MessageError::InvalidDigest(_))));
    }

    #[test]
    fn test_digest_for_another_device() {
        let device = DeviceKey::new(test_private_key());
        let other = DeviceKey::new(test_private_key());
        let buf = DeviceMessage::new(DeviceMessageType::Welcome, digest_for(&other), "abc", vec![])
            .encode_to_vec();

        let result = authenticate(&buf, &device);
        assert!(matches!(result, Err(MessageError::Authentication(_))));
    }

    #[test]
    fn test_unknown_type_still_authenticates() {
        let device = DeviceKey::new(test_private_key());
        let buf = DeviceMessage {
            r#type: 42,
            authentication: Some(DeviceMessageAuthentication {
                message_digest: digest_for(&device),
                device_id: "abc".into(),
            }),
            payload: vec![],
        }
        .encode_to_vec();

        let message = authenticate(&buf, &device).unwrap();
        assert_eq!(message.raw_type, 42);
        assert_eq!(message.message_type(), None);
    }

    #[test]
    fn test_welcome_preserves_key_material() {
        let server_private = test_private_key();
        let server_public = server_private.to_public_key();
        let payload = WelcomeMessage::for_key(&server_public, "abc")
            .unwrap()
            .encode_to_vec();

        let key = decode_welcome(&payload).expect("welcome decode failed");
        assert_eq!(key.as_rsa(), &server_public);
    }

    #[test]
    fn test_welcome_rejects_garbage_secret() {
        let payload = WelcomeMessage {
            device_id: "abc".into(),
            shared_secret: hex::encode(b"not a der key"),
        }
        .encode_to_vec();

        assert!(matches!(
            decode_welcome(&payload),
            Err(MessageError::InvalidPublicKeyFormat(_))
        ));
    }

    #[test]
    fn test_seal_report_envelope() {
        let server_private: RsaPrivateKey = test_private_key();
        let server_key = ServerKey::new(server_private.to_public_key());

        let bytes = seal_report(&ColorState::rgb(10, 20, 30), &server_key, "abc").unwrap();
        let feedback = FeedbackMessage::decode(bytes.as_slice()).unwrap();
        assert_eq!(feedback.r#type, i32::from(FeedbackMessageType::Report));

        let report = ReportMessage::decode(feedback.payload.as_slice()).unwrap();
        assert_eq!((report.red, report.green, report.blue), (10, 20, 30));

        let auth = feedback.authentication.unwrap();
        assert_eq!(auth.device_id, "abc");

        let sealed = hex::decode(auth.message_digest).unwrap();
        let padding = Oaep::new_with_label::<Sha256, _>(REPORT_LABEL);
        let opened = server_private.decrypt(padding, &sealed).unwrap();
        assert_eq!(opened, Sha256::digest(&feedback.payload).to_vec());
    }
}
