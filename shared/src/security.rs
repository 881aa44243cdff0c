//! Device and server key handling
//!
//! Inbound messages are authenticated by decrypting their digest with the
//! device private key. Outbound reports are sealed by encrypting the report
//! hash with the server public key learned from the welcome message. Both use
//! RSA-OAEP with SHA-256 and a fixed label per direction.
//!
//! Sealing is encryption toward the server; it does not prove which device
//! produced a report.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// OAEP label used by the server when encrypting digests for this device
pub const AUTHENTICATION_LABEL: &str = "beacon";

/// OAEP label used when sealing report digests for the server
pub const REPORT_LABEL: &str = "report";

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Unable to read key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Unable to export public key: {0}")]
    Export(String),

    #[error("Invalid public key format: {0}")]
    InvalidPublicKeyFormat(String),

    #[error("Unable to decrypt digest")]
    Decrypt,

    #[error("Unable to encrypt digest: {0}")]
    Encrypt(String),
}

/// RSA-OAEP(SHA-256) encrypt `data` for the holder of `key`
pub fn encrypt_oaep(key: &RsaPublicKey, label: &str, data: &[u8]) -> Result<Vec<u8>, KeyError> {
    let padding = Oaep::new_with_label::<Sha256, _>(label);
    key.encrypt(&mut rand::thread_rng(), padding, data)
        .map_err(|e| KeyError::Encrypt(e.to_string()))
}

/// The device's own keypair
pub struct DeviceKey {
    private_key: RsaPrivateKey,
}

impl DeviceKey {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }

    /// Load a PEM encoded private key (PKCS#1, falling back to PKCS#8)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self::new(private_key))
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// Hex encoded DER (SubjectPublicKeyInfo) public key, handed to the server
    /// during registration
    pub fn shared_secret(&self) -> Result<String, KeyError> {
        let der = self
            .public_key()
            .to_public_key_der()
            .map_err(|e| KeyError::Export(e.to_string()))?;

        Ok(hex::encode(der.as_bytes()))
    }

    /// Decrypt a digest produced for this device
    ///
    /// Any failure (wrong key, corruption, foreign ciphertext) collapses to
    /// [`KeyError::Decrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let padding = Oaep::new_with_label::<Sha256, _>(AUTHENTICATION_LABEL);
        self.private_key
            .decrypt(padding, ciphertext)
            .map_err(|_| KeyError::Decrypt)
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKey").finish_non_exhaustive()
    }
}

/// Server public key learned from a welcome message
#[derive(Debug, Clone, PartialEq)]
pub struct ServerKey {
    key: RsaPublicKey,
}

impl ServerKey {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Parse the hex(DER SPKI) shared secret carried by a welcome message.
    /// Only RSA keys are accepted.
    pub fn from_shared_secret(shared_secret: &str) -> Result<Self, KeyError> {
        let der = hex::decode(shared_secret)
            .map_err(|e| KeyError::InvalidPublicKeyFormat(e.to_string()))?;

        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| KeyError::InvalidPublicKeyFormat(e.to_string()))?;

        Ok(Self::new(key))
    }

    pub fn to_der(&self) -> Result<Vec<u8>, KeyError> {
        let der = self
            .key
            .to_public_key_der()
            .map_err(|e| KeyError::Export(e.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }

    pub fn as_rsa(&self) -> &RsaPublicKey {
        &self.key
    }

    /// Hash `payload` with SHA-256 and encrypt the hash for the server
    pub fn seal_digest(&self, payload: &[u8]) -> Result<Vec<u8>, KeyError> {
        let digest = Sha256::digest(payload);
        encrypt_oaep(&self.key, REPORT_LABEL, &digest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs1::LineEnding;

    pub(crate) fn test_private_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("key generation failed")
    }

    #[test]
    fn test_shared_secret_roundtrip() {
        let device = DeviceKey::new(test_private_key());
        let secret = device.shared_secret().expect("export failed");

        let server = ServerKey::from_shared_secret(&secret).expect("parse failed");
        assert_eq!(server.as_rsa(), &device.public_key());
        assert_eq!(hex::encode(server.to_der().unwrap()), secret);
    }

    #[test]
    fn test_decrypt_accepts_digest_for_device() {
        let device = DeviceKey::new(test_private_key());
        let digest = encrypt_oaep(&device.public_key(), AUTHENTICATION_LABEL, b"hello").unwrap();

        assert_eq!(device.decrypt(&digest).unwrap(), b"hello");
    }

    #[test]
    fn test_decrypt_rejects_foreign_ciphertext() {
        let device = DeviceKey::new(test_private_key());
        let other = DeviceKey::new(test_private_key());
        let digest = encrypt_oaep(&other.public_key(), AUTHENTICATION_LABEL, b"hello").unwrap();

        assert!(matches!(device.decrypt(&digest), Err(KeyError::Decrypt)));
    }

    #[test]
    fn test_decrypt_rejects_wrong_label() {
        let device = DeviceKey::new(test_private_key());
        let digest = encrypt_oaep(&device.public_key(), REPORT_LABEL, b"hello").unwrap();

        assert!(matches!(device.decrypt(&digest), Err(KeyError::Decrypt)));
    }

    #[test]
    fn test_pem_loading() {
        let private_key = test_private_key();
        let pem = private_key.to_pkcs1_pem(LineEnding::LF).unwrap();

        let device = DeviceKey::from_pem(&pem).expect("pem parse failed");
        assert_eq!(device.public_key(), private_key.to_public_key());

        assert!(matches!(
            DeviceKey::from_pem("not a key"),
            Err(KeyError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_invalid_shared_secret() {
        assert!(matches!(
            ServerKey::from_shared_secret("zz"),
            Err(KeyError::InvalidPublicKeyFormat(_))
        ));
        assert!(matches!(
            ServerKey::from_shared_secret("deadbeef"),
            Err(KeyError::InvalidPublicKeyFormat(_))
        ));
    }

    #[test]
    fn test_seal_digest_opens_with_server_private_key() {
        let server_private = test_private_key();
        let server = ServerKey::new(server_private.to_public_key());

        let sealed = server.seal_digest(b"report-bytes").unwrap();
        let padding = Oaep::new_with_label::<Sha256, _>(REPORT_LABEL);
        let opened = server_private.decrypt(padding, &sealed).unwrap();

        assert_eq!(opened, Sha256::digest(b"report-bytes").to_vec());
    }
}
