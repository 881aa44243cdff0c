//! Server registration learned from welcome messages

use beacon_shared::security::ServerKey;
use parking_lot::RwLock;
use std::sync::Arc;

/// Server identity for this device
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub server_key: ServerKey,
    pub device_id: String,
}

/// Holds the current registration as an immutable snapshot
///
/// Each welcome replaces the snapshot wholesale; readers keep whatever `Arc`
/// they already hold.
#[derive(Debug, Default)]
pub struct RegistrationCell {
    current: RwLock<Option<Arc<Registration>>>,
}

impl RegistrationCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current registration
    pub fn install(&self, registration: Registration) -> Arc<Registration> {
        let snapshot = Arc::new(registration);
        *self.current.write() = Some(snapshot.clone());
        snapshot
    }

    /// Current registration, if a welcome has been accepted
    pub fn snapshot(&self) -> Option<Arc<Registration>> {
        self.current.read().clone()
    }
}
