//! Output device abstraction
//!
//! The executor only needs two capabilities from the physical light: set a
//! color and release the hardware. [`StateLogger`] is the stand-in used when
//! no hardware is attached; it logs every state it receives.

use anyhow::Result;
use async_trait::async_trait;
use beacon_shared::ColorState;
use tracing::debug;

/// A controllable color output
#[async_trait]
pub trait Device: Send + Sync {
    /// Apply a color state
    async fn set_state(&self, state: ColorState) -> Result<()>;

    /// Release the device
    async fn close(&self);
}

/// Device that logs states instead of driving hardware
#[derive(Debug, Default)]
pub struct StateLogger;

#[async_trait]
impl Device for StateLogger {
    async fn set_state(&self, state: ColorState) -> Result<()> {
        debug!(
            "[STATE] received rgb({},{},{}) fade={:?}",
            state.red, state.green, state.blue, state.fade
        );
        Ok(())
    }

    async fn close(&self) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_logger_accepts_states() {
        let device = StateLogger;
        assert!(device.set_state(ColorState::rgb(1, 2, 3)).await.is_ok());
        device.close().await;
    }
}
