//! Command processing for the device client
//!
//! This module handles:
//! - Authenticating inbound envelopes against the device key
//! - Tracking the server registration learned from welcome messages
//! - Running control sequences on the device, preempting older ones
//! - Emitting feedback for every applied frame

mod executor;
mod registration;
mod router;

pub use executor::{ControlExecutor, ExecutionOutcome, ExecutionSlot, ExecutionToken};
pub use registration::{Registration, RegistrationCell};
pub use router::CommandRouter;
