//! Connection management for the api subscription
//!
//! This module handles:
//! - The read loop feeding the command queue
//! - Bounded retry with reconnection and re-registration
//! - Orderly shutdown of the command and feedback queues
//! - Heartbeat keepalive

pub mod heartbeat;
mod supervisor;

pub use heartbeat::HeartbeatConfig;
pub use supervisor::{Supervisor, SupervisorConfig};
