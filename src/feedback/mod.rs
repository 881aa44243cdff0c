//! Feedback produced by control execution and published to the api
//!
//! This module handles:
//! - The feedback items executors push onto the feedback queue
//! - Sealing state reports with the registration's server key
//! - Posting sealed reports to the feedback endpoint

mod publisher;

pub use publisher::FeedbackPublisher;

use crate::command::Registration;
use beacon_shared::ColorState;
use std::sync::Arc;

/// Outcome of applying one frame
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackKind {
    /// The device accepted this state
    State(ColorState),
    /// The device rejected a frame; the sequence was aborted
    Error(String),
}

/// One item on the feedback queue
#[derive(Debug, Clone)]
pub struct Feedback {
    /// Registration active when the feedback was produced
    pub registration: Arc<Registration>,
    pub kind: FeedbackKind,
}

impl Feedback {
    pub fn state(registration: Arc<Registration>, state: ColorState) -> Self {
        Self {
            registration,
            kind: FeedbackKind::State(state),
        }
    }

    pub fn error(registration: Arc<Registration>, error: impl ToString) -> Self {
        Self {
            registration,
            kind: FeedbackKind::Error(error.to_string()),
        }
    }
}
