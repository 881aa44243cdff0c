//! Feedback publisher - seals state reports and posts them to the api

use super::{Feedback, FeedbackKind};
use crate::command::Registration;
use crate::transport;
use beacon_shared::codec::{self, MessageError};
use beacon_shared::{api, ColorState};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Unable to build report: {0}")]
    Report(#[from] MessageError),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid response from server: {0}")]
    Status(StatusCode),
}

/// Consumes the feedback queue and posts sealed reports
pub struct FeedbackPublisher {
    client: Client,
    endpoint: Url,
}

impl FeedbackPublisher {
    /// Create a publisher posting to `<api_home>/feedback`
    pub fn new(api_home: &Url) -> Self {
        Self {
            client: Client::new(),
            endpoint: transport::endpoint(api_home, api::FEEDBACK_ENDPOINT),
        }
    }

    /// Drain the feedback queue until every sender is gone
    pub async fn run(self, mut stream: mpsc::Receiver<Feedback>) {
        info!("[FEEDBACK] Publisher starting: {}", self.endpoint);

        while let Some(feedback) = stream.recv().await {
            debug!("[FEEDBACK] Received {:?}", feedback.kind);

            match &feedback.kind {
                FeedbackKind::State(state) => {
                    match self.publish_report(state, &feedback.registration).await {
                        Ok(()) => info!("[FEEDBACK] Published report"),
                        Err(e) => error!("[FEEDBACK] Unable to publish report: {}", e),
                    }
                }
                FeedbackKind::Error(reason) => {
                    // Device errors are not reported to the api yet
                    warn!("[FEEDBACK] Device error not published: {}", reason);
                }
            }
        }

        info!("[FEEDBACK] Feedback stream closed, publisher stopping");
    }

    async fn publish_report(
        &self,
        state: &ColorState,
        registration: &Registration,
    ) -> Result<(), PublishError> {
        let body = codec::seal_report(state, &registration.server_key, &registration.device_id)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, api::FEEDBACK_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(PublishError::Status(response.status()));
        }

        Ok(())
    }
}
