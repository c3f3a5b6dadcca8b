//! Dispatch gateway: provider call, classification and attempt logging.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::metrics::DispatchMetrics;
use crate::store::{DeliveryAttempt, NewDeliveryAttempt, StorageBackend, StorageError};

use super::classify::{classify, MalformedResponse};
use super::transport::{HttpTransport, ProviderRequest, TransportError};

/// Fully rendered message ready for the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub from_email: String,
    pub from_name: String,
    pub subject: String,
    pub to_email: String,
    pub html: String,
    pub text: String,
}

/// Dispatch error type.
///
/// None of these variants leave a delivery attempt behind, except
/// `Storage`, which means the attempt happened but could not be logged.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),

    #[error("Dispatch cancelled")]
    Cancelled,

    #[error("Failed to record delivery attempt: {0}")]
    Storage(#[from] StorageError),
}

/// Sends messages to the provider and records each classified outcome.
pub struct DispatchGateway {
    transport: Arc<dyn HttpTransport>,
    backend: Arc<dyn StorageBackend>,
    send_url: String,
    api_key: String,
}

impl DispatchGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        backend: Arc<dyn StorageBackend>,
        config: &ProviderConfig,
    ) -> Self {
        Self {
            transport,
            backend,
            send_url: config.send_url(),
            api_key: config.api_key.clone(),
        }
    }

    fn request_for(&self, email: &OutgoingEmail) -> ProviderRequest {
        ProviderRequest {
            url: self.send_url.clone(),
            api_key: self.api_key.clone(),
            fields: vec![
                ("from", email.from_email.clone()),
                ("name", email.from_name.clone()),
                ("subject", email.subject.clone()),
                ("to", email.to_email.clone()),
                ("html", email.html.clone()),
                ("text", email.text.clone()),
            ],
        }
    }

    /// Send `email` and persist the classified attempt.
    ///
    /// Cancelling `cancel` before the provider answers aborts the call and
    /// records nothing. Once a response is in hand the attempt is always
    /// recorded.
    #[tracing::instrument(
        name = "dispatch.send",
        skip(self, email, cancel),
        fields(from = %email.from_email, to = %email.to_email)
    )]
    pub async fn dispatch(
        &self,
        email: OutgoingEmail,
        cancel: &CancellationToken,
    ) -> Result<DeliveryAttempt, DispatchError> {
        let request = self.request_for(&email);
        let started = Instant::now();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Dispatch cancelled before provider responded");
                return Err(DispatchError::Cancelled);
            }
            result = self.transport.post_multipart(request) => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                DispatchMetrics::record_transport_error();
                tracing::warn!(error = %e, "Email provider unreachable");
                return Err(e.into());
            }
        };
        DispatchMetrics::record_latency(started.elapsed());

        let outcome = match classify(response.status, &response.body) {
            Ok(outcome) => outcome,
            Err(e) => {
                DispatchMetrics::record_transport_error();
                tracing::warn!(
                    http_status = response.status,
                    error = %e,
                    "Provider response could not be classified"
                );
                return Err(e.into());
            }
        };

        let attempt = NewDeliveryAttempt {
            from_email: email.from_email,
            from_name: email.from_name,
            subject: email.subject,
            to_email: email.to_email,
            html: email.html,
            text: email.text,
            status: outcome.status,
            message_id: outcome.message_id,
            error_detail: outcome.error_detail,
            created_at: Utc::now(),
        };

        let recorded = self.backend.insert_delivery_attempt(attempt).await?;
        DispatchMetrics::record_attempt(recorded.status);

        tracing::info!(
            attempt_id = recorded.id,
            http_status = response.status,
            status = %recorded.status,
            message_id = recorded.message_id.as_deref().unwrap_or(""),
            "Delivery attempt recorded"
        );

        Ok(recorded)
    }
}
