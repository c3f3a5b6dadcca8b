//! HTTP transport used to reach the email provider.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::Form;
use thiserror::Error;

use crate::config::ProviderConfig;

/// Failure to complete an HTTP round trip.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Email provider timed out")]
    Timeout,

    #[error("Email provider unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Unavailable(e.to_string())
        }
    }
}

/// A multipart POST to the provider.
#[derive(Clone)]
pub struct ProviderRequest {
    pub url: String,

    /// Sent verbatim in the `Authorization` header
    pub api_key: String,

    /// Form fields in submission order
    pub fields: Vec<(&'static str, String)>,
}

impl ProviderRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(|(name, _)| *name).collect();
        f.debug_struct("ProviderRequest")
            .field("url", &self.url)
            .field("api_key", &"***")
            .field("fields", &names)
            .finish()
    }
}

/// Raw provider answer, before classification.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends provider requests.
///
/// Returns any HTTP status as `Ok`; only failures to get a response at
/// all are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_multipart(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, TransportError>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, TransportError> {
        Self::new(Duration::from_secs(config.timeout_seconds))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_multipart(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, TransportError> {
        let form = request
            .fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        let response = self
            .client
            .post(&request.url)
            .header(AUTHORIZATION, request.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(ProviderResponse { status, body })
    }
}
