//! Outbound HTTP delivery of queued records.
//!
//! The [`Transport`] trait is the seam between the upload dispatcher and
//! the network. [`HttpTransport`] posts a `multipart/form-data` body with
//! reqwest; [`MockTransport`](crate::mock::MockTransport) is used in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Serialize;
use tracing::debug;

/// A single upload attempt, built by the dispatcher from the queue head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRequest {
    /// Sequence number identifying this attempt. Completions carrying a
    /// different number are ignored.
    pub seq: u64,
    /// Key of the record being sent.
    pub key: String,
    /// Destination URL.
    pub url: String,
    /// Multipart fields in send order: data, optional signature, extras.
    pub fields: Vec<(String, String)>,
}

impl UploadRequest {
    /// Value of the first field named `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Errors from an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or no response arrived.
    #[error("Upload request failed: {0}")]
    Request(String),
    /// The endpoint answered with a non-2xx status.
    #[error("Endpoint returned error {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends upload requests to an endpoint.
///
/// Implementations report the outcome of exactly one attempt; retry policy
/// belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Only a 2xx response counts as delivered.
    async fn post(&self, request: &UploadRequest) -> Result<(), TransportError>;
}

/// Multipart POST over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with a per-request timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &UploadRequest) -> Result<(), TransportError> {
        let form = request
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });

        let response = self
            .client
            .post(&request.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            "Delivered record {} to {} ({})",
            request.key, request.url, status
        );
        Ok(())
    }
}
