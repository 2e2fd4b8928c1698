//! HTTP client used by the tool registry to reach the bridge server.
//!
//! The relay owns all transport policy: one connection pool per client with
//! a bounded keep-alive count (the bridge admits only one mutating operation
//! at a time, so a large pool would only create contention), and a fixed
//! per-request timeout. Every failure is re-expressed as [`RelayError`], so
//! callers never see a transport exception type.
//!
//! The relay performs no retries. A guard-contention 429 is surfaced to the
//! caller: retry policy belongs to the layer that knows whether the overall
//! operation is idempotent.

use std::time::Duration;

use reqwest::Method;
use thiserror::Error;

use crate::bridge::protocol::{default_base_url, RequestEnvelope, ResponseEnvelope};
use crate::config::BridgeConfig;

/// Normalised failure for every relay call.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    Build {
        /// Description of the failure.
        message: String,
    },

    /// The bridge could not be reached: connection refused, reset, or the
    /// request timed out.
    #[error("cannot connect to the bridge: {message}")]
    Unreachable {
        /// Description of the failure.
        message: String,
    },

    /// The bridge answered with a non-success HTTP status. The response body
    /// text is preserved for diagnostics.
    #[error("bridge request failed ({status}): {body}")]
    Failed {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The bridge answered 2xx but the body was not a response envelope.
    #[error("invalid bridge response: {message}")]
    Invalid {
        /// Description of the decode failure.
        message: String,
    },
}

/// HTTP client for the bridge server.
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// Creates a relay client against the fixed bridge address.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &BridgeConfig) -> Result<Self, RelayError> {
        Self::with_base_url(default_base_url(), config)
    }

    /// Creates a relay client against an explicit base URL. Tests use this
    /// to target ephemeral listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &BridgeConfig,
    ) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_idle_connections)
            .build()
            .map_err(|e| RelayError::Build {
                message: e.to_string(),
            })?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { http, base_url })
    }

    /// The base URL this client targets.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&RequestEnvelope>,
    ) -> Result<ResponseEnvelope, RelayError> {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self.http.request(method, &url);
        if let Some(envelope) = body {
            builder = builder.json(envelope);
        }

        let response = builder.send().await.map_err(normalise)?;
        let status = response.status();
        let text = response.text().await.map_err(normalise)?;

        if !status.is_success() {
            return Err(RelayError::Failed {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| RelayError::Invalid {
            message: e.to_string(),
        })
    }

    /// `GET /api/health`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn health(&self) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::GET, "/api/health", None).await
    }

    /// `GET /api/status`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn status(&self) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::GET, "/api/status", None).await
    }

    /// `GET /api/objects`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn list_objects(&self) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::GET, "/api/objects", None).await
    }

    /// `GET /api/object/{id}`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn get_object(&self, id: &str) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::GET, &format!("/api/object/{id}"), None)
            .await
    }

    /// `POST /api/document`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn create_document(
        &self,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::POST, "/api/document", Some(envelope))
            .await
    }

    /// `POST /api/object`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn create_object(
        &self,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::POST, "/api/object", Some(envelope))
            .await
    }

    /// `PUT /api/object/{id}`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn edit_object(
        &self,
        id: &str,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::PUT, &format!("/api/object/{id}"), Some(envelope))
            .await
    }

    /// `DELETE /api/object/{id}`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn delete_object(&self, id: &str) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::DELETE, &format!("/api/object/{id}"), None)
            .await
    }

    /// `GET /api/view`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn view_info(&self) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::GET, "/api/view", None).await
    }

    /// `POST /api/view`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn capture_view(
        &self,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::POST, "/api/view", Some(envelope)).await
    }

    /// `GET /api/parts`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn list_parts(&self) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::GET, "/api/parts", None).await
    }

    /// `POST /api/part`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn insert_part(
        &self,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::POST, "/api/part", Some(envelope)).await
    }

    /// `POST /api/execute`
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] on transport failure or a non-2xx status.
    pub async fn execute(
        &self,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, RelayError> {
        self.request(Method::POST, "/api/execute", Some(envelope))
            .await
    }
}

fn normalise(error: reqwest::Error) -> RelayError {
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else {
        error.to_string()
    };
    RelayError::Unreachable { message }
}
