// Point-to-point push transport toward connected clients.

use async_trait::async_trait;
use thiserror::Error;

/// Why a push to a single connection failed.
#[derive(Debug, Error)]
pub enum PushError {
    /// The endpoint no longer exists. Terminal: the registration behind this
    /// handle should be pruned so future broadcasts skip it.
    #[error("connection is gone")]
    Gone,

    /// Anything else (network, throttling, 5xx). Not retried within a
    /// broadcast; the next event for the draft reaches the target anyway via
    /// its roster snapshot.
    #[error("transient push failure: {0}")]
    Transient(String),
}

/// One-way delivery of an opaque payload to a single connection handle.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), PushError>;
}

/// Production transport: POSTs the payload to the push gateway that owns the
/// client sockets, at `{endpoint}/connections/{connection_id}`.
///
/// The gateway answers 410 for a connection it no longer holds; that maps to
/// [`PushError::Gone`]. The endpoint URL is configuration (`ENDPOINT`),
/// validated at startup, so a missing endpoint is never a per-call error.
pub struct GatewayTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl GatewayTransport {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!("{}/connections/{connection_id}", self.endpoint)
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), PushError> {
        let response = self
            .client
            .post(self.connection_url(connection_id))
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| PushError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::GONE {
            Err(PushError::Gone)
        } else {
            Err(PushError::Transient(format!(
                "push gateway returned {status} for {connection_id}"
            )))
        }
    }
}
