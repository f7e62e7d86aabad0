//! Transport collaborator and the HTTP relay implementation
//!
//! The relay forwards opaque routable messages to a vehicle and returns the
//! vehicle's answer. Messages travel base64 encoded inside a small JSON body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use vcmd_protocol::{RoutableMessage, TransportError};

/// Default relay endpoint
pub const DEFAULT_RELAY_URL: &str = "https://fleet-api.prd.na.vn.cloud.tesla.com";

/// Performs one request/response round trip with a vehicle
#[async_trait]
pub trait VehicleTransport: Send + Sync {
    /// Deliver `message` to the vehicle identified by `vin`
    async fn send(
        &self,
        vin: &str,
        message: &RoutableMessage,
        access_token: &str,
    ) -> Result<RoutableMessage, TransportError>;
}

#[derive(Debug, Serialize)]
struct SignedCommandRequest {
    routable_message: String,
}

#[derive(Debug, Deserialize)]
struct SignedCommandResponse {
    response: String,
}

/// Relay transport over HTTPS
#[derive(Debug, Clone)]
pub struct HttpRelayTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelayTransport {
    /// Create a transport for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Network {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// URL of the signed command endpoint for `vin`
    pub fn endpoint(&self, vin: &str) -> String {
        format!(
            "{}/api/1/vehicles/{}/signed_command",
            self.base_url.trim_end_matches('/'),
            vin
        )
    }
}

fn parse_error_body(text: String) -> Option<serde_json::Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}

#[async_trait]
impl VehicleTransport for HttpRelayTransport {
    async fn send(
        &self,
        vin: &str,
        message: &RoutableMessage,
        access_token: &str,
    ) -> Result<RoutableMessage, TransportError> {
        let url = self.endpoint(vin);
        let request = SignedCommandRequest {
            routable_message: message.to_base64(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network {
                        message: format!("Failed to reach relay: {e}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(vin, status = status.as_u16(), "Relay rejected signed command");
            return Err(TransportError::http(status.as_u16(), parse_error_body(text)));
        }

        let body: SignedCommandResponse =
            response
                .json()
                .await
                .map_err(|e| TransportError::InvalidResponse {
                    message: format!("Failed to parse relay response: {e}"),
                })?;

        RoutableMessage::from_base64(&body.response).map_err(|e| TransportError::InvalidResponse {
            message: e.to_string(),
        })
    }
}
