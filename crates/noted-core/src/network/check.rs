//! Connectivity checks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::gateway::GatewayError;

#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    /// Whether the remote API is reachable right now.
    async fn is_reachable(&self) -> bool;
}

/// Checks `GET {api}/api/health`; any failure counts as offline.
#[derive(Debug, Clone)]
pub struct HttpHealthCheck {
    url: String,
    client: Client,
}

impl HttpHealthCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .map_err(GatewayError::from)?,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.health_url(), config.health_timeout())
    }
}

#[async_trait]
impl ConnectivityCheck for HttpHealthCheck {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!("Health check failed: {}", error);
                false
            }
        }
    }
}
