// crates/topgun-harness/src/garden.rs
// ============================================================================
// Module: Garden Client
// Description: Minimal container runtime client used during teardown.
// Purpose: Force-destroy containers a worker still holds.
// Dependencies: reqwest
// ============================================================================

//! ## Overview
//! Talks to a worker's container runtime over its plain-HTTP API. Only
//! destroy is needed: teardown discovers handles through the deployed
//! system's own listing API and asks each worker to drop them.

use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;

use crate::error::HarnessError;
use crate::error::HarnessResult;

/// Per-request deadline for runtime calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one worker's container runtime.
#[derive(Debug, Clone)]
pub struct GardenClient {
    address: String,
    http: Client,
}

impl GardenClient {
    /// Creates a client for the runtime listening on `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Http`] when the HTTP client cannot be built.
    pub fn new(address: impl Into<String>) -> HarnessResult<Self> {
        Ok(Self {
            address: address.into(),
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    /// Returns the runtime address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Destroys the container with `handle`. A handle the runtime no longer
    /// knows counts as destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Http`] on transport failure and
    /// [`HarnessError::Remote`] for any other status.
    pub async fn destroy(&self, handle: &str) -> HarnessResult<()> {
        let url = format!("http://{}/containers/{handle}", self.address);
        let response = self.http.delete(&url).send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(HarnessError::Remote {
            endpoint: format!("DELETE {url}"),
            status: status.as_u16(),
            message: body.trim().to_string(),
        })
    }
}
