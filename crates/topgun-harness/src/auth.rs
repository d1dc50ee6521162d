// crates/topgun-harness/src/auth.rs
// ============================================================================
// Module: Auth Client
// Description: Password-grant token exchange and authenticated API access.
// Purpose: Prove the deployed system is reachable and query its live state.
// Dependencies: reqwest, serde, url
// ============================================================================

//! ## Overview
//! [`AuthClient::fetch_token`] posts a password grant to `{base}/sky/token`
//! using the CLI's fixed client credentials. [`AuthClient::build_client`]
//! composes a fresh exchange with a transport that injects the bearer token
//! on every request.
//!
//! Invariants:
//! - Tokens are never cached; every call performs a new exchange.
//! - Certificate verification is disabled. This client only ever talks to
//!   throwaway test deployments with self-signed certificates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;
use std::time::SystemTime;

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::HarnessError;
use crate::error::HarnessResult;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// OAuth client identifier used by the CLI.
pub const CLIENT_ID: &str = "fly";

/// OAuth client secret used by the CLI.
pub const CLIENT_SECRET: &str = "Zmx5";

/// Scopes requested on every exchange.
pub const TOKEN_SCOPES: &str = "openid profile email federated:id";

/// Token endpoint path.
const TOKEN_PATH: &str = "/sky/token";

/// Team whose containers teardown inspects.
pub const MAIN_TEAM: &str = "main";

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Token
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Bearer credential returned by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    access_token: String,
    token_type: String,
    expires_at: Option<SystemTime>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Returns the raw access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the token type reported by the server.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Returns when the token expires, if the server said.
    #[must_use]
    pub const fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Returns true once the reported expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= SystemTime::now())
    }

    /// Renders the `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// ============================================================================
// SECTION: API Types
// ============================================================================

/// Worker as reported by `/api/v1/workers`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Worker {
    /// Worker name.
    pub name: String,
    /// Container runtime address (`host:port`).
    #[serde(default, rename = "addr")]
    pub garden_addr: String,
    /// Volume manager URL.
    #[serde(default)]
    pub baggageclaim_url: String,
    /// Lifecycle state (`running`, `landing`, `stalled`, ...).
    #[serde(default)]
    pub state: String,
    /// Containers currently placed on the worker.
    #[serde(default)]
    pub active_containers: u64,
    /// Owning team for team workers.
    #[serde(default)]
    pub team: String,
}

/// Container as reported by `/api/v1/teams/{team}/containers`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Container {
    /// Container handle.
    pub id: String,
    /// Worker hosting the container.
    #[serde(default)]
    pub worker_name: String,
    /// Container kind (`check`, `get`, `task`, ...).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Pipeline owning the container.
    #[serde(default)]
    pub pipeline_name: Option<String>,
    /// Job owning the container.
    #[serde(default)]
    pub job_name: Option<String>,
    /// Build owning the container.
    #[serde(default)]
    pub build_name: Option<String>,
}

// ============================================================================
// SECTION: Auth Client
// ============================================================================

/// Performs token exchanges against a deployment.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
}

impl AuthClient {
    /// Creates a client that trusts self-signed deployment certificates.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Http`] when the HTTP client cannot be built.
    pub fn new() -> HarnessResult<Self> {
        Ok(Self {
            http: insecure_builder().build()?,
        })
    }

    /// Exchanges credentials for a fresh token.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Authentication`] carrying the HTTP status when
    /// the server rejects the grant, or the network cause when it is
    /// unreachable. Returns [`HarnessError::Config`] for a malformed base URL.
    pub async fn fetch_token(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> HarnessResult<Token> {
        let url = endpoint(base_url, TOKEN_PATH)?;
        let form = [
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("scope", TOKEN_SCOPES),
        ];
        let response = self
            .http
            .post(url)
            .basic_auth(CLIENT_ID, Some(CLIENT_SECRET))
            .form(&form)
            .send()
            .await
            .map_err(|err| HarnessError::Authentication {
                status: None,
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarnessError::Authentication {
                status: Some(status.as_u16()),
                message: body.trim().to_string(),
            });
        }
        let payload: TokenResponse =
            response.json().await.map_err(|err| HarnessError::Authentication {
                status: Some(status.as_u16()),
                message: format!("malformed token response: {err}"),
            })?;
        Ok(Token {
            access_token: payload.access_token,
            token_type: payload.token_type,
            expires_at: payload
                .expires_in
                .and_then(|secs| SystemTime::now().checked_add(Duration::from_secs(secs))),
        })
    }

    /// Exchanges credentials and returns a client that sends the token on
    /// every request.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`AuthClient::fetch_token`]; no client is built
    /// when the exchange fails.
    pub async fn build_client(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> HarnessResult<AuthenticatedClient> {
        let token = self.fetch_token(base_url, username, password).await?;
        AuthenticatedClient::new(base_url, token)
    }
}

// ============================================================================
// SECTION: Authenticated Client
// ============================================================================

/// HTTP client bound to one deployment and one token.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    base_url: String,
    token: Token,
    http: Client,
}

impl AuthenticatedClient {
    /// Wraps `token` for requests against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when the token is not a valid header
    /// value, or [`HarnessError::Http`] when the client cannot be built.
    pub fn new(base_url: &str, token: Token) -> HarnessResult<Self> {
        let mut bearer = HeaderValue::from_str(&token.authorization())
            .map_err(|_| HarnessError::Config("access token is not a valid header".to_string()))?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http: insecure_builder().default_headers(headers).build()?,
        })
    }

    /// Returns the deployment base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the token the client authenticates with.
    #[must_use]
    pub const fn token(&self) -> &Token {
        &self.token
    }

    /// Fetches and decodes a JSON API resource.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Http`] on transport failures or non-2xx status,
    /// and [`HarnessError::Parse`] when the body does not decode.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> HarnessResult<T> {
        let url = endpoint(&self.base_url, path)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| HarnessError::Parse(format!("{path}: {err}")))
    }

    /// Lists every registered worker.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::get_json`].
    pub async fn list_workers(&self) -> HarnessResult<Vec<Worker>> {
        self.get_json("/api/v1/workers").await
    }

    /// Lists the containers visible to a team.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::get_json`].
    pub async fn list_containers(&self, team: &str) -> HarnessResult<Vec<Container>> {
        self.get_json(&format!("/api/v1/teams/{team}/containers")).await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn insecure_builder() -> reqwest::ClientBuilder {
    Client::builder().danger_accept_invalid_certs(true).timeout(REQUEST_TIMEOUT)
}

/// Joins `path` onto `base_url`, keeping any base path prefix.
fn endpoint(base_url: &str, path: &str) -> HarnessResult<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|err| HarnessError::Config(format!("invalid url {joined}: {err}")))
}
