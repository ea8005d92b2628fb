//! Loopback client for the privileged API.
//!
//! The matchmaker and the operator CLI both talk to the control plane the
//! same way external callers do: over HTTP with the bearer key, fetching a
//! fresh CSRF token before each state-changing call. Neither holds a direct
//! reference to fleet state.

use std::time::Duration;

use reqwest::StatusCode;

use crate::{
    security,
    server::{CsrfTokenResponse, ListServersResponse, StartServerResponse},
    LudocoreError, LudocoreResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Overall request timeout; generous because a start may sit behind an image
/// build.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// HTTP client for the privileged API.
#[derive(Debug, Clone)]
pub struct ControlClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ControlClient {
    /// Creates a client against `base_url`, loading the API key from its
    /// persisted location.
    pub async fn connect(base_url: impl Into<String>) -> LudocoreResult<Self> {
        let api_key = security::load_api_key().await?;
        Ok(Self::with_api_key(base_url, api_key))
    }

    /// Creates a client with an explicit API key.
    pub fn with_api_key(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::builder()
                .timeout(CLIENT_TIMEOUT)
                .build()
                .expect("reqwest client construction cannot fail with static options"),
        }
    }

    /// Checks that the API server is up.
    pub async fn health_check(&self) -> LudocoreResult<()> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(LudocoreError::Unavailable(format!(
                "API server returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Starts a new instance, optionally on an explicit port.
    pub async fn start_server(&self, port: Option<u16>) -> LudocoreResult<StartServerResponse> {
        let csrf = self.fetch_csrf_token().await?;
        let resp = self
            .http
            .post(format!("{}/api/v1/servers/start", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-CSRF-Token", csrf)
            .json(&serde_json::json!({
                "port": port.map(|p| p.to_string()),
            }))
            .send()
            .await?;

        if resp.status() != StatusCode::CREATED {
            return Err(remote_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Stops the named instance.
    pub async fn stop_server(&self, name: &str) -> LudocoreResult<()> {
        let csrf = self.fetch_csrf_token().await?;
        let resp = self
            .http
            .delete(format!("{}/api/v1/servers/{}", self.base_url, name))
            .bearer_auth(&self.api_key)
            .header("X-CSRF-Token", csrf)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(remote_error(resp).await);
        }
        Ok(())
    }

    /// Lists live instances with their occupancy.
    pub async fn list_servers(&self) -> LudocoreResult<ListServersResponse> {
        let resp = self
            .http
            .get(format!("{}/api/v1/servers", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(remote_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Fetches the bounded log tail for the named instance.
    pub async fn server_logs(&self, name: &str) -> LudocoreResult<String> {
        let resp = self
            .http
            .get(format!("{}/api/v1/servers/{}/logs", self.base_url, name))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(remote_error(resp).await);
        }

        let body: crate::server::ServerLogsResponse = resp.json().await?;
        Ok(body.logs)
    }

    /// Fetches a single-use CSRF token for the next state-changing request.
    async fn fetch_csrf_token(&self) -> LudocoreResult<String> {
        let resp = self
            .http
            .get(format!("{}/api/v1/csrf-token", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(remote_error(resp).await);
        }

        let body: CsrfTokenResponse = resp.json().await?;
        Ok(body.csrf_token)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn remote_error(resp: reqwest::Response) -> LudocoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    LudocoreError::Runtime(format!("API returned status {}: {}", status, body))
}
