// Client core and request plumbing
//
// One client per process, shared across tasks. The auth token is the only
// mutable state; it sits behind a mutex together with the stored
// credentials, and refresh attempts additionally serialize on a dedicated
// lock so concurrent 401s trigger a single refresh.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

use crate::error::{RecordsError, Result};

pub(crate) struct AuthState {
    pub token: Option<String>,
    pub collection: Option<String>,
    pub identity: Option<String>,
    pub password: Option<String>,
}

/// Typed HTTP client for the records app.
pub struct RecordsClient {
    pub(crate) base_url: String,
    pub(crate) http: reqwest::Client,
    pub(crate) auth: Mutex<AuthState>,
    pub(crate) refresh_lock: Mutex<()>,
    pub(crate) health_checked: OnceCell<()>,
    pub(crate) health_retry_count: u32,
    pub(crate) health_retry_delay: Duration,
}

impl RecordsClient {
    /// Create a client against `base_url`, optionally pre-authenticated
    /// with an existing token.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            auth: Mutex::new(AuthState {
                token: auth_token,
                collection: None,
                identity: None,
                password: None,
            }),
            refresh_lock: Mutex::new(()),
            health_checked: OnceCell::new(),
            health_retry_count: 5,
            health_retry_delay: Duration::from_secs(2),
        }
    }

    /// Override the initial health probe's retry schedule.
    pub fn with_health_retry(mut self, count: u32, delay: Duration) -> Self {
        self.health_retry_count = count;
        self.health_retry_delay = delay;
        self
    }

    /// Store credentials used for re-authentication after token expiry.
    pub async fn set_auth_credentials(&self, collection: &str, identity: &str, password: &str) {
        let mut auth = self.auth.lock().await;
        auth.collection = Some(collection.to_string());
        auth.identity = Some(identity.to_string());
        auth.password = Some(password.to_string());
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Single request attempt with the current auth token.
    pub(crate) async fn send_once(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .request(method, self.url(endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(token) = self.auth.lock().await.token.clone() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    /// Request with the standard contract: initial health probe (once per
    /// client), then a single refresh-and-retry on 401.
    pub(crate) async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        self.ensure_healthy().await?;

        let response = self.send_once(method.clone(), endpoint, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(endpoint = %endpoint, "Token expired, attempting refresh");
            self.try_refresh_or_reauth().await?;
            let retried = self.send_once(method, endpoint, body).await?;
            return Self::check_status(retried).await;
        }

        Self::check_status(response).await
    }

    /// JSON request returning the decoded response body.
    pub(crate) async fn send_json(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let response = self.send(method, endpoint, body).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecordsError::status(status.as_u16(), body));
        }
        Ok(response)
    }
}
