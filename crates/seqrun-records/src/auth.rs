// Authentication against the records app
//
// Tokens come from password auth, refresh, or impersonation. Expiry is
// handled lazily: the first 401 triggers one refresh (falling back to a
// fresh password login), then the original request is retried once.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::RecordsClient;
use crate::error::{RecordsError, Result};

/// Response of the auth endpoints: a token plus the auth record
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub record: Value,
}

impl RecordsClient {
    /// Log in with an identity/password pair and store the token.
    pub async fn auth_with_password(
        &self,
        collection: &str,
        identity: &str,
        password: &str,
    ) -> Result<AuthResponse> {
        let endpoint = format!("/api/collections/{collection}/auth-with-password");
        let body = json!({ "identity": identity, "password": password });

        let response = self.send_once(Method::POST, &endpoint, Some(&body)).await?;
        let response = Self::check_status(response).await?;
        let auth_response: AuthResponse = response.json().await?;

        self.auth.lock().await.token = Some(auth_response.token.clone());
        Ok(auth_response)
    }

    /// Refresh the current token.
    pub async fn refresh_auth(&self, collection: &str) -> Result<AuthResponse> {
        let endpoint = format!("/api/collections/{collection}/auth-refresh");

        let response = self.send_once(Method::POST, &endpoint, None).await?;
        let response = Self::check_status(response).await?;
        let auth_response: AuthResponse = response.json().await?;

        self.auth.lock().await.token = Some(auth_response.token.clone());
        Ok(auth_response)
    }

    /// Obtain a token for another auth record (admin-only operation).
    pub async fn impersonate(
        &self,
        collection: &str,
        record_id: &str,
        duration_seconds: Option<u64>,
    ) -> Result<AuthResponse> {
        let endpoint = format!("/api/collections/{collection}/impersonate/{record_id}");
        let body = duration_seconds.map(|duration| json!({ "duration": duration }));

        let response = self
            .send_once(Method::POST, &endpoint, body.as_ref())
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Refresh the token, falling back to a fresh password login.
    /// Concurrent callers serialize on the refresh lock; whoever gets in
    /// first renews the token for everyone.
    pub(crate) async fn try_refresh_or_reauth(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let (collection, identity, password) = {
            let auth = self.auth.lock().await;
            (
                auth.collection.clone(),
                auth.identity.clone(),
                auth.password.clone(),
            )
        };

        let (Some(collection), Some(identity), Some(password)) = (collection, identity, password)
        else {
            return Err(RecordsError::Auth(
                "missing auth credentials for re-authentication".to_string(),
            ));
        };

        if self.refresh_auth(&collection).await.is_ok() {
            tracing::debug!("Token refreshed");
            return Ok(());
        }

        tracing::debug!("Refresh failed, retrying login");
        self.auth_with_password(&collection, &identity, &password)
            .await
            .map_err(|e| RecordsError::Auth(format!("re-authentication failed: {e}")))?;
        Ok(())
    }
}
