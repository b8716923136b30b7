// Health probe
//
// The first request through the client performs a bounded-retry health
// probe against /api/health so a worker that races the records app's
// startup does not fail its first job. Subsequent requests skip it.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::client::RecordsClient;
use crate::error::{RecordsError, Result};

/// Response of the records app's health endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl RecordsClient {
    /// Check the records app's health. Does not go through the request
    /// gate, so it is usable before the initial probe has passed.
    pub async fn health_check(&self) -> Result<HealthResponse> {
        let response = self.send_once(Method::GET, "/api/health", None).await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Run the initial health probe exactly once per client.
    pub(crate) async fn ensure_healthy(&self) -> Result<()> {
        self.health_checked
            .get_or_try_init(|| self.probe_health())
            .await?;
        Ok(())
    }

    async fn probe_health(&self) -> Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.health_retry_count {
            match self.health_check().await {
                Ok(health) if health.code == 200 => {
                    tracing::debug!(message = %health.message, "Records app is healthy");
                    return Ok(());
                }
                Ok(health) => {
                    last_error = format!("health code {}", health.code);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < self.health_retry_count {
                tracing::debug!(
                    attempt,
                    total = self.health_retry_count,
                    "Records app not healthy yet, retrying"
                );
                tokio::time::sleep(self.health_retry_delay).await;
            }
        }

        Err(RecordsError::Unhealthy(format!(
            "no healthy response after {} attempts: {last_error}",
            self.health_retry_count
        )))
    }
}
