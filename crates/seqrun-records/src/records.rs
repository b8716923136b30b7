// Record CRUD
//
// Records are opaque JSON maps; collections and field names are decided
// by the records app's schema, not by this client.

use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::client::RecordsClient;
use crate::error::Result;

/// A file blob attached to a record on creation.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    /// Record field the blob is stored under
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// One entry of a batch request.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequest {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RecordsClient {
    /// List records of a collection. `query` is passed through verbatim
    /// (filter, sort, pagination).
    pub async fn list_records(&self, collection: &str, query: &[(&str, &str)]) -> Result<Value> {
        let mut endpoint = format!("/api/collections/{collection}/records");
        if !query.is_empty() {
            let encoded: Vec<String> = query
                .iter()
                .map(|(key, value)| format!("{key}={}", urlencode(value)))
                .collect();
            endpoint = format!("{endpoint}?{}", encoded.join("&"));
        }
        self.send_json(Method::GET, &endpoint, None).await
    }

    /// Fetch one record by id.
    pub async fn view_record(&self, collection: &str, id: &str) -> Result<Value> {
        let endpoint = format!("/api/collections/{collection}/records/{id}");
        self.send_json(Method::GET, &endpoint, None).await
    }

    /// Create a record from JSON fields.
    pub async fn create_record(&self, collection: &str, fields: &Map<String, Value>) -> Result<Value> {
        let endpoint = format!("/api/collections/{collection}/records");
        let body = Value::Object(fields.clone());
        self.send_json(Method::POST, &endpoint, Some(&body)).await
    }

    /// Create a record with file blobs attached (multipart/form-data).
    pub async fn create_record_with_files(
        &self,
        collection: &str,
        fields: &Map<String, Value>,
        files: &[FileAttachment],
    ) -> Result<Value> {
        self.ensure_healthy().await?;

        let endpoint = format!("/api/collections/{collection}/records");
        let response = self.send_multipart(&endpoint, fields, files).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.try_refresh_or_reauth().await?;
            let retried = self.send_multipart(&endpoint, fields, files).await?;
            let retried = Self::check_status(retried).await?;
            return Ok(retried.json().await?);
        }

        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Patch fields of an existing record.
    pub async fn update_record(
        &self,
        collection: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Value> {
        let endpoint = format!("/api/collections/{collection}/records/{id}");
        let body = Value::Object(patch.clone());
        self.send_json(Method::PATCH, &endpoint, Some(&body)).await
    }

    /// Delete a record.
    pub async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        let endpoint = format!("/api/collections/{collection}/records/{id}");
        self.send(Method::DELETE, &endpoint, None).await?;
        Ok(())
    }

    /// Run several record operations in one round trip.
    pub async fn batch(&self, requests: &[BatchRequest]) -> Result<Vec<Value>> {
        let body = json!({ "requests": requests });
        let response = self.send(Method::POST, "/api/batch", Some(&body)).await?;
        Ok(response.json().await?)
    }

    async fn send_multipart(
        &self,
        endpoint: &str,
        fields: &Map<String, Value>,
        files: &[FileAttachment],
    ) -> Result<reqwest::Response> {
        // Multipart bodies cannot be cloned for the retry, so the form is
        // rebuilt from the borrowed data on each attempt.
        let mut form = Form::new();
        for (key, value) in fields {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), text);
        }
        for file in files {
            form = form.part(
                file.field.clone(),
                Part::bytes(file.bytes.clone()).file_name(file.file_name.clone()),
            );
        }

        let mut request = self.http.post(self.url(endpoint)).multipart(form);
        if let Some(token) = self.auth.lock().await.token.clone() {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }
}

fn urlencode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("submission='abc'"), "submission%3D%27abc%27");
        assert_eq!(urlencode("plain-value_1.0~x"), "plain-value_1.0~x");
        assert_eq!(urlencode("a b"), "a%20b");
    }
}
