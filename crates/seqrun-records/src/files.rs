// File transfer
//
// Downloads go through the records app's file endpoint, optionally with
// a short-lived scoped token. Bodies stream straight to disk; nothing is
// buffered whole in memory.

use futures::StreamExt;
use reqwest::Method;
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::client::RecordsClient;
use crate::error::Result;

/// Options for `download_file`.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Thumbnail size (e.g. "200x200") for image files
    pub thumb: Option<String>,
    /// Ask the server for a content-disposition download response
    pub force_download: bool,
    /// Fetch a scoped file token and pass it as a query parameter;
    /// required for files behind protected collections
    pub with_token: bool,
}

#[derive(Debug, Deserialize)]
struct FileTokenResponse {
    token: String,
}

impl RecordsClient {
    /// Obtain a short-lived scoped token for protected file access.
    /// Tokens are not revoked explicitly; they expire naturally.
    pub async fn get_file_token(&self) -> Result<String> {
        let response = self.send(Method::POST, "/api/files/token", None).await?;
        let token_response: FileTokenResponse = response.json().await?;
        Ok(token_response.token)
    }

    /// Download one file blob to `local_path`, creating parent
    /// directories as needed.
    pub async fn download_file(
        &self,
        collection: &str,
        record_id: &str,
        filename: &str,
        local_path: &Path,
        opts: &DownloadOptions,
    ) -> Result<()> {
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(thumb) = &opts.thumb {
            query.push(("thumb".to_string(), thumb.clone()));
        }
        if opts.force_download {
            query.push(("download".to_string(), "true".to_string()));
        }
        if opts.with_token {
            let token = self.get_file_token().await?;
            query.push(("token".to_string(), token));
        }

        let mut endpoint = format!("/api/files/{collection}/{record_id}/{filename}");
        if !query.is_empty() {
            let encoded: Vec<String> = query
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            endpoint = format!("{endpoint}?{}", encoded.join("&"));
        }

        let response = self.send(Method::GET, &endpoint, None).await?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(local_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;

        Ok(())
    }
}
