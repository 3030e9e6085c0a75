//! The blob-storage HTTP wire.
//!
//! Upload: `PUT <server>/upload` with the raw ciphertext body and an
//! `X-SHA-256` header; the server answers `{"url": "..."}`. Download:
//! `GET <url>` returns the blob. The client is agnostic to which
//! Blossom-style server sits behind the URL.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{MediaError, Result};

/// Default transfer timeout.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a single blob server.
pub struct BlobClient {
    http: reqwest::Client,
    server: String,
}

impl BlobClient {
    /// `server` is the base URL, e.g. `https://blob.example`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            server: normalize_server(server.into()),
        }
    }

    /// Upload ciphertext; returns the URL the blob is served from.
    pub async fn upload(
        &self,
        ciphertext: &[u8],
        sha256_hex: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        let request = self
            .http
            .put(format!("{}/upload", self.server))
            .header("Content-Type", "application/octet-stream")
            .header("X-SHA-256", sha256_hex)
            .timeout(TRANSFER_TIMEOUT)
            .body(ciphertext.to_vec())
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(MediaError::Cancelled),
            response = request => response.map_err(|e| MediaError::Network(e.to_string()))?,
        };
        if !response.status().is_success() {
            return Err(MediaError::Network(format!(
                "upload returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;
        Ok(parse_upload_url(&body).unwrap_or_else(|| self.fallback_url(sha256_hex)))
    }

    /// Download a blob by URL.
    pub async fn download(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        let request = self.http.get(url).timeout(TRANSFER_TIMEOUT).send();
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(MediaError::Cancelled),
            response = request => response.map_err(|e| MediaError::Network(e.to_string()))?,
        };
        if !response.status().is_success() {
            return Err(MediaError::Network(format!(
                "download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Where the blob lives when the server's answer is unusable.
    pub fn fallback_url(&self, sha256_hex: &str) -> String {
        format!("{}/{}", self.server, sha256_hex)
    }
}

/// Pull the `url` field out of the server's JSON response.
fn parse_upload_url(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("url")
        .and_then(|u| u.as_str())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

fn normalize_server(mut server: String) -> String {
    while server.ends_with('/') {
        server.pop();
    }
    server
}
