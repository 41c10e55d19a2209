//! Object-storage collaborator for image attachments.
//!
//! Handlers pass the client's base64 payload in and get a public URL back;
//! the bytes themselves never touch the local database.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;

/// 10 MB decoded upload limit for images
const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store a base64 image (optionally a `data:` URI) and return its
    /// public URL.
    async fn upload(&self, image: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Uploads to an HTTP endpoint that accepts `{"file": <base64>}` and
/// answers `{"secure_url": <url>}`, the unsigned-upload shape the usual
/// image CDNs expose.
pub struct HttpImageStore {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpImageStore {
    pub fn new(upload_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url,
        }
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn upload(&self, image: &str) -> Result<String> {
        check_payload(image)?;

        let response = self
            .client
            .post(&self.upload_url)
            .json(&serde_json::json!({ "file": image }))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("image storage returned {}", response.status());
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .context("image storage answered with an unexpected body")?;

        Ok(parsed.secure_url)
    }
}

/// Used when no storage endpoint is configured; every upload fails.
pub struct DisabledImageStore;

#[async_trait]
impl ImageStore for DisabledImageStore {
    async fn upload(&self, _image: &str) -> Result<String> {
        bail!("image storage is not configured")
    }
}

/// Reject payloads that aren't base64 or would decode past the size limit
/// before any bytes go over the wire.
fn check_payload(image: &str) -> Result<()> {
    // Accept both a bare payload and a full data URI
    let payload = match image.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => image,
    };

    let bytes = B64
        .decode(payload.trim())
        .context("image payload is not valid base64")?;

    if bytes.is_empty() {
        bail!("image payload is empty");
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        bail!("image exceeds the {} byte limit", MAX_IMAGE_SIZE);
    }

    Ok(())
}
