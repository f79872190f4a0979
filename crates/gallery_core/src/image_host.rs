//! ImgBB upload client.
//!
//! Size and type limits are enforced here, before any bytes leave the
//! process; the host itself is never asked to judge a file. Uploads are not
//! retried.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{multipart, Client};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::{ImageHostError, IMAGE_EMPTY, IMAGE_TOO_LARGE, INVALID_IMAGE_TYPE};

pub const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";
pub const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

pub fn validate_image(upload: &ImageUpload) -> Result<(), ImageHostError> {
    if !upload
        .content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
    {
        return Err(ImageHostError::Validation(INVALID_IMAGE_TYPE));
    }
    if upload.size() > MAX_IMAGE_BYTES {
        return Err(ImageHostError::Validation(IMAGE_TOO_LARGE));
    }
    if upload.bytes.is_empty() {
        return Err(ImageHostError::Validation(IMAGE_EMPTY));
    }
    Ok(())
}

/// Durable location of an uploaded image plus the metadata the host reports.
/// Only `url` is persisted on the gallery row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedImage {
    pub url: String,
    pub display_url: Option<String>,
    pub thumb_url: Option<String>,
    pub medium_url: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub size_bytes: Option<u64>,
    pub delete_url: Option<String>,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, upload: &ImageUpload) -> Result<HostedImage, ImageHostError>;
}

/// Stand-in used when no API key is configured.
pub struct MissingImageHost;

#[async_trait]
impl ImageHost for MissingImageHost {
    async fn upload(&self, upload: &ImageUpload) -> Result<HostedImage, ImageHostError> {
        validate_image(upload)?;
        Err(ImageHostError::NotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct UploadEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<UploadData>,
    #[serde(default)]
    error: Option<UploadErrorBody>,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: String,
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    width: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    height: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: Option<u64>,
    #[serde(default)]
    delete_url: Option<String>,
    #[serde(default)]
    thumb: Option<UploadVariant>,
    #[serde(default)]
    medium: Option<UploadVariant>,
}

#[derive(Debug, Deserialize)]
struct UploadVariant {
    url: String,
}

/// ImgBB reports dimensions as strings in some responses and numbers in others.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number.as_u64(),
        Some(serde_json::Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

impl From<UploadData> for HostedImage {
    fn from(data: UploadData) -> Self {
        Self {
            url: data.url,
            display_url: data.display_url,
            thumb_url: data.thumb.map(|variant| variant.url),
            medium_url: data.medium.map(|variant| variant.url),
            width: data.width,
            height: data.height,
            size_bytes: data.size,
            delete_url: data.delete_url,
        }
    }
}

pub struct ImgBbClient {
    http: Client,
    endpoint: Url,
    api_key: String,
}

impl ImgBbClient {
    pub fn new(api_key: impl Into<String>, endpoint: Url) -> Self {
        Self::with_http_client(Client::new(), api_key, endpoint)
    }

    pub fn with_http_client(http: Client, api_key: impl Into<String>, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ImageHost for ImgBbClient {
    async fn upload(&self, upload: &ImageUpload) -> Result<HostedImage, ImageHostError> {
        validate_image(upload)?;

        let form = multipart::Form::new()
            .text("key", self.api_key.clone())
            .text("image", STANDARD.encode(&upload.bytes))
            .text("name", upload.filename.clone());

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|error| ImageHostError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| ImageHostError::Transport(error.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<UploadEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error)
                .and_then(|error| error.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            warn!(
                status = status.as_u16(),
                filename = %upload.filename,
                %message,
                "image host: upload rejected"
            );
            return Err(ImageHostError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: UploadEnvelope = serde_json::from_slice(&body)
            .map_err(|error| ImageHostError::Decode(error.to_string()))?;
        let data = match envelope {
            UploadEnvelope {
                success: true,
                data: Some(data),
                ..
            } => data,
            _ => return Err(ImageHostError::Unsuccessful),
        };

        let hosted = HostedImage::from(data);
        info!(
            filename = %upload.filename,
            size = upload.size(),
            url = %hosted.url,
            "image host: upload stored"
        );
        Ok(hosted)
    }
}

/// Human-readable size, e.g. `0 Bytes`, `1.5 KB`, `32 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

#[cfg(test)]
#[path = "tests/image_host_tests.rs"]
mod tests;
