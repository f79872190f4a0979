use shared::error::ErrorCode;
use thiserror::Error;

pub const INVALID_IMAGE_TYPE: &str = "Please select a valid image file (PNG, JPEG, GIF, etc.)";
pub const IMAGE_TOO_LARGE: &str = "Image size must be less than 32MB";
pub const IMAGE_EMPTY: &str = "The selected file appears to be empty";

#[derive(Debug, Error)]
pub enum ImageHostError {
    /// Rejected locally; no request was sent.
    #[error("{0}")]
    Validation(&'static str),
    #[error("image host is not configured; set an ImgBB API key to enable uploads")]
    NotConfigured,
    #[error("image upload failed: {0}")]
    Transport(String),
    #[error("image host returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Failed to upload image to ImgBB")]
    Unsuccessful,
    #[error("unexpected image host response: {0}")]
    Decode(String),
}

impl ImageHostError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotConfigured => ErrorCode::Internal,
            Self::Transport(_)
            | Self::Decode(_)
            | Self::Rejected { .. }
            | Self::Unsuccessful => ErrorCode::Transport,
        }
    }
}
