use serde::{Deserialize, Serialize};

use crate::{
    domain::{GalleryItem, GalleryItemId, GalleryStats, SortDirection, SortField, StatusFilter},
    error::{ApiException, ErrorCode},
};

/// Uniform result envelope returned by every gallery operation.
///
/// Expected failures travel in `error`/`code`; callers never need to catch
/// anything to learn that an operation did not go through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn failure(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }

    /// A failure that still carries a payload, e.g. the per-item report of
    /// a partially applied batch.
    pub fn failure_with(code: ErrorCode, error: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error.into()),
            code: Some(code),
        }
    }

    pub fn into_result(self) -> Result<T, ApiException> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(ApiException::new(
                self.code.unwrap_or(ErrorCode::Internal),
                self.error
                    .unwrap_or_else(|| "operation returned no data".to_string()),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// One-line outcome of an admin action, suitable for a toast or a CLI line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            code: None,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn is_success(&self) -> bool {
        self.level == NoticeLevel::Success
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryViewResponse {
    pub items: Vec<GalleryItem>,
    pub stats: GalleryStats,
    pub showing: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminActionResponse {
    pub notice: Notice,
    pub stats: GalleryStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub dragged_id: GalleryItemId,
    pub target_id: GalleryItemId,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
