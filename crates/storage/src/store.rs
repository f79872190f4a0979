//! The contract every gallery table backend implements.
//!
//! Backends own no state between calls. They do not enforce ordering
//! invariants: `display_order` may repeat, and concurrent writers race with
//! last-write-wins semantics per row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::domain::{GalleryItem, GalleryItemId, GalleryUpdate};
use thiserror::Error;

pub const GALLERY_TABLE: &str = "life_at_company_gallery";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("gallery item {0} not found")]
    NotFound(GalleryItemId),
    /// The store answered and refused the request (constraint violation,
    /// malformed filter, permission denied).
    #[error("{0}")]
    Rejected(String),
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("unexpected store response: {0}")]
    Unexpected(String),
}

impl StoreError {
    /// Whether the message is meaningful to an administrator. Transport and
    /// decoding failures are logged and replaced with a generic message.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Rejected(_))
    }
}

/// A row as written on insert. Timestamps are chosen by the caller so that
/// every backend stores the same values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGalleryRow {
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub alt_text: String,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Items ordered by `(display_order asc, created_at desc)`.
    async fn list_items(&self, active_only: bool) -> Result<Vec<GalleryItem>, StoreError>;

    async fn get_item(&self, id: GalleryItemId) -> Result<GalleryItem, StoreError>;

    /// Largest stored `display_order`, or `None` for an empty table.
    async fn max_display_order(&self) -> Result<Option<i64>, StoreError>;

    async fn insert_item(&self, row: NewGalleryRow) -> Result<GalleryItem, StoreError>;

    /// Applies the present fields of `changes` and always writes `updated_at`.
    async fn update_item(
        &self,
        id: GalleryItemId,
        changes: &GalleryUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<GalleryItem, StoreError>;

    async fn delete_item(&self, id: GalleryItemId) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
