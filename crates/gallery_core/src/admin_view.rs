//! Administrative view of the gallery: a cached full listing plus the
//! actions an administrator can take on it. Every action answers with a
//! [`Notice`] and leaves the cache re-read from the store.

use std::{cmp::Ordering, sync::Arc};

use shared::{
    domain::{
        GalleryCreate, GalleryItem, GalleryItemId, GalleryStats, GalleryUpdate, SortDirection,
        SortField, StatusFilter,
    },
    error::{ApiException, ErrorCode},
    protocol::{Notice, ServiceResponse, ViewQuery},
};
use tracing::{info, warn};

use crate::{
    image_host::{validate_image, ImageHost, ImageUpload},
    ordering::plan_move,
    service::GalleryService,
};

/// Everything the add-image form collects.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub upload: ImageUpload,
    pub title: String,
    pub alt_text: String,
    pub description: Option<String>,
    pub display_order: Option<i64>,
}

fn notice_from<T>(response: ServiceResponse<T>, success: impl Into<String>) -> Notice {
    if response.success {
        Notice::success(success)
    } else {
        Notice::error(
            response.code.unwrap_or(ErrorCode::Internal),
            response
                .error
                .unwrap_or_else(|| "The operation did not complete".to_string()),
        )
    }
}

fn matches_search(item: &GalleryItem, needle: &str) -> bool {
    item.title.to_lowercase().contains(needle)
        || item.alt_text.to_lowercase().contains(needle)
        || item
            .description
            .as_deref()
            .is_some_and(|description| description.to_lowercase().contains(needle))
}

fn matches_status(item: &GalleryItem, status: StatusFilter) -> bool {
    match status {
        StatusFilter::All => true,
        StatusFilter::Active => item.is_active,
        StatusFilter::Inactive => !item.is_active,
    }
}

fn compare(a: &GalleryItem, b: &GalleryItem, field: SortField) -> Ordering {
    match field {
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::DisplayOrder => a.display_order.cmp(&b.display_order),
    }
}

pub struct GalleryAdminView {
    service: GalleryService,
    image_host: Arc<dyn ImageHost>,
    items: Vec<GalleryItem>,
    last_error: Option<String>,
}

impl GalleryAdminView {
    pub fn new(service: GalleryService, image_host: Arc<dyn ImageHost>) -> Self {
        Self {
            service,
            image_host,
            items: Vec::new(),
            last_error: None,
        }
    }

    /// Full listing in presentation order, as last read from the store.
    pub fn items(&self) -> &[GalleryItem] {
        &self.items
    }

    pub fn stats(&self) -> GalleryStats {
        GalleryStats::from_items(&self.items)
    }

    /// Message of the last failed refresh, cleared by the next good one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Re-reads the full listing. On failure the previous listing is kept.
    pub async fn refresh(&mut self) -> Result<(), ApiException> {
        match self.service.list_all().await.into_result() {
            Ok(items) => {
                self.items = items;
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "admin view: refresh failed");
                self.last_error = Some(err.message.clone());
                Err(err)
            }
        }
    }

    /// Filtered and sorted projection of the cached listing. The sort is
    /// stable, so ties keep presentation order.
    pub fn visible(&self, query: &ViewQuery) -> Vec<&GalleryItem> {
        let needle = query.search.trim().to_lowercase();
        let mut visible: Vec<&GalleryItem> = self
            .items
            .iter()
            .filter(|item| needle.is_empty() || matches_search(item, &needle))
            .filter(|item| matches_status(item, query.status))
            .collect();

        visible.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort);
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        visible
    }

    /// Uploads the image, then records it. Nothing is written to the table
    /// unless the upload succeeded.
    pub async fn add_image(&mut self, image: NewImage) -> Notice {
        if image.title.trim().is_empty() {
            return Notice::error(ErrorCode::Validation, "Title is required");
        }
        if image.alt_text.trim().is_empty() {
            return Notice::error(ErrorCode::Validation, "Alt text is required");
        }
        if let Err(err) = validate_image(&image.upload) {
            return Notice::error(err.code(), err.to_string());
        }

        let hosted = match self.image_host.upload(&image.upload).await {
            Ok(hosted) => hosted,
            Err(err) => return Notice::error(err.code(), err.to_string()),
        };

        let response = self
            .service
            .create(GalleryCreate {
                title: image.title,
                description: image.description,
                image_url: hosted.url.clone(),
                alt_text: image.alt_text,
                display_order: image.display_order,
            })
            .await;
        if !response.success {
            warn!(
                image_url = %hosted.url,
                delete_url = hosted.delete_url.as_deref().unwrap_or_default(),
                "admin view: image uploaded but gallery row was not created"
            );
        }

        let notice = notice_from(response, "Image added successfully!");
        self.refresh_quietly().await;
        notice
    }

    pub async fn edit(&mut self, id: GalleryItemId, changes: GalleryUpdate) -> Notice {
        if changes.is_empty() {
            return Notice::error(ErrorCode::Validation, "No changes to save");
        }
        let response = self.service.update(id, changes).await;
        let notice = notice_from(response, "Gallery item updated successfully");
        self.refresh_quietly().await;
        notice
    }

    pub async fn set_status(&mut self, id: GalleryItemId, is_active: bool) -> Notice {
        let response = self.service.toggle_status(id, is_active).await;
        let message = if is_active {
            "Gallery item activated successfully"
        } else {
            "Gallery item deactivated successfully"
        };
        let notice = notice_from(response, message);
        self.refresh_quietly().await;
        notice
    }

    /// Flips the cached status of `id`.
    pub async fn toggle(&mut self, id: GalleryItemId) -> Notice {
        let current = match self.cached(id) {
            Some(item) => item.is_active,
            None => {
                self.refresh_quietly().await;
                match self.cached(id) {
                    Some(item) => item.is_active,
                    None => {
                        return Notice::error(
                            ErrorCode::NotFound,
                            format!("gallery item {id} not found"),
                        )
                    }
                }
            }
        };
        self.set_status(id, !current).await
    }

    /// Soft delete: the item disappears from the public gallery but stays here.
    pub async fn delete(&mut self, id: GalleryItemId) -> Notice {
        let response = self.service.soft_delete(id).await;
        let notice = notice_from(response, "Gallery item deleted successfully");
        self.refresh_quietly().await;
        notice
    }

    pub async fn purge(&mut self, id: GalleryItemId) -> Notice {
        let response = self.service.hard_delete(id).await;
        let notice = notice_from(response, "Gallery item permanently deleted");
        self.refresh_quietly().await;
        notice
    }

    /// Drops `dragged` onto `target` within the full listing, whatever
    /// filter the caller is showing. The cache is re-read afterwards whether
    /// or not every update landed.
    pub async fn reorder(&mut self, dragged: GalleryItemId, target: GalleryItemId) -> Notice {
        let Some(plan) = plan_move(&self.items, dragged, target) else {
            return Notice::success("Gallery order unchanged");
        };

        self.items = plan.items;
        let response = self.service.reorder(&plan.orders).await;
        info!(
            dragged = dragged.0,
            target = target.0,
            success = response.success,
            "admin view: reorder applied"
        );
        let notice = notice_from(response, "Gallery items reordered successfully");
        self.refresh_quietly().await;
        notice
    }

    fn cached(&self, id: GalleryItemId) -> Option<&GalleryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    async fn refresh_quietly(&mut self) {
        let _ = self.refresh().await;
    }
}

#[cfg(test)]
#[path = "tests/admin_view_tests.rs"]
mod tests;
