//! Gallery operations over any [`GalleryStore`], each answering with the
//! uniform [`ServiceResponse`] envelope.

use std::sync::Arc;

use chrono::Utc;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{GalleryCreate, GalleryItem, GalleryItemId, GalleryUpdate, ItemOrder},
    error::ErrorCode,
    protocol::ServiceResponse,
};
use storage::{GalleryStore, NewGalleryRow, StoreError};
use tracing::{error, info, warn};

use crate::ordering::next_display_order;

pub const DEFAULT_REORDER_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Operation {
    FetchItems,
    FetchItem,
    Create,
    Update,
    SoftDelete,
    HardDelete,
    Reorder,
    HealthCheck,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Self::FetchItems => "fetch_items",
            Self::FetchItem => "fetch_item",
            Self::Create => "create",
            Self::Update => "update",
            Self::SoftDelete => "soft_delete",
            Self::HardDelete => "hard_delete",
            Self::Reorder => "reorder",
            Self::HealthCheck => "health_check",
        }
    }

    fn unexpected_message(self) -> &'static str {
        match self {
            Self::FetchItems => "An unexpected error occurred while fetching gallery items",
            Self::FetchItem => "An unexpected error occurred while fetching the gallery item",
            Self::Create => "An unexpected error occurred while creating the gallery item",
            Self::Update => "An unexpected error occurred while updating the gallery item",
            Self::SoftDelete => "An unexpected error occurred while deleting the gallery item",
            Self::HardDelete => {
                "An unexpected error occurred while permanently deleting the gallery item"
            }
            Self::Reorder => "An unexpected error occurred while reordering gallery items",
            Self::HealthCheck => "The gallery store is unreachable",
        }
    }
}

fn failure<T>(operation: Operation, err: StoreError) -> ServiceResponse<T> {
    match err {
        StoreError::NotFound(_) => ServiceResponse::failure(ErrorCode::NotFound, err.to_string()),
        StoreError::Rejected(message) => ServiceResponse::failure(ErrorCode::Store, message),
        StoreError::Transport(_) => {
            error!(operation = operation.label(), error = %err, "gallery: store unreachable");
            ServiceResponse::failure(ErrorCode::Transport, operation.unexpected_message())
        }
        StoreError::Unexpected(_) => {
            error!(operation = operation.label(), error = %err, "gallery: unexpected store response");
            ServiceResponse::failure(ErrorCode::Internal, operation.unexpected_message())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderFailure {
    pub id: GalleryItemId,
    pub message: String,
}

/// Per-item outcome of a reorder batch. Updates listed in `applied` stay
/// applied even when `failures` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderReport {
    pub applied: Vec<GalleryItemId>,
    pub failures: Vec<ReorderFailure>,
}

impl ReorderReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn require(value: &str, message: &'static str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        Err(message)
    } else {
        Ok(())
    }
}

fn validate_create(data: &GalleryCreate) -> Result<(), &'static str> {
    require(&data.title, "Title is required")?;
    require(&data.alt_text, "Alt text is required")?;
    require(&data.image_url, "Image URL is required")?;
    Ok(())
}

fn validate_update(changes: &GalleryUpdate) -> Result<(), &'static str> {
    if let Some(title) = &changes.title {
        require(title, "Title cannot be empty")?;
    }
    if let Some(alt_text) = &changes.alt_text {
        require(alt_text, "Alt text cannot be empty")?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct GalleryService {
    store: Arc<dyn GalleryStore>,
    reorder_concurrency: usize,
}

impl GalleryService {
    pub fn new(store: Arc<dyn GalleryStore>) -> Self {
        Self::with_reorder_concurrency(store, DEFAULT_REORDER_CONCURRENCY)
    }

    pub fn with_reorder_concurrency(store: Arc<dyn GalleryStore>, reorder_concurrency: usize) -> Self {
        Self {
            store,
            reorder_concurrency: reorder_concurrency.max(1),
        }
    }

    /// Public read path: active items only.
    pub async fn list_active(&self) -> ServiceResponse<Vec<GalleryItem>> {
        match self.store.list_items(true).await {
            Ok(items) => ServiceResponse::ok(items),
            Err(err) => failure(Operation::FetchItems, err),
        }
    }

    pub async fn list_all(&self) -> ServiceResponse<Vec<GalleryItem>> {
        match self.store.list_items(false).await {
            Ok(items) => ServiceResponse::ok(items),
            Err(err) => failure(Operation::FetchItems, err),
        }
    }

    pub async fn get(&self, id: GalleryItemId) -> ServiceResponse<GalleryItem> {
        match self.store.get_item(id).await {
            Ok(item) => ServiceResponse::ok(item),
            Err(err) => failure(Operation::FetchItem, err),
        }
    }

    /// Inserts a new active item. Without an explicit order the item goes
    /// after the current maximum; the read and the insert are not atomic.
    pub async fn create(&self, data: GalleryCreate) -> ServiceResponse<GalleryItem> {
        if let Err(message) = validate_create(&data) {
            return ServiceResponse::failure(ErrorCode::Validation, message);
        }

        let display_order = match data.display_order {
            Some(display_order) => display_order,
            None => match self.store.max_display_order().await {
                Ok(current_max) => next_display_order(current_max),
                Err(err) => return failure(Operation::Create, err),
            },
        };

        let now = Utc::now();
        let row = NewGalleryRow {
            title: data.title.trim().to_string(),
            description: data
                .description
                .map(|description| description.trim().to_string())
                .filter(|description| !description.is_empty()),
            image_url: data.image_url.trim().to_string(),
            alt_text: data.alt_text.trim().to_string(),
            display_order,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_item(row).await {
            Ok(item) => {
                info!(item_id = item.id.0, display_order, "gallery: item created");
                ServiceResponse::ok(item)
            }
            Err(err) => failure(Operation::Create, err),
        }
    }

    pub async fn update(
        &self,
        id: GalleryItemId,
        changes: GalleryUpdate,
    ) -> ServiceResponse<GalleryItem> {
        self.apply_update(Operation::Update, id, changes).await
    }

    pub async fn toggle_status(
        &self,
        id: GalleryItemId,
        is_active: bool,
    ) -> ServiceResponse<GalleryItem> {
        self.apply_update(Operation::Update, id, GalleryUpdate::active(is_active))
            .await
    }

    /// Hides the item from the public read path; the row stays for recovery.
    pub async fn soft_delete(&self, id: GalleryItemId) -> ServiceResponse<GalleryItem> {
        self.apply_update(Operation::SoftDelete, id, GalleryUpdate::active(false))
            .await
    }

    /// Removes the row. Irreversible.
    pub async fn hard_delete(&self, id: GalleryItemId) -> ServiceResponse<bool> {
        match self.store.delete_item(id).await {
            Ok(()) => {
                info!(item_id = id.0, "gallery: item permanently deleted");
                ServiceResponse::ok(true)
            }
            Err(err) => failure(Operation::HardDelete, err),
        }
    }

    async fn apply_update(
        &self,
        operation: Operation,
        id: GalleryItemId,
        changes: GalleryUpdate,
    ) -> ServiceResponse<GalleryItem> {
        if let Err(message) = validate_update(&changes) {
            return ServiceResponse::failure(ErrorCode::Validation, message);
        }

        match self.store.update_item(id, &changes, Utc::now()).await {
            Ok(item) => {
                info!(
                    item_id = id.0,
                    operation = operation.label(),
                    is_active = item.is_active,
                    "gallery: item updated"
                );
                ServiceResponse::ok(item)
            }
            Err(err) => failure(operation, err),
        }
    }

    /// Writes every `(id, display_order)` pair as its own update, at most
    /// `reorder_concurrency` in flight. Nothing is rolled back: when some
    /// updates fail, the others remain applied and the caller should re-read.
    pub async fn reorder(&self, orders: &[ItemOrder]) -> ServiceResponse<ReorderReport> {
        let updated_at = Utc::now();
        let mut outcomes: Vec<(usize, GalleryItemId, Result<GalleryItem, StoreError>)> =
            stream::iter(orders.iter().copied().enumerate())
                .map(|(index, order)| {
                    let store = Arc::clone(&self.store);
                    async move {
                        let result = store
                            .update_item(
                                order.id,
                                &GalleryUpdate::display_order(order.display_order),
                                updated_at,
                            )
                            .await;
                        (index, order.id, result)
                    }
                })
                .buffer_unordered(self.reorder_concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut report = ReorderReport::default();
        for (_, id, result) in outcomes {
            match result {
                Ok(_) => report.applied.push(id),
                Err(err) => {
                    if !err.is_expected() {
                        error!(
                            operation = Operation::Reorder.label(),
                            item_id = id.0,
                            error = %err,
                            "gallery: reorder update failed"
                        );
                    }
                    report.failures.push(ReorderFailure {
                        id,
                        message: err.to_string(),
                    });
                }
            }
        }

        if report.is_complete() {
            info!(items = report.applied.len(), "gallery: items reordered");
            return ServiceResponse::ok(report);
        }

        let messages: Vec<&str> = report
            .failures
            .iter()
            .map(|failure| failure.message.as_str())
            .collect();
        let message = format!("Failed to reorder some items: {}", messages.join(", "));
        warn!(
            applied = report.applied.len(),
            failed = report.failures.len(),
            "gallery: reorder partially applied"
        );
        ServiceResponse::failure_with(ErrorCode::PartialFailure, message, report)
    }

    pub async fn health_check(&self) -> ServiceResponse<bool> {
        match self.store.health_check().await {
            Ok(()) => ServiceResponse::ok(true),
            Err(err) => failure(Operation::HealthCheck, err),
        }
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
