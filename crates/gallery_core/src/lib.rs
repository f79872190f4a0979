use std::sync::Arc;

use anyhow::{Context, Result};
use storage::{GalleryStore, Storage};
use tracing::info;
use url::Url;

pub mod admin_view;
pub mod error;
pub mod image_host;
pub mod ordering;
pub mod postgrest;
pub mod service;

pub use admin_view::{GalleryAdminView, NewImage};
pub use error::ImageHostError;
pub use image_host::{
    format_file_size, validate_image, HostedImage, ImageHost, ImageUpload, ImgBbClient,
    MissingImageHost, IMGBB_UPLOAD_URL, MAX_IMAGE_BYTES,
};
pub use postgrest::SupabaseGalleryStore;
pub use service::{GalleryService, ReorderFailure, ReorderReport, DEFAULT_REORDER_CONCURRENCY};

/// Where the gallery table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// Local SQLite database, used for development and tests.
    Sqlite { database_url: String },
    Supabase {
        project_url: Url,
        api_key: String,
        table: String,
    },
}

pub async fn connect_store(target: &StoreTarget) -> Result<Arc<dyn GalleryStore>> {
    match target {
        StoreTarget::Sqlite { database_url } => {
            let storage = Storage::new(database_url)
                .await
                .with_context(|| format!("failed to open gallery database {database_url}"))?;
            info!(%database_url, "gallery: using sqlite store");
            Ok(Arc::new(storage))
        }
        StoreTarget::Supabase {
            project_url,
            api_key,
            table,
        } => {
            let store = SupabaseGalleryStore::new(project_url, api_key.clone(), table)
                .with_context(|| format!("invalid supabase table url for {table}"))?;
            info!(table_url = %store.table_url(), "gallery: using supabase store");
            Ok(Arc::new(store))
        }
    }
}

/// The ImgBB client when a key is configured, otherwise a host that refuses
/// every upload.
pub fn image_host_from(api_key: Option<&str>, endpoint: Url) -> Arc<dyn ImageHost> {
    match api_key.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => Arc::new(ImgBbClient::new(key, endpoint)),
        None => Arc::new(MissingImageHost),
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
