use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use gallery_core::{connect_store, image_host_from, GalleryService, MAX_IMAGE_BYTES};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

mod api;
mod app_state;
mod config;

use app_state::AppState;
use crate::config::load_settings;

/// Room for the multipart framing and text fields around a maximal image.
const MAX_REQUEST_BYTES: usize = MAX_IMAGE_BYTES + 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings()?;
    let target = settings.store_target()?;
    let store = connect_store(&target).await?;

    let imgbb_endpoint = settings.imgbb_endpoint_url()?;
    if settings.imgbb_api_key().is_none() {
        warn!("no ImgBB API key configured; image uploads will be refused");
    }
    let image_host = image_host_from(settings.imgbb_api_key(), imgbb_endpoint);

    let service = GalleryService::with_reorder_concurrency(store, settings.reorder_concurrency);
    let app = build_router(Arc::new(AppState::new(service, image_host)));

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind_addr '{}'", settings.bind_addr))?;
    info!(%addr, "gallery server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/gallery", get(api::public_gallery))
        .route(
            "/admin/gallery",
            get(api::admin_gallery).post(api::add_image),
        )
        .route("/admin/gallery/reorder", post(api::reorder))
        .route(
            "/admin/gallery/:id",
            get(api::admin_item)
                .patch(api::edit_item)
                .delete(api::soft_delete),
        )
        .route("/admin/gallery/:id/status", post(api::set_status))
        .route("/admin/gallery/:id/permanent", delete(api::hard_delete))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
