//! JSON handlers for the public listing and the admin console.

use std::sync::Arc;

use axum::{
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use gallery_core::{ImageUpload, NewImage};
use shared::{
    domain::{GalleryItem, GalleryItemId, GalleryStats, GalleryUpdate},
    error::{ApiError, ErrorCode},
    protocol::{
        AdminActionResponse, GalleryViewResponse, Notice, ReorderRequest, ServiceResponse,
        SetStatusRequest, ViewQuery,
    },
};
use tracing::warn;

use crate::app_state::AppState;

pub(crate) type ApiFailure = (StatusCode, Json<ApiError>);
pub(crate) type ActionReply = (StatusCode, Json<AdminActionResponse>);

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Store => StatusCode::CONFLICT,
        ErrorCode::Transport | ErrorCode::PartialFailure => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(code: ErrorCode, message: impl Into<String>) -> ApiFailure {
    (status_for(code), Json(ApiError::new(code, message)))
}

fn respond<T>(response: ServiceResponse<T>) -> Result<Json<T>, ApiFailure> {
    response
        .into_result()
        .map(Json)
        .map_err(|err| failure(err.code, err.message))
}

fn action_reply(notice: Notice, stats: GalleryStats) -> ActionReply {
    let status = match notice.code {
        Some(code) if !notice.is_success() => status_for(code),
        _ => StatusCode::OK,
    };
    (
        status,
        Json(AdminActionResponse { notice, stats }),
    )
}

pub(crate) async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if state.service.health_check().await.success {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    }
}

/// Public read path: active items only, never waits on the admin session.
pub(crate) async fn public_gallery(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<GalleryItem>>, ApiFailure> {
    respond(state.service.list_active().await)
}

pub(crate) async fn admin_gallery(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> (StatusCode, Json<GalleryViewResponse>) {
    let mut admin = state.admin.lock().await;
    let refreshed = admin.refresh().await;

    let items: Vec<GalleryItem> = admin.visible(&query).into_iter().cloned().collect();
    let snapshot = GalleryViewResponse {
        showing: items.len(),
        total: admin.items().len(),
        stats: admin.stats(),
        items,
        error: admin.last_error().map(str::to_string),
    };
    let status = match refreshed {
        Ok(()) => StatusCode::OK,
        Err(err) => status_for(err.code),
    };
    (status, Json(snapshot))
}

pub(crate) async fn admin_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<GalleryItem>, ApiFailure> {
    respond(state.service.get(GalleryItemId(id)).await)
}

pub(crate) async fn add_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<ActionReply, ApiFailure> {
    let image = read_new_image(multipart).await?;
    let mut admin = state.admin.lock().await;
    let notice = admin.add_image(image).await;
    Ok(action_reply(notice, admin.stats()))
}

pub(crate) async fn edit_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(changes): Json<GalleryUpdate>,
) -> ActionReply {
    let mut admin = state.admin.lock().await;
    let notice = admin.edit(GalleryItemId(id), changes).await;
    action_reply(notice, admin.stats())
}

pub(crate) async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<SetStatusRequest>,
) -> ActionReply {
    let mut admin = state.admin.lock().await;
    let notice = admin.set_status(GalleryItemId(id), request.is_active).await;
    action_reply(notice, admin.stats())
}

pub(crate) async fn soft_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ActionReply {
    let mut admin = state.admin.lock().await;
    let notice = admin.delete(GalleryItemId(id)).await;
    action_reply(notice, admin.stats())
}

pub(crate) async fn hard_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ActionReply {
    let mut admin = state.admin.lock().await;
    let notice = admin.purge(GalleryItemId(id)).await;
    action_reply(notice, admin.stats())
}

pub(crate) async fn reorder(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReorderRequest>,
) -> ActionReply {
    let mut admin = state.admin.lock().await;
    // The plan is computed against the cached list; make sure it is current.
    let _ = admin.refresh().await;
    let notice = admin.reorder(request.dragged_id, request.target_id).await;
    action_reply(notice, admin.stats())
}

async fn read_text(field: Field<'_>) -> Result<String, ApiFailure> {
    field
        .text()
        .await
        .map_err(|err| failure(ErrorCode::Validation, format!("invalid form field: {err}")))
}

async fn read_new_image(mut multipart: Multipart) -> Result<NewImage, ApiFailure> {
    let mut upload = None;
    let mut title = String::new();
    let mut alt_text = String::new();
    let mut description = None;
    let mut display_order = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| failure(ErrorCode::Validation, format!("invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    failure(ErrorCode::Validation, format!("failed to read file: {err}"))
                })?;
                upload = Some(ImageUpload::new(filename, content_type, bytes.to_vec()));
            }
            "title" => title = read_text(field).await?,
            "alt_text" => alt_text = read_text(field).await?,
            "description" => description = Some(read_text(field).await?),
            "display_order" => {
                let raw = read_text(field).await?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    display_order = Some(raw.parse::<i64>().map_err(|_| {
                        failure(ErrorCode::Validation, "display_order must be an integer")
                    })?);
                }
            }
            other => warn!(field = other, "admin api: ignoring unknown form field"),
        }
    }

    let Some(upload) = upload else {
        return Err(failure(ErrorCode::Validation, "Please select an image file"));
    };
    Ok(NewImage {
        upload,
        title,
        alt_text,
        description,
        display_order,
    })
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
