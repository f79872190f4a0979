//! Shared fixtures: an in-process PostgREST stand-in and store doubles.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use shared::domain::{GalleryItem, GalleryItemId, GalleryUpdate};
use storage::{GalleryStore, NewGalleryRow, Storage, StoreError};
use tokio::{net::TcpListener, sync::Mutex};
use url::Url;

pub(crate) fn sample_item(id: i64, display_order: i64, created_at: DateTime<Utc>) -> GalleryItem {
    GalleryItem {
        id: GalleryItemId(id),
        title: format!("Photo {id}"),
        description: None,
        image_url: format!("https://i.ibb.co/{id}/photo.jpg"),
        alt_text: format!("Photo {id} alt"),
        display_order,
        is_active: true,
        created_at,
        updated_at: created_at,
    }
}

pub(crate) fn new_row(title: &str, display_order: i64) -> NewGalleryRow {
    let now = Utc::now();
    NewGalleryRow {
        title: title.to_string(),
        description: None,
        image_url: format!("https://i.ibb.co/{title}.jpg"),
        alt_text: format!("{title} alt"),
        display_order,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) async fn seeded_storage(titles: &[&str]) -> (Storage, Vec<GalleryItem>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut items = Vec::new();
    for (index, title) in titles.iter().enumerate() {
        let item = storage
            .insert_item(new_row(title, index as i64 + 1))
            .await
            .expect("seed");
        items.push(item);
    }
    (storage, items)
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub query: HashMap<String, String>,
    pub apikey: Option<String>,
    pub authorization: Option<String>,
    pub prefer: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakePostgrest {
    pub rows: Arc<Mutex<Vec<GalleryItem>>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    next_id: Arc<AtomicI64>,
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    title: String,
    #[serde(default)]
    description: Option<String>,
    image_url: String,
    alt_text: String,
    display_order: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn eq_filter(query: &HashMap<String, String>, column: &str) -> Option<String> {
    query
        .get(column)
        .and_then(|value| value.strip_prefix("eq."))
        .map(str::to_string)
}

fn postgrest_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "code": code, "message": message, "details": null, "hint": null })),
    )
        .into_response()
}

impl FakePostgrest {
    pub(crate) async fn spawn(self) -> Url {
        let router = Router::new()
            .route("/rest/v1/life_at_company_gallery", any(handle))
            .with_state(self);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        Url::parse(&format!("http://{addr}")).expect("url")
    }

    pub(crate) async fn seed(&self, items: Vec<GalleryItem>) {
        let max_id = items.iter().map(|item| item.id.0).max().unwrap_or(0);
        self.next_id.store(max_id, Ordering::SeqCst);
        *self.rows.lock().await = items;
    }

    fn matches(item: &GalleryItem, query: &HashMap<String, String>) -> bool {
        if let Some(id) = eq_filter(query, "id") {
            if item.id.0.to_string() != id {
                return false;
            }
        }
        if let Some(active) = eq_filter(query, "is_active") {
            if item.is_active.to_string() != active {
                return false;
            }
        }
        true
    }
}

async fn handle(
    State(fake): State<FakePostgrest>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    fake.requests.lock().await.push(RecordedRequest {
        method: method.clone(),
        query: query.clone(),
        apikey: header(&headers, "apikey"),
        authorization: header(&headers, "authorization"),
        prefer: header(&headers, "prefer"),
    });

    if header(&headers, "apikey").is_none() {
        return postgrest_error(StatusCode::UNAUTHORIZED, "PGRST301", "No API key found in request");
    }

    let mut rows = fake.rows.lock().await;
    match method {
        Method::GET => {
            let mut selected: Vec<GalleryItem> = rows
                .iter()
                .filter(|item| FakePostgrest::matches(item, &query))
                .cloned()
                .collect();
            match query.get("order").map(String::as_str) {
                None => {}
                Some("display_order.asc,created_at.desc") => selected.sort_by(|a, b| {
                    a.display_order
                        .cmp(&b.display_order)
                        .then(b.created_at.cmp(&a.created_at))
                }),
                Some("display_order.desc.nullslast") => {
                    selected.sort_by(|a, b| b.display_order.cmp(&a.display_order))
                }
                Some(other) => {
                    return postgrest_error(
                        StatusCode::BAD_REQUEST,
                        "PGRST100",
                        &format!("unsupported order {other}"),
                    )
                }
            }
            if let Some(limit) = query.get("limit").and_then(|l| l.parse::<usize>().ok()) {
                selected.truncate(limit);
            }
            match query.get("select").map(String::as_str) {
                Some("display_order") => Json(
                    selected
                        .iter()
                        .map(|item| json!({ "display_order": item.display_order }))
                        .collect::<Vec<_>>(),
                )
                .into_response(),
                Some("id") => Json(
                    selected
                        .iter()
                        .map(|item| json!({ "id": item.id }))
                        .collect::<Vec<_>>(),
                )
                .into_response(),
                _ => Json(selected).into_response(),
            }
        }
        Method::POST => {
            let inserted: Vec<InsertedRow> = match serde_json::from_slice(&body) {
                Ok(inserted) => inserted,
                Err(error) => {
                    return postgrest_error(StatusCode::BAD_REQUEST, "PGRST102", &error.to_string())
                }
            };
            let mut created = Vec::new();
            for row in inserted {
                if row.title.trim().is_empty() {
                    return postgrest_error(
                        StatusCode::BAD_REQUEST,
                        "23514",
                        "new row violates check constraint \"title_not_blank\"",
                    );
                }
                let id = fake.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let item = GalleryItem {
                    id: GalleryItemId(id),
                    title: row.title,
                    description: row.description,
                    image_url: row.image_url,
                    alt_text: row.alt_text,
                    display_order: row.display_order,
                    is_active: row.is_active,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                };
                rows.push(item.clone());
                created.push(item);
            }
            (StatusCode::CREATED, Json(created)).into_response()
        }
        Method::PATCH => {
            let patch: serde_json::Value = match serde_json::from_slice(&body) {
                Ok(patch) => patch,
                Err(error) => {
                    return postgrest_error(StatusCode::BAD_REQUEST, "PGRST102", &error.to_string())
                }
            };
            let changes: GalleryUpdate =
                serde_json::from_value(patch.clone()).unwrap_or_default();
            let updated_at = patch
                .get("updated_at")
                .and_then(|value| serde_json::from_value::<DateTime<Utc>>(value.clone()).ok());
            let mut touched = Vec::new();
            for item in rows.iter_mut().filter(|item| FakePostgrest::matches(item, &query)) {
                if let Some(title) = &changes.title {
                    item.title = title.clone();
                }
                if let Some(description) = &changes.description {
                    item.description = Some(description.clone());
                }
                if let Some(alt_text) = &changes.alt_text {
                    item.alt_text = alt_text.clone();
                }
                if let Some(display_order) = changes.display_order {
                    item.display_order = display_order;
                }
                if let Some(is_active) = changes.is_active {
                    item.is_active = is_active;
                }
                if let Some(updated_at) = updated_at {
                    item.updated_at = updated_at;
                }
                touched.push(item.clone());
            }
            Json(touched).into_response()
        }
        Method::DELETE => {
            let (removed, kept): (Vec<_>, Vec<_>) = rows
                .drain(..)
                .partition(|item| FakePostgrest::matches(item, &query));
            *rows = kept;
            Json(removed).into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Delegates to a real store but fails updates for chosen ids and counts
/// every call that reaches it.
pub(crate) struct FlakyStore<S> {
    pub inner: S,
    pub fail_updates_for: HashSet<GalleryItemId>,
    pub fail_lists: bool,
    pub calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl<S> FlakyStore<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            fail_updates_for: HashSet::new(),
            fail_lists: false,
            calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_updates(mut self, ids: &[i64]) -> Self {
        self.fail_updates_for = ids.iter().copied().map(GalleryItemId).collect();
        self
    }

    pub(crate) fn failing_lists(mut self) -> Self {
        self.fail_lists = true;
        self
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: GalleryStore> GalleryStore for FlakyStore<S> {
    async fn list_items(&self, active_only: bool) -> Result<Vec<GalleryItem>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists {
            return Err(StoreError::Transport("connection reset by peer".into()));
        }
        self.inner.list_items(active_only).await
    }

    async fn get_item(&self, id: GalleryItemId) -> Result<GalleryItem, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_item(id).await
    }

    async fn max_display_order(&self) -> Result<Option<i64>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.max_display_order().await
    }

    async fn insert_item(&self, row: NewGalleryRow) -> Result<GalleryItem, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_item(row).await
    }

    async fn update_item(
        &self,
        id: GalleryItemId,
        changes: &GalleryUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<GalleryItem, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates_for.contains(&id) {
            return Err(StoreError::Rejected(format!("row {} is locked", id.0)));
        }
        self.inner.update_item(id, changes, updated_at).await
    }

    async fn delete_item(&self, id: GalleryItemId) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_item(id).await
    }
}

/// Holds every update for a short while and records how many were running
/// at the same time.
pub(crate) struct SlowStore<S> {
    pub inner: S,
    pub delay: std::time::Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl<S> SlowStore<S> {
    pub(crate) fn new(inner: S, delay: std::time::Duration) -> Self {
        Self {
            inner,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: GalleryStore> GalleryStore for SlowStore<S> {
    async fn list_items(&self, active_only: bool) -> Result<Vec<GalleryItem>, StoreError> {
        self.inner.list_items(active_only).await
    }

    async fn get_item(&self, id: GalleryItemId) -> Result<GalleryItem, StoreError> {
        self.inner.get_item(id).await
    }

    async fn max_display_order(&self) -> Result<Option<i64>, StoreError> {
        self.inner.max_display_order().await
    }

    async fn insert_item(&self, row: NewGalleryRow) -> Result<GalleryItem, StoreError> {
        self.inner.insert_item(row).await
    }

    async fn update_item(
        &self,
        id: GalleryItemId,
        changes: &GalleryUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<GalleryItem, StoreError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.update_item(id, changes, updated_at).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_item(&self, id: GalleryItemId) -> Result<(), StoreError> {
        self.inner.delete_item(id).await
    }
}
