//! Gallery table hosted by Supabase, spoken to through its PostgREST
//! interface (`/rest/v1/<table>`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use shared::domain::{GalleryItem, GalleryItemId, GalleryUpdate};
use storage::{GalleryStore, NewGalleryRow, StoreError};
use tracing::debug;
use url::Url;

const PRESENTATION_ORDER: &str = "display_order.asc,created_at.desc";
const RETURN_REPRESENTATION: &str = "return=representation";

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisplayOrderRow {
    display_order: Option<i64>,
}

pub struct SupabaseGalleryStore {
    http: Client,
    table_url: Url,
    api_key: String,
}

impl SupabaseGalleryStore {
    pub fn new(project_url: &Url, api_key: impl Into<String>, table: &str) -> Result<Self, url::ParseError> {
        Self::with_http_client(Client::new(), project_url, api_key, table)
    }

    pub fn with_http_client(
        http: Client,
        project_url: &Url,
        api_key: impl Into<String>,
        table: &str,
    ) -> Result<Self, url::ParseError> {
        let mut base = project_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let table_url = base.join(&format!("rest/v1/{table}"))?;
        Ok(Self {
            http,
            table_url,
            api_key: api_key.into(),
        })
    }

    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.http
            .request(method, self.table_url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|error| StoreError::Transport(error.to_string()))?;

    if !status.is_success() {
        return Err(rejection(status, &body));
    }
    serde_json::from_slice(&body).map_err(|error| StoreError::Unexpected(error.to_string()))
}

fn rejection(status: StatusCode, body: &[u8]) -> StoreError {
    match serde_json::from_slice::<PostgrestErrorBody>(body) {
        Ok(PostgrestErrorBody {
            message: Some(message),
            code,
            details,
        }) => {
            debug!(
                status = status.as_u16(),
                code = code.as_deref().unwrap_or_default(),
                details = details.as_deref().unwrap_or_default(),
                "postgrest: request rejected"
            );
            StoreError::Rejected(message)
        }
        _ if status.is_server_error() => StoreError::Transport(format!("HTTP {status}")),
        _ => StoreError::Rejected(format!("request rejected with HTTP {status}")),
    }
}

fn id_filter(id: GalleryItemId) -> (&'static str, String) {
    ("id", format!("eq.{}", id.0))
}

fn single(rows: Vec<GalleryItem>, id: GalleryItemId) -> Result<GalleryItem, StoreError> {
    rows.into_iter().next().ok_or(StoreError::NotFound(id))
}

#[async_trait]
impl GalleryStore for SupabaseGalleryStore {
    async fn list_items(&self, active_only: bool) -> Result<Vec<GalleryItem>, StoreError> {
        let mut query = vec![("select", "*".to_string())];
        if active_only {
            query.push(("is_active", "eq.true".to_string()));
        }
        query.push(("order", PRESENTATION_ORDER.to_string()));
        self.send(self.request(Method::GET).query(&query)).await
    }

    async fn get_item(&self, id: GalleryItemId) -> Result<GalleryItem, StoreError> {
        let rows = self
            .send(
                self.request(Method::GET)
                    .query(&[("select", "*".to_string()), id_filter(id)]),
            )
            .await?;
        single(rows, id)
    }

    async fn max_display_order(&self) -> Result<Option<i64>, StoreError> {
        let rows: Vec<DisplayOrderRow> = self
            .send(self.request(Method::GET).query(&[
                ("select", "display_order"),
                ("order", "display_order.desc.nullslast"),
                ("limit", "1"),
            ]))
            .await?;
        // A column holding only nulls counts as an empty table.
        Ok(rows.first().and_then(|row| row.display_order))
    }

    async fn insert_item(&self, row: NewGalleryRow) -> Result<GalleryItem, StoreError> {
        let rows: Vec<GalleryItem> = self
            .send(
                self.request(Method::POST)
                    .header("Prefer", RETURN_REPRESENTATION)
                    .json(&[row]),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Unexpected("insert returned no row".to_string()))
    }

    async fn update_item(
        &self,
        id: GalleryItemId,
        changes: &GalleryUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<GalleryItem, StoreError> {
        let mut body = serde_json::to_value(changes)
            .map_err(|error| StoreError::Unexpected(error.to_string()))?;
        if let Some(fields) = body.as_object_mut() {
            fields.insert("updated_at".to_string(), serde_json::json!(updated_at));
        }
        let rows = self
            .send(
                self.request(Method::PATCH)
                    .query(&[id_filter(id)])
                    .header("Prefer", RETURN_REPRESENTATION)
                    .json(&body),
            )
            .await?;
        single(rows, id)
    }

    async fn delete_item(&self, id: GalleryItemId) -> Result<(), StoreError> {
        let rows = self
            .send(
                self.request(Method::DELETE)
                    .query(&[id_filter(id)])
                    .header("Prefer", RETURN_REPRESENTATION),
            )
            .await?;
        single(rows, id).map(|_| ())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let _: Vec<serde_json::Value> = self
            .send(
                self.request(Method::GET)
                    .query(&[("select", "id"), ("limit", "1")]),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/postgrest_tests.rs"]
mod tests;
