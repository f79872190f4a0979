use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{GalleryItem, GalleryItemId, GalleryUpdate};

mod store;

pub use store::{GalleryStore, NewGalleryRow, StoreError, GALLERY_TABLE};

const ITEM_COLUMNS: &str =
    "id, title, description, image_url, alt_text, display_order, is_active, created_at, updated_at";

/// SQLite-backed gallery table, used for local development and tests.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own empty database.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

fn item_from_row(row: &SqliteRow) -> Result<GalleryItem, sqlx::Error> {
    Ok(GalleryItem {
        id: GalleryItemId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        alt_text: row.try_get("alt_text")?,
        display_order: row.try_get("display_order")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Transport(error.to_string())
        }
        other => StoreError::Unexpected(other.to_string()),
    }
}

fn not_found_or(id: GalleryItemId) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |error| match error {
        sqlx::Error::RowNotFound => StoreError::NotFound(id),
        other => map_sqlx_error(other),
    }
}

#[async_trait]
impl GalleryStore for Storage {
    async fn list_items(&self, active_only: bool) -> Result<Vec<GalleryItem>, StoreError> {
        let sql = if active_only {
            format!(
                "SELECT {ITEM_COLUMNS} FROM {GALLERY_TABLE}
                 WHERE is_active = 1
                 ORDER BY display_order ASC, created_at DESC"
            )
        } else {
            format!(
                "SELECT {ITEM_COLUMNS} FROM {GALLERY_TABLE}
                 ORDER BY display_order ASC, created_at DESC"
            )
        };
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx_error)
    }

    async fn get_item(&self, id: GalleryItemId) -> Result<GalleryItem, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM {GALLERY_TABLE} WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(id))?;
        item_from_row(&row).map_err(map_sqlx_error)
    }

    async fn max_display_order(&self) -> Result<Option<i64>, StoreError> {
        sqlx::query_scalar::<_, Option<i64>>(&format!(
            "SELECT MAX(display_order) FROM {GALLERY_TABLE}"
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert_item(&self, row: NewGalleryRow) -> Result<GalleryItem, StoreError> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO {GALLERY_TABLE}
                (title, description, image_url, alt_text, display_order, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&row.title)
        .bind(row.description.as_deref())
        .bind(&row.image_url)
        .bind(&row.alt_text)
        .bind(row.display_order)
        .bind(row.is_active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        let item = item_from_row(&inserted).map_err(map_sqlx_error)?;
        debug!(item_id = item.id.0, display_order = item.display_order, "sqlite: gallery item inserted");
        Ok(item)
    }

    async fn update_item(
        &self,
        id: GalleryItemId,
        changes: &GalleryUpdate,
        updated_at: DateTime<Utc>,
    ) -> Result<GalleryItem, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("UPDATE {GALLERY_TABLE} SET updated_at = "));
        query.push_bind(updated_at);
        if let Some(title) = &changes.title {
            query.push(", title = ").push_bind(title.clone());
        }
        if let Some(description) = &changes.description {
            query.push(", description = ").push_bind(description.clone());
        }
        if let Some(alt_text) = &changes.alt_text {
            query.push(", alt_text = ").push_bind(alt_text.clone());
        }
        if let Some(display_order) = changes.display_order {
            query.push(", display_order = ").push_bind(display_order);
        }
        if let Some(is_active) = changes.is_active {
            query.push(", is_active = ").push_bind(is_active);
        }
        query.push(" WHERE id = ").push_bind(id.0);
        query.push(format!(" RETURNING {ITEM_COLUMNS}"));

        let row = query
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or(id))?;
        item_from_row(&row).map_err(map_sqlx_error)
    }

    async fn delete_item(&self, id: GalleryItemId) -> Result<(), StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {GALLERY_TABLE} WHERE id = ?"))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.ping()
            .await
            .map_err(|error| StoreError::Transport(format!("{error:#}")))
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
