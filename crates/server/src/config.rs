use std::{collections::HashMap, path::Path};

use anyhow::{bail, Context};
use config::{Config, Environment, File, FileFormat, Map};
use gallery_core::{StoreTarget, DEFAULT_REORDER_CONCURRENCY, IMGBB_UPLOAD_URL};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "gallery.toml";
const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_DATABASE_URL: &str = "sqlite://./data/gallery.db";

/// Plain variable names accepted for compatibility; `APP__*` wins when both
/// are set.
const LEGACY_ENV: [(&str, &str); 5] = [
    ("SERVER_BIND", "APP__BIND_ADDR"),
    ("DATABASE_URL", "APP__DATABASE_URL"),
    ("SUPABASE_URL", "APP__SUPABASE_URL"),
    ("SUPABASE_ANON_KEY", "APP__SUPABASE_KEY"),
    ("IMGBB_API_KEY", "APP__IMGBB_API_KEY"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Sqlite,
    Supabase,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub store: StoreKind,
    pub database_url: String,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_key: Option<String>,
    pub gallery_table: String,
    #[serde(default)]
    pub imgbb_api_key: Option<String>,
    pub imgbb_endpoint: String,
    pub reorder_concurrency: usize,
}

impl Settings {
    pub fn store_target(&self) -> anyhow::Result<StoreTarget> {
        match self.store {
            StoreKind::Sqlite => Ok(StoreTarget::Sqlite {
                database_url: normalize_database_url(&self.database_url),
            }),
            StoreKind::Supabase => {
                let Some(raw_url) = non_blank(self.supabase_url.as_deref()) else {
                    bail!("store = \"supabase\" requires supabase_url (or SUPABASE_URL)");
                };
                let Some(api_key) = non_blank(self.supabase_key.as_deref()) else {
                    bail!("store = \"supabase\" requires supabase_key (or SUPABASE_ANON_KEY)");
                };
                let project_url = Url::parse(raw_url)
                    .with_context(|| format!("invalid supabase_url '{raw_url}'"))?;
                Ok(StoreTarget::Supabase {
                    project_url,
                    api_key: api_key.to_string(),
                    table: self.gallery_table.clone(),
                })
            }
        }
    }

    pub fn imgbb_api_key(&self) -> Option<&str> {
        non_blank(self.imgbb_api_key.as_deref())
    }

    pub fn imgbb_endpoint_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.imgbb_endpoint)
            .with_context(|| format!("invalid imgbb_endpoint '{}'", self.imgbb_endpoint))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_settings_from(Path::new(SETTINGS_FILE), &env)
}

/// Defaults, then the optional settings file, then legacy variables, then
/// `APP__*` variables.
pub(crate) fn load_settings_from(
    file: &Path,
    env: &HashMap<String, String>,
) -> anyhow::Result<Settings> {
    let settings = Config::builder()
        .set_default("bind_addr", DEFAULT_BIND)?
        .set_default("store", "sqlite")?
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("gallery_table", storage::GALLERY_TABLE)?
        .set_default("imgbb_endpoint", IMGBB_UPLOAD_URL)?
        .set_default("reorder_concurrency", DEFAULT_REORDER_CONCURRENCY as u64)?
        .add_source(File::from(file).format(FileFormat::Toml).required(false))
        .add_source(app_environment(legacy_overrides(env)))
        .add_source(app_environment(
            env.iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ))
        .build()
        .with_context(|| format!("failed to load settings from {}", file.display()))?;

    settings
        .try_deserialize()
        .context("invalid gallery server settings")
}

fn app_environment(source: Map<String, String>) -> Environment {
    Environment::with_prefix("APP")
        .separator("__")
        .source(Some(source))
}

fn legacy_overrides(env: &HashMap<String, String>) -> Map<String, String> {
    let mut overrides: Map<String, String> = LEGACY_ENV
        .iter()
        .filter_map(|(legacy, key)| {
            env.get(*legacy)
                .map(|value| ((*key).to_string(), value.clone()))
        })
        .collect();
    // A Supabase project in the environment means the hosted table is wanted.
    if non_blank(env.get("SUPABASE_URL").map(String::as_str)).is_some() {
        overrides.insert("APP__STORE".to_string(), "supabase".to_string());
    }
    overrides
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }
    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }
    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        return sqlite_url_for(path);
    }
    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return sqlite_url_for(path);
    }
    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    sqlite_url_for(raw_database_url)
}

fn sqlite_url_for(path: &str) -> String {
    let path = path.replace('\\', "/");
    if has_drive_letter(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
