use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gallery_core::{
    connect_store, format_file_size, image_host_from, GalleryAdminView, GalleryService,
    ImageUpload, NewImage, StoreTarget, DEFAULT_REORDER_CONCURRENCY, IMGBB_UPLOAD_URL,
};
use shared::{
    domain::{GalleryItem, GalleryItemId, GalleryUpdate, SortDirection, SortField, StatusFilter},
    protocol::{Notice, ViewQuery},
};
use url::Url;

#[derive(Parser, Debug)]
#[command(about = "Gallery administration from the command line")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/gallery.db")]
    database_url: String,
    /// Use the hosted Supabase table instead of the local database.
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<Url>,
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    supabase_key: Option<String>,
    #[arg(long, default_value = storage::GALLERY_TABLE)]
    table: String,
    #[arg(long, env = "IMGBB_API_KEY", hide_env_values = true)]
    imgbb_api_key: Option<String>,
    #[arg(long, default_value = IMGBB_UPLOAD_URL)]
    imgbb_endpoint: Url,
    #[arg(long, default_value_t = DEFAULT_REORDER_CONCURRENCY)]
    reorder_concurrency: usize,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List items with the admin view's search, filter and sort.
    List {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_enum, default_value_t = StatusArg::All)]
        status: StatusArg,
        #[arg(long, value_enum, default_value_t = SortArg::DisplayOrder)]
        sort: SortArg,
        #[arg(long)]
        desc: bool,
        /// Only what the public gallery shows.
        #[arg(long, conflicts_with = "status")]
        public: bool,
    },
    Show {
        id: i64,
    },
    /// Upload an image file and add it to the gallery.
    Upload {
        path: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        alt_text: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        display_order: Option<i64>,
    },
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        alt_text: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        display_order: Option<i64>,
    },
    Activate {
        id: i64,
    },
    Deactivate {
        id: i64,
    },
    /// Hide an item from the public gallery (soft delete).
    Delete {
        id: i64,
    },
    /// Remove an item permanently.
    Purge {
        id: i64,
    },
    /// Move DRAGGED into the slot held by TARGET and renumber.
    Reorder {
        dragged: i64,
        target: i64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusArg {
    All,
    Active,
    Inactive,
}

impl From<StatusArg> for StatusFilter {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::All => StatusFilter::All,
            StatusArg::Active => StatusFilter::Active,
            StatusArg::Inactive => StatusFilter::Inactive,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Title,
    CreatedAt,
    DisplayOrder,
}

impl From<SortArg> for SortField {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Title => SortField::Title,
            SortArg::CreatedAt => SortField::CreatedAt,
            SortArg::DisplayOrder => SortField::DisplayOrder,
        }
    }
}

impl Cli {
    fn store_target(&self) -> Result<StoreTarget> {
        match (&self.supabase_url, &self.supabase_key) {
            (Some(project_url), Some(api_key)) => Ok(StoreTarget::Supabase {
                project_url: project_url.clone(),
                api_key: api_key.clone(),
                table: self.table.clone(),
            }),
            (Some(_), None) => bail!("--supabase-url needs --supabase-key (or SUPABASE_ANON_KEY)"),
            _ => Ok(StoreTarget::Sqlite {
                database_url: self.database_url.clone(),
            }),
        }
    }
}

fn print_item(item: &GalleryItem) {
    let status = if item.is_active { "active" } else { "inactive" };
    println!(
        "{:>6}  {:>5}  {:<8}  {}",
        item.id.0, item.display_order, status, item.title
    );
}

fn finish(notice: Notice) -> Result<()> {
    if notice.is_success() {
        println!("{}", notice.message);
        Ok(())
    } else {
        bail!("{}", notice.message)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = connect_store(&cli.store_target()?).await?;
    let service = GalleryService::with_reorder_concurrency(store, cli.reorder_concurrency);
    let image_host = image_host_from(cli.imgbb_api_key.as_deref(), cli.imgbb_endpoint.clone());
    let mut view = GalleryAdminView::new(service.clone(), image_host);

    match cli.command {
        Command::List {
            search,
            status,
            sort,
            desc,
            public,
        } => {
            let items: Vec<GalleryItem> = if public {
                service
                    .list_active()
                    .await
                    .into_result()
                    .context("failed to list gallery")?
            } else {
                view.refresh().await.context("failed to list gallery")?;
                let query = ViewQuery {
                    search,
                    status: status.into(),
                    sort: sort.into(),
                    direction: if desc {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    },
                };
                view.visible(&query).into_iter().cloned().collect()
            };
            println!("{:>6}  {:>5}  {:<8}  title", "id", "order", "status");
            for item in &items {
                print_item(item);
            }
            if !public {
                let stats = view.stats();
                println!(
                    "showing {} of {} (active {}, inactive {})",
                    items.len(),
                    stats.total,
                    stats.active,
                    stats.inactive
                );
            }
        }
        Command::Show { id } => {
            let item = service
                .get(GalleryItemId(id))
                .await
                .into_result()
                .with_context(|| format!("failed to load gallery item {id}"))?;
            println!("id:            {}", item.id);
            println!("title:         {}", item.title);
            println!("alt text:      {}", item.alt_text);
            println!(
                "description:   {}",
                item.description.as_deref().unwrap_or("-")
            );
            println!("image:         {}", item.image_url);
            println!("display order: {}", item.display_order);
            println!("active:        {}", item.is_active);
            println!("created:       {}", item.created_at);
            println!("updated:       {}", item.updated_at);
        }
        Command::Upload {
            path,
            title,
            alt_text,
            description,
            display_order,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("image")
                .to_string();
            let content_type = mime_guess::from_path(&path)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string();
            eprintln!(
                "uploading {filename} ({content_type}, {})",
                format_file_size(bytes.len() as u64)
            );
            let notice = view
                .add_image(NewImage {
                    upload: ImageUpload::new(filename, content_type, bytes),
                    title,
                    alt_text,
                    description,
                    display_order,
                })
                .await;
            finish(notice)?;
        }
        Command::Edit {
            id,
            title,
            alt_text,
            description,
            display_order,
        } => {
            let changes = GalleryUpdate {
                title,
                description,
                alt_text,
                display_order,
                is_active: None,
            };
            finish(view.edit(GalleryItemId(id), changes).await)?;
        }
        Command::Activate { id } => finish(view.set_status(GalleryItemId(id), true).await)?,
        Command::Deactivate { id } => finish(view.set_status(GalleryItemId(id), false).await)?,
        Command::Delete { id } => finish(view.delete(GalleryItemId(id)).await)?,
        Command::Purge { id } => finish(view.purge(GalleryItemId(id)).await)?,
        Command::Reorder { dragged, target } => {
            view.refresh().await.context("failed to load gallery")?;
            finish(
                view.reorder(GalleryItemId(dragged), GalleryItemId(target))
                    .await,
            )?;
            for item in view.items() {
                print_item(item);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
