//! picsync: mirror Google Photos and SmugMug albums into Nixplay.

mod googlephotos;
mod http;
mod nixplay;
mod smugmug;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use futures::StreamExt;
use googlephotos::GooglePhotosClient;
use nixplay::NixplayClient;
use picsync_core::config::{AppConfig, GooglePhotosConfig, NixplayConfig, SmugMugConfig};
use picsync_metadata::{ContentCache, EntryRepo, SCHEMA_VERSION};
use picsync_sync::{
    AlbumPair, CatalogEvent, DestinationApi, DestinationCatalog, Pipeline, RunLoop, RunMode,
    RunSummary, SourceApi, SourceCatalog,
};
use smugmug::SmugMugClient;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "picsync")]
#[command(about = "Mirror Google Photos and SmugMug albums into Nixplay")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "PICSYNC_CONFIG",
        default_value = "picsync.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every configured album pair
    Sync {
        /// Run a single pass even if sync.every is set
        #[arg(long, default_value_t = false)]
        once: bool,
        /// Log the work list for every album without changing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Content cache commands
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Destination (Nixplay) commands
    Destination {
        #[command(subcommand)]
        command: DestinationCommands,
    },
    /// Source (Google Photos, SmugMug) commands
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cached entry counts per source service
    Status,
}

#[derive(Subcommand)]
enum DestinationCommands {
    /// List destination albums
    Albums,
    /// Delete destination albums by name
    DeleteAlbum {
        /// Album name
        name: String,
        /// Delete every album with this name instead of refusing
        #[arg(long, default_value_t = false)]
        delete_multiple: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceService {
    Googlephotos,
    Smugmug,
}

#[derive(Subcommand)]
enum SourceCommands {
    /// List the items of a source album
    List {
        /// Google Photos album id or SmugMug album key
        album_id: String,
        /// Service hosting the album
        #[arg(long, value_enum, default_value_t = SourceService::Googlephotos)]
        service: SourceService,
        /// Download and hash uncached items, filling the content cache
        #[arg(long, default_value_t = false)]
        update_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { once, dry_run } => handle_sync(&config, once, dry_run).await,
        Commands::Cache { command } => handle_cache_command(command, &config).await,
        Commands::Destination { command } => handle_destination_command(command, &config).await,
        Commands::Source { command } => handle_source_command(command, &config).await,
    }
}

/// Merge the optional config file with `PICSYNC_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        tracing::debug!(config_path = %path, "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("no config file found at {}", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("PICSYNC_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let warnings = config.validate().context("invalid configuration")?;
    for warning in warnings {
        tracing::warn!("{warning}");
    }
    Ok(config)
}

fn googlephotos_config(config: &AppConfig) -> Result<&GooglePhotosConfig> {
    config
        .googlephotos
        .as_ref()
        .context("missing [googlephotos] configuration")
}

fn smugmug_config(config: &AppConfig) -> Result<&SmugMugConfig> {
    config
        .smugmug
        .as_ref()
        .context("missing [smugmug] configuration")
}

fn nixplay_config(config: &AppConfig) -> Result<&NixplayConfig> {
    config
        .nixplay
        .as_ref()
        .context("missing [nixplay] configuration")
}

fn source_api(config: &AppConfig, service: SourceService) -> Result<Arc<dyn SourceApi>> {
    let api: Arc<dyn SourceApi> = match service {
        SourceService::Googlephotos => {
            Arc::new(GooglePhotosClient::new(googlephotos_config(config)?)?)
        }
        SourceService::Smugmug => Arc::new(SmugMugClient::new(smugmug_config(config)?)?),
    };
    Ok(api)
}

/// Every source service with a configuration section.
fn configured_sources(config: &AppConfig) -> Result<Vec<Arc<dyn SourceApi>>> {
    let mut sources = Vec::new();
    if config.googlephotos.is_some() {
        sources.push(source_api(config, SourceService::Googlephotos)?);
    }
    if config.smugmug.is_some() {
        sources.push(source_api(config, SourceService::Smugmug)?);
    }
    Ok(sources)
}

fn destination_api(config: &AppConfig) -> Result<Arc<dyn DestinationApi>> {
    let client = NixplayClient::new(nixplay_config(config)?)?;
    Ok(Arc::new(client))
}

async fn open_cache(config: &AppConfig) -> Result<Arc<dyn ContentCache>> {
    picsync_metadata::from_config(&config.cache)
        .await
        .with_context(|| format!("failed to open cache at {}", config.cache.path.display()))
}

async fn handle_sync(config: &AppConfig, once: bool, dry_run: bool) -> Result<()> {
    if config.albums.is_empty() {
        anyhow::bail!("no albums configured; add at least one [[albums]] entry");
    }

    let mut sources = configured_sources(config)?.into_iter();
    let first = sources
        .next()
        .context("no source service configured; add [googlephotos] or [smugmug]")?;
    let destination = destination_api(config)?;
    let cache = open_cache(config).await?;

    let pipeline = sources
        .fold(Pipeline::new(first, destination, cache), Pipeline::with_source)
        .with_ingest_delay(config.sync.ingest_delay);

    let pairs: Vec<AlbumPair> = config
        .albums
        .iter()
        .map(|album| {
            let mut pair = AlbumPair::from(album);
            pair.dry_run |= dry_run;
            pair
        })
        .collect();

    let mode = if once {
        RunMode::Once
    } else {
        RunMode::from_interval(config.sync.every)
    };

    tracing::info!(
        albums = pairs.len(),
        mode = ?mode,
        dry_run,
        "picsync v{}",
        env!("CARGO_PKG_VERSION")
    );

    let runloop = RunLoop::new(pipeline, pairs, mode);
    let summary = runloop
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    print_summary(&summary);
    // Interval runs log failed pairs each pass and exit cleanly on shutdown.
    if mode == RunMode::Once {
        summary.check()?;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        match &outcome.report {
            Some(report) => println!(
                "{}: {} uploaded, {} deleted, {} failed",
                outcome.album,
                report.uploaded,
                report.deleted,
                report.failed_items()
            ),
            None if outcome.guard_tripped => {
                println!("{}: skipped (sources empty)", outcome.album)
            }
            None => println!(
                "{}: would upload {}, would delete {}",
                outcome.album, outcome.planned_uploads, outcome.planned_deletes
            ),
        }
    }
    for (album, error) in &summary.failures {
        println!("{album}: failed: {error}");
    }
}

async fn handle_cache_command(command: CacheCommands, config: &AppConfig) -> Result<()> {
    match command {
        CacheCommands::Status => {
            let cache = open_cache(config).await?;
            let version = cache.schema_version().await?;
            let status = cache.status().await?;

            println!("Cache: {}", config.cache.path.display());
            println!("Schema version: {version} (supported: {SCHEMA_VERSION})");
            if status.entries.is_empty() {
                println!("No entries.");
            }
            for (namespace, count) in &status.entries {
                println!("  {namespace}: {count}");
            }
            println!("Total: {}", status.total());
        }
    }
    Ok(())
}

async fn handle_destination_command(
    command: DestinationCommands,
    config: &AppConfig,
) -> Result<()> {
    let catalog = DestinationCatalog::new(destination_api(config)?);

    match command {
        DestinationCommands::Albums => {
            let albums = catalog.api().list_albums().await?;
            if albums.is_empty() {
                println!("No albums found.");
            }
            for album in albums {
                match album.item_count {
                    Some(count) => println!("{}\t{}\t{} items", album.id, album.name, count),
                    None => println!("{}\t{}", album.id, album.name),
                }
            }
        }
        DestinationCommands::DeleteAlbum {
            name,
            delete_multiple,
        } => {
            let deleted = catalog
                .delete_albums_by_name(&name, delete_multiple)
                .await
                .with_context(|| format!("failed to delete album '{name}'"))?;
            println!("Deleted {deleted} album(s) named '{name}'");
        }
    }
    Ok(())
}

async fn handle_source_command(command: SourceCommands, config: &AppConfig) -> Result<()> {
    match command {
        SourceCommands::List {
            album_id,
            service,
            update_cache,
        } => {
            let api = source_api(config, service)?;
            if update_cache {
                let cache = open_cache(config).await?;
                let catalog = SourceCatalog::new(api, cache);
                let mut stream = catalog.fetch_album(&album_id);
                while let Some(event) = stream.next().await {
                    if let CatalogEvent::Item { item, outcome } = event? {
                        println!(
                            "{}\t{}\t{}\t{:?}",
                            item.remote_id, item.filename, item.content_hash, outcome
                        );
                    }
                }
            } else {
                let mut token: Option<String> = None;
                loop {
                    let page = api.list_album(&album_id, token.as_deref()).await?;
                    for item in page.items {
                        println!("{}\t{}", item.remote_id, item.filename);
                    }
                    match page.next_page_token.filter(|t| !t.is_empty()) {
                        Some(next) => token = Some(next),
                        None => break,
                    }
                }
            }
        }
    }
    Ok(())
}
