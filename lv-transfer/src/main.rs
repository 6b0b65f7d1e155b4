//! lv-transfer - Region/business transfer service
//!
//! Runs the admin HTTP API (`serve`) or performs one transfer operation
//! from the command line against the same database and storage directory.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lv_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use lv_common::BusinessStatus;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use lv_transfer::models::{ExportFilters, ImportOptions, IngestOptions};
use lv_transfer::services::{
    parse_archive, spawn_geocode_worker, CsvIngester, ExportService, GeocodeQueue, Geocoder,
    ImportReconciler, NominatimClient,
};
use lv_transfer::storage::ArchiveStorage;
use lv_transfer::AppState;

/// Command-line arguments for lv-transfer
#[derive(Parser, Debug)]
#[command(name = "lv-transfer")]
#[command(about = "Local Voices region/business transfer service")]
#[command(version)]
struct Cli {
    /// Configuration file (default: `LV_CONFIG`, then the platform config file)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database and transfer files
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Count the businesses an export would contain
    Preview(FilterArgs),
    /// Write an export archive
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        /// Output path (default: a new file in the storage directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Summarize an archive without touching the database
    Inspect { archive: PathBuf },
    /// Import an archive
    Import {
        archive: PathBuf,
        /// Reuse archive ids for created records
        #[arg(long)]
        preserve_uuids: bool,
        /// Import businesses whose google_place_id already exists
        #[arg(long)]
        allow_duplicates: bool,
        /// Commit every write separately
        #[arg(long)]
        no_transaction: bool,
    },
    /// Create regions from a community CSV
    IngestCsv {
        csv: PathBuf,
        /// Geocode created regions before exiting
        #[arg(long)]
        geocode: bool,
        #[arg(long)]
        mark_active: bool,
        #[arg(long)]
        store_metadata: bool,
        #[arg(long)]
        parent_region_id: Option<Uuid>,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Only businesses associated with this region
    #[arg(long)]
    region_id: Option<Uuid>,
    /// Only businesses with this status
    #[arg(long)]
    status: Option<BusinessStatus>,
}

impl From<&FilterArgs> for ExportFilters {
    fn from(args: &FilterArgs) -> Self {
        ExportFilters {
            region_id: args.region_id,
            status: args.status.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TomlConfig::load_default(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &config.logging.level;
                format!("lv_transfer={level},lv_common={level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        build_timestamp = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "lv-transfer starting"
    );

    let root_folder = RootFolderResolver::new("lv-transfer")
        .with_cli_arg(cli.root_folder.clone())
        .with_toml_config(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .with_context(|| format!("Failed to initialize root folder {}", initializer.root_folder().display()))?;
    info!("Root folder: {}", initializer.root_folder().display());

    let storage = ArchiveStorage::new(initializer.storage_path());

    // Inspect never opens the database
    if let Command::Inspect { archive } = &cli.command {
        let parsed = parse_archive(archive).with_context(|| format!("Failed to parse {}", archive.display()))?;
        return print_json(&parsed.summary());
    }

    let db = lv_common::db::init::init_database(&initializer.database_path())
        .await
        .context("Failed to open database")?;

    match cli.command {
        Command::Serve { host, port } => serve(db, storage, &config, host, port).await,
        Command::Preview(filters) => {
            let count = ExportService::new(db).preview(&ExportFilters::from(&filters)).await?;
            print_json(&serde_json::json!({ "count": count }))
        }
        Command::Export {
            filters,
            output,
            chunk_size,
        } => {
            let dest = match output {
                Some(path) => path,
                None => {
                    storage.ensure_exists().context("Failed to create storage directory")?;
                    storage.new_export_path(lv_common::time::now())
                }
            };
            let report = ExportService::new(db)
                .export_to_file(
                    &ExportFilters::from(&filters),
                    &dest,
                    chunk_size.unwrap_or(config.transfer.chunk_size),
                )
                .await?;
            info!("Archive written to {}", dest.display());
            print_json(&report)
        }
        Command::Import {
            archive,
            preserve_uuids,
            allow_duplicates,
            no_transaction,
        } => {
            let parsed = parse_archive(&archive).with_context(|| format!("Failed to parse {}", archive.display()))?;
            let options = ImportOptions {
                preserve_uuids,
                skip_duplicates: !allow_duplicates,
                transactional: config.transfer.transactional_import && !no_transaction,
            };
            let summary = ImportReconciler::new(db).import(&parsed, &options).await?;
            print_json(&summary)
        }
        Command::IngestCsv {
            csv,
            geocode,
            mark_active,
            store_metadata,
            parent_region_id,
        } => {
            let options = IngestOptions {
                enable_geocoding: geocode,
                mark_active,
                store_metadata,
                parent_region_id,
            };
            ingest_csv(db, &config, &csv, options).await
        }
        Command::Inspect { .. } => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Start the geocoding worker if enabled in the configuration
fn start_geocoding(db: &SqlitePool, config: &TomlConfig) -> Result<Option<(GeocodeQueue, JoinHandle<()>)>> {
    if !config.geocoding.enabled {
        info!("Geocoding disabled");
        return Ok(None);
    }

    let client: Arc<dyn Geocoder> =
        Arc::new(NominatimClient::new(&config.geocoding).context("Failed to build geocoding client")?);
    let (queue, receiver) = GeocodeQueue::channel();
    let worker = spawn_geocode_worker(db.clone(), client, receiver);
    info!(base_url = %config.geocoding.base_url, "Geocoding worker started");

    Ok(Some((queue, worker)))
}

async fn ingest_csv(db: SqlitePool, config: &TomlConfig, csv: &Path, options: IngestOptions) -> Result<()> {
    let geocoding = if options.enable_geocoding {
        start_geocoding(&db, config)?
    } else {
        None
    };
    let (queue, worker) = match geocoding {
        Some((queue, worker)) => (Some(queue), Some(worker)),
        None => (None, None),
    };

    let ingester = CsvIngester::new(db, queue);
    let summary = ingester.ingest_file(csv, &options).await?;
    print_json(&summary)?;

    // Dropping the last queue handle lets the worker finish the backlog and exit
    drop(ingester);
    if let Some(worker) = worker {
        info!(tasks = summary.geocoding_enqueued, "Waiting for geocoding to finish");
        worker.await.context("Geocoding worker failed")?;
    }

    Ok(())
}

async fn serve(
    db: SqlitePool,
    storage: ArchiveStorage,
    config: &TomlConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    storage.ensure_exists().context("Failed to create storage directory")?;

    let allowlist = config.admin_allowlist();
    if allowlist.is_empty() {
        tracing::warn!("admin_emails is empty; every admin request will be rejected");
    }

    let geocoding = start_geocoding(&db, config)?;
    let (queue, worker) = match geocoding {
        Some((queue, worker)) => (Some(queue), Some(worker)),
        None => (None, None),
    };

    let state = AppState::new(db, storage, allowlist, queue, config.transfer.clone());
    let app = lv_transfer::build_router(state);

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(worker) = worker {
        worker.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
