//! csvload Server - Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use csvload_common::logging::{init_logging, LogConfig};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

use csvload_server::{
    api::{self, AppState},
    config::Config,
    db,
    features::FeatureState,
    ingest::{FailurePolicy, IngestOrchestrator, PgRowInserter},
    storage::UploadStore,
};

#[derive(Parser, Debug)]
#[command(name = "csvload-server")]
#[command(author, version, about = "Load delimited files into PostgreSQL", long_about = None)]
struct Cli {
    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve,

    /// Load one local file through the ingestion pipeline and exit
    Load {
        /// Path to the delimited file
        file: PathBuf,

        /// Number of insert workers (overrides INGEST_WORKERS)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip rows that fail to insert instead of aborting
        #[arg(long)]
        skip_failed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("csvload-server")
        .filter_directives("csvload_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let mut config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Load {
            file,
            workers,
            skip_failed,
        } => {
            if let Some(workers) = workers {
                config.ingest.workers = workers;
            }
            if skip_failed {
                config.ingest.on_failure = FailurePolicy::SkipRow;
            }
            config.validate()?;
            load(config, file).await
        },
    }
}

async fn connect(config: &Config) -> Result<(sqlx::PgPool, IngestOrchestrator)> {
    let pool = db::create_pool(&db::DbConfig::try_from(&config.database)?).await?;
    info!("Database connection pool established");

    db::run_migrations(&pool).await?;

    let schema = Arc::new(config.ingest.schema()?);
    let inserter = Arc::new(PgRowInserter::new(pool.clone(), schema.clone()));
    let orchestrator = IngestOrchestrator::new(config.ingest.clone(), schema, inserter);

    Ok((pool, orchestrator))
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting csvload server");

    let (pool, orchestrator) = connect(&config).await?;

    let store = UploadStore::new(&config.upload.dir);
    store.ensure_dir().await?;
    info!(dir = %store.dir().display(), "Upload store ready");

    let state = AppState {
        db: pool,
        features: FeatureState {
            orchestrator,
            store,
        },
    };

    api::serve(config, state).await
}

async fn load(config: Config, file: PathBuf) -> Result<()> {
    let (_pool, orchestrator) = connect(&config).await?;

    let report = orchestrator.run_file(&file).await?;
    info!(
        file = %file.display(),
        rows = report.rows_inserted,
        skipped = report.rows_skipped,
        "Load finished in {} seconds",
        report.elapsed_secs()
    );

    Ok(())
}
