//! Logviewer Ingest - upload ingestion service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logviewer_common::logging::{init_logging, LogConfig, LogLevel};
use logviewer_ingest::{
    ingest_files, Broker, BrokerConfig, InMemoryStore, IngestConfig, PgRecordStore, RecordStore,
    Worker,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "logviewer-ingest")]
#[command(author, version, about = "Log upload ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process staged uploads until interrupted
    Serve,

    /// Queue local CSV files and wait until they are processed
    Ingest {
        /// CSV files (`timestamp,service,severity,message`, no header)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Validate and count records without writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("logviewer-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::load().context("Failed to load configuration")?;
    info!(
        staging_dir = %config.staging.dir.display(),
        max_queue_size = config.queue.max_queue_size,
        batch_size = config.queue.batch_size,
        "Configuration loaded"
    );

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::Ingest {
            files,
            dry_run,
            json,
        } => ingest(&config, files, dry_run, json).await,
    }
}

async fn serve(config: &IngestConfig) -> Result<()> {
    let store = connect_store(config).await?;
    let broker = Broker::open(BrokerConfig::from(config)).await?;
    info!(recovered = broker.size(), "Staging directory recovered");

    let worker = Worker::new(broker.clone(), store, config.queue.batch_size);
    worker.start();

    shutdown_signal().await;

    worker.stop();
    if broker.size() > 0 {
        warn!(
            pending = broker.size(),
            "Uploads left in staging; they will be recovered on next start"
        );
    }

    info!("Ingest service shut down");
    Ok(())
}

async fn ingest(
    config: &IngestConfig,
    files: Vec<PathBuf>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let store: Arc<dyn RecordStore> = if dry_run {
        info!("Dry run: records are validated but not stored");
        Arc::new(InMemoryStore::new())
    } else {
        connect_store(config).await?
    };

    let summary = ingest_files(config, store, &files, dry_run).await?;

    let stats = summary.stats;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Files processed:   {}", stats.files_processed);
        println!("Files failed:      {}", stats.files_failed);
        println!("Records stored:    {}", stats.records_stored);
        println!("Rows rejected:     {}", stats.rows_rejected);
        if dry_run {
            println!("(dry run, nothing was written to the database)");
        }
    }

    if !summary.rejected.is_empty() {
        anyhow::bail!(
            "{} of {} files could not be queued",
            summary.rejected.len(),
            files.len()
        );
    }

    info!("Ingestion complete");
    Ok(())
}

async fn connect_store(config: &IngestConfig) -> Result<Arc<dyn RecordStore>> {
    let store = PgRecordStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;
    Ok(Arc::new(store))
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
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
