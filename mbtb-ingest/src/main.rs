//! mbtb-ingest - command-line entry point
//!
//! Wires configuration, logging and the ingestion pipeline. Every command
//! prints its JSON response to stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mbtb_common::config::{resolve_database_path, TomlConfig};
use mbtb_common::db::{init_database, lookups, LookupKind};
use mbtb_ingest::db::specimens;
use mbtb_ingest::{pipeline, CsvSource, DeleteResponse, IngestMode, IngestResponse};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for mbtb-ingest
#[derive(Parser, Debug)]
#[command(name = "mbtb-ingest")]
#[command(about = "Biobank specimen registry ingestion")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ~/.config/mbtb/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, global = true, env = "MBTB_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a CSV file (creates new specimens, updates existing ones)
    Upload { file: PathBuf },
    /// Insert one specimen from a JSON payload
    Insert { payload: PathBuf },
    /// Edit the specimen with surrogate id GUID from a JSON payload
    Edit { guid: Uuid, payload: PathBuf },
    /// Delete a specimen and its other details
    Delete { guid: Uuid },
    /// Show a specimen by identity code
    Show { code: String },
    /// Register a lookup value (tissue-type, autopsy-type, diagnosis)
    Lookup { kind: LookupKind, name: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = TomlConfig::load_or_default(args.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let settings = &config.ingest;

    let success = match args.command {
        Command::Upload { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let response = match CsvSource::new(&filename, &bytes) {
                Ok(source) => match pipeline::ingest_csv(&pool, &source, settings).await {
                    Ok(report) => IngestResponse::from_report(&report),
                    Err(failure) => IngestResponse::from_failure(&failure),
                },
                Err(err) => IngestResponse::from_error(&err),
            };
            print_json(&response)?;
            response.is_success()
        }
        Command::Insert { payload } => {
            let payload = read_payload(&payload)?;
            let response =
                match pipeline::ingest_structured(&pool, &payload, IngestMode::Insert, settings).await
                {
                    Ok(outcome) => IngestResponse::from_outcome(&outcome),
                    Err(err) => IngestResponse::from_error(&err),
                };
            print_json(&response)?;
            response.is_success()
        }
        Command::Edit { guid, payload } => {
            let payload = read_payload(&payload)?;
            let mode = IngestMode::EditById(guid);
            let response = match pipeline::ingest_structured(&pool, &payload, mode, settings).await {
                Ok(outcome) => IngestResponse::from_outcome(&outcome),
                Err(err) => IngestResponse::from_error(&err),
            };
            print_json(&response)?;
            response.is_success()
        }
        Command::Delete { guid } => {
            let result = pipeline::delete(&pool, guid, settings).await;
            print_json(&DeleteResponse::from_result(&result))?;
            result.is_ok()
        }
        Command::Show { code } => match specimens::fetch_by_code(&pool, &code).await {
            Ok(specimen) => {
                print_json(&specimen)?;
                true
            }
            Err(err) => {
                print_json(&IngestResponse::from_error(&err))?;
                false
            }
        },
        Command::Lookup { kind, name } => {
            let id = lookups::register(&pool, kind, &name).await?;
            info!(%kind, name = %name, id, "Lookup value registered");
            print_json(&serde_json::json!({ "kind": kind, "name": name, "id": id }))?;
            true
        }
    };

    pool.close().await;

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_payload(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
