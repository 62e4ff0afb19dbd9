//! Database initialization
//!
//! Opens (or creates) the registry database and creates every table
//! idempotently, so the same call serves first run and every restart.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// SQLite busy timeout applied to every connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Storage limit for short text columns
pub const MAX_TEXT_LENGTH: usize = 255;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        // Every pooled connection must enforce the prime -> other cascade
        .foreign_keys(true)
        // WAL allows concurrent readers alongside the single writer
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_tables(&pool).await?;

    Ok(pool)
}

/// Create all registry tables (idempotent)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    // Lookup tables referenced by the specimen records
    create_lookup_table(pool, "tissue_types").await?;
    create_lookup_table(pool, "autopsy_types").await?;
    create_lookup_table(pool, "neuropathological_diagnoses").await?;

    create_prime_details_table(pool).await?;
    create_other_details_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    info!("Database tables initialized (schema version {})", SCHEMA_VERSION);
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lookup_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

/// Create the prime_details table
///
/// One row per specimen: demographic and collection facts. `guid` is the
/// surrogate id, `mbtb_code` the business key.
async fn create_prime_details_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prime_details (
            guid TEXT PRIMARY KEY,
            mbtb_code TEXT NOT NULL UNIQUE
                CONSTRAINT mbtb_code_max_length CHECK (length(mbtb_code) <= 255),
            sex TEXT NOT NULL
                CONSTRAINT sex_max_length CHECK (length(sex) <= 255),
            age TEXT NOT NULL DEFAULT ''
                CONSTRAINT age_max_length CHECK (length(age) <= 255),
            postmortem_interval TEXT NOT NULL DEFAULT ''
                CONSTRAINT postmortem_interval_max_length CHECK (length(postmortem_interval) <= 255),
            time_in_fix TEXT NOT NULL DEFAULT ''
                CONSTRAINT time_in_fix_max_length CHECK (length(time_in_fix) <= 255),
            preservation_method TEXT NOT NULL DEFAULT ''
                CONSTRAINT preservation_method_max_length CHECK (length(preservation_method) <= 255),
            storage_year TIMESTAMP NOT NULL,
            archive TEXT NOT NULL DEFAULT 'No'
                CONSTRAINT archive_max_length CHECK (length(archive) <= 255),
            clinical_diagnosis TEXT NOT NULL DEFAULT '',
            tissue_type_id INTEGER NOT NULL REFERENCES tissue_types(id),
            neuro_diagnosis_id INTEGER NOT NULL REFERENCES neuropathological_diagnoses(id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the other_details table
///
/// Clinical and pathology facts, 1:1 with prime_details and removed with it.
async fn create_other_details_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS other_details (
            guid TEXT PRIMARY KEY,
            prime_details_id TEXT NOT NULL UNIQUE
                REFERENCES prime_details(guid) ON DELETE CASCADE,
            autopsy_type_id INTEGER NOT NULL REFERENCES autopsy_types(id),
            race TEXT NOT NULL DEFAULT ''
                CONSTRAINT race_max_length CHECK (length(race) <= 255),
            duration INTEGER NOT NULL,
            clinical_details TEXT NOT NULL DEFAULT '',
            cause_of_death TEXT NOT NULL DEFAULT ''
                CONSTRAINT cause_of_death_max_length CHECK (length(cause_of_death) <= 255),
            brain_weight INTEGER NOT NULL,
            neuropathology_summary TEXT NOT NULL DEFAULT '',
            neuropathology_gross TEXT NOT NULL DEFAULT '',
            neuropathology_microscopic TEXT NOT NULL DEFAULT '',
            cerad TEXT NOT NULL DEFAULT ''
                CONSTRAINT cerad_max_length CHECK (length(cerad) <= 255),
            abc TEXT NOT NULL DEFAULT ''
                CONSTRAINT abc_max_length CHECK (length(abc) <= 255),
            khachaturian TEXT NOT NULL DEFAULT ''
                CONSTRAINT khachaturian_max_length CHECK (length(khachaturian) <= 255),
            braak_stage TEXT NOT NULL DEFAULT ''
                CONSTRAINT braak_stage_max_length CHECK (length(braak_stage) <= 255),
            formalin_fixed INTEGER NOT NULL,
            fresh_frozen INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
