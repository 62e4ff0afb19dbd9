//! End-to-end ingestion calls
//!
//! Each call is an independent unit of work over explicit input, with the
//! database pool passed in. A CSV file is checked structurally in full
//! before its first row is written; rows are then written one specimen per
//! transaction, stopping at the first failing row.

use crate::db::specimens;
use crate::decoder::{decode_structured, CsvSource, DecodedRow};
use crate::error::{IngestError, IngestResult};
use crate::report::IngestFailure;
use crate::schema::{expected_field_names, expected_field_names_for};
use crate::services::UpsertResolver;
use crate::splitter::split;
use crate::types::{DeleteOutcome, IngestMode, IngestReport, UpsertOutcome};
use crate::utils::retry_on_lock;
use crate::validators::{check_columns, validate_fields};
use mbtb_common::config::IngestSettings;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ingest a CSV upload in insert-or-edit-by-key mode
///
/// On failure the error names the failing row's identity when known and
/// its source line, and lists the identities of rows already committed
/// before it.
pub async fn ingest_csv(
    pool: &SqlitePool,
    source: &CsvSource<'_>,
    settings: &IngestSettings,
) -> Result<IngestReport, IngestFailure> {
    info!(filename = source.filename(), "Starting CSV ingestion");

    let headers = source.headers()?;
    check_columns(&headers, &expected_field_names())?;

    // Structural pass: every row must decode before any row is written
    let mut data_rows = 0usize;
    for row in source.rows()? {
        row?;
        data_rows += 1;
    }
    if data_rows == 0 {
        return Err(IngestError::EmptyInput.into());
    }
    debug!(rows = data_rows, "CSV passed structural checks");

    let resolver = UpsertResolver::new(pool.clone(), settings);
    let mut report = IngestReport::default();

    for row in source.rows()? {
        let (line, result) = match row {
            Ok(row) => (row.line, ingest_row(&resolver, &row, IngestMode::EditByKey).await),
            Err(err) => (None, Err(err)),
        };

        match result {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(error) => {
                let failure = IngestFailure::at_line(error, line, report.identities());
                warn!(
                    line = ?failure.line,
                    identity = ?failure.error.identity(),
                    kind = %failure.error.kind(),
                    committed = failure.committed.len(),
                    "CSV ingestion stopped at failing row: {}",
                    failure
                );
                return Err(failure);
            }
        }
    }

    info!(
        filename = source.filename(),
        created = report.created(),
        updated = report.updated(),
        "CSV ingestion complete"
    );
    Ok(report)
}

/// Ingest one structured payload
pub async fn ingest_structured(
    pool: &SqlitePool,
    payload: &Value,
    mode: IngestMode,
    settings: &IngestSettings,
) -> IngestResult<UpsertOutcome> {
    let row = decode_structured(payload)?;

    let names: Vec<&str> = row.names().collect();
    check_columns(&names, &expected_field_names_for(&mode))?;

    let resolver = UpsertResolver::new(pool.clone(), settings);
    ingest_row(&resolver, &row, mode).await.map_err(|err| {
        warn!(mode = mode.as_str(), identity = ?err.identity(), kind = %err.kind(), "Structured ingestion failed: {}", err);
        err
    })
}

/// Delete a specimen by surrogate id, cascading to its other details
pub async fn delete(
    pool: &SqlitePool,
    guid: Uuid,
    settings: &IngestSettings,
) -> IngestResult<DeleteOutcome> {
    retry_on_lock("specimen delete", settings.max_lock_wait_ms, move || {
        specimens::delete_specimen(pool, guid)
    })
    .await
}

async fn ingest_row(
    resolver: &UpsertResolver,
    row: &DecodedRow,
    mode: IngestMode,
) -> IngestResult<UpsertOutcome> {
    let record = validate_fields(row)?;
    let record = split(record)?;
    resolver.upsert(mode, &record).await
}
