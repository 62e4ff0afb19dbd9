//! Specimen database operations
//!
//! Transactional dual-write of the PrimeRecord/OtherRecord pair, reads with
//! lookup names resolved, and the cascading delete.
//!
//! Writes take a borrowed transaction and never commit it: the caller owns
//! the unit of work, and dropping the transaction rolls both writes back.

use crate::error::{ErrorKind, FieldError, IngestError, IngestResult};
use crate::schema::Entity;
use crate::splitter::SplitRecord;
use crate::types::{DeleteOutcome, UpsertAction, UpsertOutcome};
use mbtb_common::db::{lookups, LookupKind, OtherRecord, PrimeRecord, Specimen};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteExecutor, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

/// Where a dual-write lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// New pair with a fresh surrogate id
    Create,
    /// Existing pair, located by surrogate id
    Update(Uuid),
}

const SPECIMEN_SELECT: &str = r#"
    SELECT
        p.guid, p.mbtb_code, p.sex, p.age, p.postmortem_interval, p.time_in_fix,
        p.preservation_method, p.storage_year, p.archive, p.clinical_diagnosis,
        tt.name AS tissue_type, dx.name AS neuropathology_diagnosis,
        o.guid AS other_guid, au.name AS autopsy_type, o.race, o.duration,
        o.clinical_details, o.cause_of_death, o.brain_weight,
        o.neuropathology_summary, o.neuropathology_gross, o.neuropathology_microscopic,
        o.cerad, o.abc, o.khachaturian, o.braak_stage, o.formalin_fixed, o.fresh_frozen
    FROM prime_details p
    JOIN other_details o ON o.prime_details_id = p.guid
    JOIN tissue_types tt ON tt.id = p.tissue_type_id
    JOIN neuropathological_diagnoses dx ON dx.id = p.neuro_diagnosis_id
    JOIN autopsy_types au ON au.id = o.autopsy_type_id
"#;

/// Write both halves of a specimen inside `tx`
///
/// PrimeRecord first, then OtherRecord. A failure in either leaves `tx`
/// uncommitted; the caller drops it and nothing persists.
pub async fn write_pair(
    tx: &mut Transaction<'_, Sqlite>,
    target: WriteTarget,
    record: &SplitRecord,
) -> IngestResult<UpsertOutcome> {
    let identity = record.identity.clone();

    let (guid, action) = match target {
        WriteTarget::Create => (Uuid::new_v4(), UpsertAction::Created),
        WriteTarget::Update(guid) => (guid, UpsertAction::Updated),
    };

    // Prime half
    reject_mistyped(record, Entity::Prime, &identity)?;
    let tissue_type_id = resolve_reference(
        tx,
        LookupKind::TissueType,
        "tissue_type",
        record.prime.tissue_type.as_deref(),
        Entity::Prime,
        &identity,
    )
    .await?;
    let neuro_diagnosis_id = resolve_reference(
        tx,
        LookupKind::NeuropathologyDiagnosis,
        "neuropathology_diagnosis",
        record.prime.neuropathology_diagnosis.as_deref(),
        Entity::Prime,
        &identity,
    )
    .await?;

    let prime_result = match action {
        UpsertAction::Created => {
            insert_prime(tx, guid, record, tissue_type_id, neuro_diagnosis_id).await
        }
        UpsertAction::Updated => {
            update_prime(tx, guid, record, tissue_type_id, neuro_diagnosis_id).await
        }
    };
    prime_result.map_err(|e| classify_write_error(e, Entity::Prime, &identity))?;
    debug!(identity = ?identity, %guid, "Prime details written");

    // Other half
    reject_mistyped(record, Entity::Other, &identity)?;
    let autopsy_type_id = resolve_reference(
        tx,
        LookupKind::AutopsyType,
        "autopsy_type",
        record.other.autopsy_type.as_deref(),
        Entity::Other,
        &identity,
    )
    .await?;

    match action {
        UpsertAction::Created => insert_other(tx, guid, record, autopsy_type_id)
            .await
            .map_err(|e| classify_write_error(e, Entity::Other, &identity))?,
        UpsertAction::Updated => {
            let updated = update_other(tx, guid, record, autopsy_type_id)
                .await
                .map_err(|e| classify_write_error(e, Entity::Other, &identity))?;
            if updated == 0 {
                return Err(write_failed(
                    Entity::Other,
                    &identity,
                    vec![FieldError::general(
                        ErrorKind::OtherDetailsWriteFailed,
                        format!("No other details stored for specimen {}", guid),
                    )],
                ));
            }
        }
    }
    debug!(identity = ?identity, %guid, "Other details written");

    let specimen = fetch_by_id(&mut **tx, guid).await?;
    Ok(UpsertOutcome { action, specimen })
}

/// Fail `entity`'s write when any of its fields carries a value of the wrong type
fn reject_mistyped(
    record: &SplitRecord,
    entity: Entity,
    identity: &Option<String>,
) -> IngestResult<()> {
    let errors: Vec<FieldError> = record
        .mistyped_in(entity)
        .map(|name| FieldError::new(name, entity_failure_kind(entity), "Not a valid string."))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(write_failed(entity, identity, errors))
    }
}

async fn resolve_reference(
    tx: &mut Transaction<'_, Sqlite>,
    kind: LookupKind,
    field: &str,
    name: Option<&str>,
    entity: Entity,
    identity: &Option<String>,
) -> IngestResult<Option<i64>> {
    let Some(name) = name else {
        return Ok(None);
    };

    match lookups::resolve(&mut **tx, kind, name).await? {
        Some(id) => Ok(Some(id)),
        None => Err(write_failed(
            entity,
            identity,
            vec![FieldError::new(
                field,
                entity_failure_kind(entity),
                format!("Unknown {} '{}'", kind, name),
            )],
        )),
    }
}

async fn insert_prime(
    tx: &mut Transaction<'_, Sqlite>,
    guid: Uuid,
    record: &SplitRecord,
    tissue_type_id: Option<i64>,
    neuro_diagnosis_id: Option<i64>,
) -> Result<(), sqlx::Error> {
    let prime = &record.prime;
    let preservation_method = prime
        .preservation_method
        .as_deref()
        .unwrap_or_else(|| record.other.derived_preservation_method());

    sqlx::query(
        r#"
        INSERT INTO prime_details (
            guid, mbtb_code, sex, age, postmortem_interval, time_in_fix,
            preservation_method, storage_year, archive, clinical_diagnosis,
            tissue_type_id, neuro_diagnosis_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(&prime.mbtb_code)
    .bind(&prime.sex)
    .bind(prime.age.as_deref().unwrap_or(""))
    .bind(prime.postmortem_interval.as_deref().unwrap_or(""))
    .bind(prime.time_in_fix.as_deref().unwrap_or(""))
    .bind(preservation_method)
    .bind(prime.storage_year)
    .bind(prime.archive.as_deref().unwrap_or("No"))
    .bind(prime.clinical_diagnosis.as_deref().unwrap_or(""))
    .bind(tissue_type_id)
    .bind(neuro_diagnosis_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Overwrite the provided prime fields, keeping the rest
async fn update_prime(
    tx: &mut Transaction<'_, Sqlite>,
    guid: Uuid,
    record: &SplitRecord,
    tissue_type_id: Option<i64>,
    neuro_diagnosis_id: Option<i64>,
) -> Result<(), sqlx::Error> {
    let prime = &record.prime;

    sqlx::query(
        r#"
        UPDATE prime_details SET
            mbtb_code = COALESCE(?, mbtb_code),
            sex = COALESCE(?, sex),
            age = COALESCE(?, age),
            postmortem_interval = COALESCE(?, postmortem_interval),
            time_in_fix = COALESCE(?, time_in_fix),
            preservation_method = COALESCE(?, preservation_method),
            storage_year = COALESCE(?, storage_year),
            archive = COALESCE(?, archive),
            clinical_diagnosis = COALESCE(?, clinical_diagnosis),
            tissue_type_id = COALESCE(?, tissue_type_id),
            neuro_diagnosis_id = COALESCE(?, neuro_diagnosis_id),
            updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(&prime.mbtb_code)
    .bind(&prime.sex)
    .bind(&prime.age)
    .bind(&prime.postmortem_interval)
    .bind(&prime.time_in_fix)
    .bind(&prime.preservation_method)
    .bind(prime.storage_year)
    .bind(&prime.archive)
    .bind(&prime.clinical_diagnosis)
    .bind(tissue_type_id)
    .bind(neuro_diagnosis_id)
    .bind(guid.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_other(
    tx: &mut Transaction<'_, Sqlite>,
    prime_guid: Uuid,
    record: &SplitRecord,
    autopsy_type_id: Option<i64>,
) -> Result<(), sqlx::Error> {
    let other = &record.other;

    sqlx::query(
        r#"
        INSERT INTO other_details (
            guid, prime_details_id, autopsy_type_id, race, duration, clinical_details,
            cause_of_death, brain_weight, neuropathology_summary, neuropathology_gross,
            neuropathology_microscopic, cerad, abc, khachaturian, braak_stage,
            formalin_fixed, fresh_frozen
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(prime_guid.to_string())
    .bind(autopsy_type_id)
    .bind(other.race.as_deref().unwrap_or(""))
    .bind(other.duration)
    .bind(other.clinical_details.as_deref().unwrap_or(""))
    .bind(other.cause_of_death.as_deref().unwrap_or(""))
    .bind(other.brain_weight)
    .bind(other.neuropathology_summary.as_deref().unwrap_or(""))
    .bind(other.neuropathology_gross.as_deref().unwrap_or(""))
    .bind(other.neuropathology_microscopic.as_deref().unwrap_or(""))
    .bind(other.cerad.as_deref().unwrap_or(""))
    .bind(other.abc.as_deref().unwrap_or(""))
    .bind(other.khachaturian.as_deref().unwrap_or(""))
    .bind(other.braak_stage.as_deref().unwrap_or(""))
    .bind(other.formalin_fixed)
    .bind(other.fresh_frozen)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Overwrite the provided other fields; returns rows affected
async fn update_other(
    tx: &mut Transaction<'_, Sqlite>,
    prime_guid: Uuid,
    record: &SplitRecord,
    autopsy_type_id: Option<i64>,
) -> Result<u64, sqlx::Error> {
    let other = &record.other;

    let result = sqlx::query(
        r#"
        UPDATE other_details SET
            autopsy_type_id = COALESCE(?, autopsy_type_id),
            race = COALESCE(?, race),
            duration = COALESCE(?, duration),
            clinical_details = COALESCE(?, clinical_details),
            cause_of_death = COALESCE(?, cause_of_death),
            brain_weight = COALESCE(?, brain_weight),
            neuropathology_summary = COALESCE(?, neuropathology_summary),
            neuropathology_gross = COALESCE(?, neuropathology_gross),
            neuropathology_microscopic = COALESCE(?, neuropathology_microscopic),
            cerad = COALESCE(?, cerad),
            abc = COALESCE(?, abc),
            khachaturian = COALESCE(?, khachaturian),
            braak_stage = COALESCE(?, braak_stage),
            formalin_fixed = COALESCE(?, formalin_fixed),
            fresh_frozen = COALESCE(?, fresh_frozen),
            updated_at = CURRENT_TIMESTAMP
        WHERE prime_details_id = ?
        "#,
    )
    .bind(autopsy_type_id)
    .bind(&other.race)
    .bind(other.duration)
    .bind(&other.clinical_details)
    .bind(&other.cause_of_death)
    .bind(other.brain_weight)
    .bind(&other.neuropathology_summary)
    .bind(&other.neuropathology_gross)
    .bind(&other.neuropathology_microscopic)
    .bind(&other.cerad)
    .bind(&other.abc)
    .bind(&other.khachaturian)
    .bind(&other.braak_stage)
    .bind(other.formalin_fixed)
    .bind(other.fresh_frozen)
    .bind(prime_guid.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

/// Translate a failed sub-entity write into the caller-facing error
///
/// Lock contention stays a plain database error so the unit can be
/// retried. Constraint failures become field-level entries.
fn classify_write_error(err: sqlx::Error, entity: Entity, identity: &Option<String>) -> IngestError {
    if crate::error::is_lock_error(&err) {
        return IngestError::Database(err);
    }

    let message = match err.as_database_error() {
        Some(db_err) => db_err.message().to_string(),
        None => err.to_string(),
    };

    if let Some(target) = message.strip_prefix("UNIQUE constraint failed: ") {
        if target.ends_with(".mbtb_code") {
            return IngestError::DuplicateIdentity(identity.clone().unwrap_or_default());
        }
    }

    let field_error = if let Some(name) = message.strip_prefix("CHECK constraint failed: ") {
        match name.trim().strip_suffix("_max_length") {
            Some(column) => FieldError::new(
                column,
                ErrorKind::FieldTooLong,
                format!(
                    "Ensure this field has no more than {} characters.",
                    mbtb_common::db::MAX_TEXT_LENGTH
                ),
            ),
            None => FieldError::general(entity_failure_kind(entity), message.clone()),
        }
    } else if let Some(target) = message.strip_prefix("NOT NULL constraint failed: ") {
        let column = target.rsplit('.').next().unwrap_or(target);
        FieldError::new(
            field_for_column(column),
            entity_failure_kind(entity),
            "This field may not be null.",
        )
    } else {
        FieldError::general(entity_failure_kind(entity), message.clone())
    };

    debug!(identity = ?identity, ?entity, cause = %message, "Sub-entity write rejected");
    write_failed(entity, identity, vec![field_error])
}

fn field_for_column(column: &str) -> &str {
    match column {
        "tissue_type_id" => "tissue_type",
        "neuro_diagnosis_id" => "neuropathology_diagnosis",
        "autopsy_type_id" => "autopsy_type",
        other => other,
    }
}

fn entity_failure_kind(entity: Entity) -> ErrorKind {
    match entity {
        Entity::Prime => ErrorKind::PrimeDetailsWriteFailed,
        Entity::Other => ErrorKind::OtherDetailsWriteFailed,
    }
}

fn write_failed(entity: Entity, identity: &Option<String>, errors: Vec<FieldError>) -> IngestError {
    let identity = identity.clone();
    match entity {
        Entity::Prime => IngestError::PrimeDetailsWriteFailed { identity, errors },
        Entity::Other => IngestError::OtherDetailsWriteFailed { identity, errors },
    }
}

/// Surrogate id of the specimen with identity code `code`
pub async fn find_guid_by_code<'e, E>(executor: E, code: &str) -> IngestResult<Option<Uuid>>
where
    E: SqliteExecutor<'e>,
{
    let guid: Option<String> =
        sqlx::query_scalar("SELECT guid FROM prime_details WHERE mbtb_code = ?")
            .bind(code)
            .fetch_optional(executor)
            .await?;

    guid.as_deref().map(parse_guid).transpose()
}

/// Whether a specimen with surrogate id `guid` exists
pub async fn exists<'e, E>(executor: E, guid: Uuid) -> IngestResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prime_details WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// Load a specimen by surrogate id
pub async fn fetch_by_id<'e, E>(executor: E, guid: Uuid) -> IngestResult<Specimen>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} WHERE p.guid = ?", SPECIMEN_SELECT);
    let row = sqlx::query(&sql)
        .bind(guid.to_string())
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| IngestError::NotFound(guid.to_string()))?;

    row_to_specimen(&row)
}

/// Load a specimen by identity code
pub async fn fetch_by_code<'e, E>(executor: E, code: &str) -> IngestResult<Specimen>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} WHERE p.mbtb_code = ?", SPECIMEN_SELECT);
    let row = sqlx::query(&sql)
        .bind(code.trim())
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| IngestError::NotFound(code.to_string()))?;

    row_to_specimen(&row)
}

/// All specimens, ordered by identity code
pub async fn list_specimens(pool: &SqlitePool) -> IngestResult<Vec<Specimen>> {
    let sql = format!("{} ORDER BY p.mbtb_code", SPECIMEN_SELECT);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter().map(row_to_specimen).collect()
}

/// Delete a specimen and, by cascade, its other details
///
/// Runs in one transaction. A missing id fails with `NotFound` before
/// anything is written.
pub async fn delete_specimen(pool: &SqlitePool, guid: Uuid) -> IngestResult<DeleteOutcome> {
    let mut tx = pool.begin().await?;

    let mbtb_code: String = sqlx::query_scalar("SELECT mbtb_code FROM prime_details WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| IngestError::NotFound(guid.to_string()))?;

    let other_details_removed: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM other_details WHERE prime_details_id = ?")
            .bind(guid.to_string())
            .fetch_one(&mut *tx)
            .await?;

    let deleted = sqlx::query("DELETE FROM prime_details WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;

    // ON DELETE CASCADE removes the other half
    let orphans: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM other_details WHERE prime_details_id = ?")
            .bind(guid.to_string())
            .fetch_one(&mut *tx)
            .await?;
    if orphans != 0 {
        return Err(IngestError::Common(mbtb_common::Error::Internal(format!(
            "{} other details left behind by delete of {}",
            orphans, guid
        ))));
    }

    tx.commit().await?;

    info!(%guid, identity = %mbtb_code, "Specimen deleted");
    Ok(DeleteOutcome {
        guid,
        mbtb_code,
        prime_details_removed: deleted.rows_affected(),
        other_details_removed: other_details_removed as u64,
    })
}

fn row_to_specimen(row: &SqliteRow) -> IngestResult<Specimen> {
    let guid = parse_guid(&row.try_get::<String, _>("guid")?)?;

    let prime = PrimeRecord {
        guid,
        mbtb_code: row.try_get("mbtb_code")?,
        sex: row.try_get("sex")?,
        age: row.try_get("age")?,
        postmortem_interval: row.try_get("postmortem_interval")?,
        time_in_fix: row.try_get("time_in_fix")?,
        preservation_method: row.try_get("preservation_method")?,
        storage_year: row.try_get("storage_year")?,
        archive: row.try_get("archive")?,
        clinical_diagnosis: row.try_get("clinical_diagnosis")?,
        tissue_type: row.try_get("tissue_type")?,
        neuropathology_diagnosis: row.try_get("neuropathology_diagnosis")?,
    };

    let other = OtherRecord {
        guid: parse_guid(&row.try_get::<String, _>("other_guid")?)?,
        prime_details_id: guid,
        autopsy_type: row.try_get("autopsy_type")?,
        race: row.try_get("race")?,
        duration: row.try_get("duration")?,
        clinical_details: row.try_get("clinical_details")?,
        cause_of_death: row.try_get("cause_of_death")?,
        brain_weight: row.try_get("brain_weight")?,
        neuropathology_summary: row.try_get("neuropathology_summary")?,
        neuropathology_gross: row.try_get("neuropathology_gross")?,
        neuropathology_microscopic: row.try_get("neuropathology_microscopic")?,
        cerad: row.try_get("cerad")?,
        abc: row.try_get("abc")?,
        khachaturian: row.try_get("khachaturian")?,
        braak_stage: row.try_get("braak_stage")?,
        formalin_fixed: row.try_get("formalin_fixed")?,
        fresh_frozen: row.try_get("fresh_frozen")?,
    };

    Ok(Specimen { prime, other })
}

fn parse_guid(raw: &str) -> IngestResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| {
        IngestError::Common(mbtb_common::Error::Internal(format!(
            "Invalid stored guid '{}': {}",
            raw, e
        )))
    })
}
