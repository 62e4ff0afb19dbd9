//! Upsert Resolver
//!
//! Decides whether a write creates or updates a specimen, then performs the
//! dual-write. The existence check and the write share one transaction, and
//! the whole unit is retried on lock contention, so two concurrent calls for
//! the same identity code can never both create it.

use crate::db::specimens::{self, WriteTarget};
use crate::error::{ErrorKind, FieldError, IngestError, IngestResult};
use crate::schema::IDENTITY_FIELD;
use crate::splitter::SplitRecord;
use crate::types::{IngestMode, UpsertOutcome};
use crate::utils::retry_on_lock;
use mbtb_common::config::IngestSettings;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

/// Resolves and performs specimen upserts
pub struct UpsertResolver {
    db: SqlitePool,
    max_lock_wait_ms: u64,
}

impl UpsertResolver {
    pub fn new(db: SqlitePool, settings: &IngestSettings) -> Self {
        Self {
            db,
            max_lock_wait_ms: settings.max_lock_wait_ms,
        }
    }

    /// Create or update one specimen according to `mode`
    ///
    /// - `Insert`: fails with `DuplicateIdentity` when the code exists
    /// - `EditByKey`: updates the specimen with this code, or creates it
    /// - `EditById`: fails with `NotFound` when no specimen has the id
    pub async fn upsert(&self, mode: IngestMode, record: &SplitRecord) -> IngestResult<UpsertOutcome> {
        retry_on_lock("specimen upsert", self.max_lock_wait_ms, move || {
            self.write_once(mode, record)
        })
        .await
    }

    async fn write_once(&self, mode: IngestMode, record: &SplitRecord) -> IngestResult<UpsertOutcome> {
        let mut tx = self.db.begin().await?;

        let target = resolve_target(&mut tx, mode, record).await?;
        debug!(mode = mode.as_str(), ?target, identity = ?record.identity, "Resolved upsert target");

        let outcome = specimens::write_pair(&mut tx, target, record).await?;
        tx.commit().await?;

        info!(
            identity = outcome.mbtb_code(),
            guid = %outcome.guid(),
            outcome = ?outcome.action,
            mode = mode.as_str(),
            "Specimen written"
        );
        Ok(outcome)
    }
}

async fn resolve_target(
    tx: &mut Transaction<'_, Sqlite>,
    mode: IngestMode,
    record: &SplitRecord,
) -> IngestResult<WriteTarget> {
    match mode {
        IngestMode::Insert => {
            let code = required_identity(record)?;
            match specimens::find_guid_by_code(&mut **tx, code).await? {
                Some(_) => Err(IngestError::DuplicateIdentity(code.to_string())),
                None => Ok(WriteTarget::Create),
            }
        }
        IngestMode::EditByKey => {
            let code = required_identity(record)?;
            Ok(match specimens::find_guid_by_code(&mut **tx, code).await? {
                Some(guid) => WriteTarget::Update(guid),
                None => WriteTarget::Create,
            })
        }
        IngestMode::EditById(guid) => {
            if specimens::exists(&mut **tx, guid).await? {
                Ok(WriteTarget::Update(guid))
            } else {
                Err(IngestError::NotFound(guid.to_string()))
            }
        }
    }
}

fn required_identity(record: &SplitRecord) -> IngestResult<&str> {
    record.identity.as_deref().ok_or_else(|| IngestError::InvalidFields {
        identity: None,
        errors: vec![FieldError::new(
            IDENTITY_FIELD,
            ErrorKind::RequiredFieldEmpty,
            "This field may not be blank.",
        )],
    })
}
