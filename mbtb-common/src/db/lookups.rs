//! Lookup-reference tables
//!
//! Tissue types, autopsy types and neuropathological diagnoses are
//! enumerated reference values. Specimen records store their ids; input
//! carries their names, compared case-insensitively.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Kind of lookup reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    TissueType,
    AutopsyType,
    NeuropathologyDiagnosis,
}

impl LookupKind {
    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::TissueType => "tissue_types",
            LookupKind::AutopsyType => "autopsy_types",
            LookupKind::NeuropathologyDiagnosis => "neuropathological_diagnoses",
        }
    }

    /// Human-readable label used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            LookupKind::TissueType => "tissue type",
            LookupKind::AutopsyType => "autopsy type",
            LookupKind::NeuropathologyDiagnosis => "neuropathology diagnosis",
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LookupKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tissue_type" => Ok(LookupKind::TissueType),
            "autopsy_type" => Ok(LookupKind::AutopsyType),
            "neuropathology_diagnosis" | "diagnosis" => Ok(LookupKind::NeuropathologyDiagnosis),
            other => Err(Error::InvalidInput(format!("Unknown lookup kind: {}", other))),
        }
    }
}

/// Register a lookup value, returning its id (idempotent)
pub async fn register(pool: &SqlitePool, kind: LookupKind, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{} name can't be empty", kind)));
    }

    let insert = format!("INSERT OR IGNORE INTO {} (name) VALUES (?)", kind.table());
    sqlx::query(&insert).bind(name).execute(pool).await?;

    resolve(pool, kind, name)
        .await?
        .ok_or_else(|| Error::Internal(format!("{} '{}' missing after insert", kind, name)))
}

/// Resolve a lookup name to its id
///
/// Returns `None` when no value with that name (ignoring case) exists.
pub async fn resolve<'e, E>(executor: E, kind: LookupKind, name: &str) -> Result<Option<i64>>
where
    E: SqliteExecutor<'e>,
{
    let select = format!("SELECT id FROM {} WHERE name = ?", kind.table());
    let id: Option<i64> = sqlx::query_scalar(&select)
        .bind(name.trim())
        .fetch_optional(executor)
        .await?;

    debug!(kind = %kind, name, resolved = id.is_some(), "Resolved lookup reference");
    Ok(id)
}
