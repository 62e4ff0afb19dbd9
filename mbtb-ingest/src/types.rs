//! Shared ingestion types

use mbtb_common::db::Specimen;
use serde::Serialize;
use uuid::Uuid;

/// How an ingestion call locates its target specimen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Structured create: the identity code must be new
    Insert,
    /// CSV path: update the specimen with this identity code, or create it
    EditByKey,
    /// Structured edit: the specimen is located by surrogate id
    EditById(Uuid),
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::Insert => "insert",
            IngestMode::EditByKey => "edit-by-key",
            IngestMode::EditById(_) => "edit-by-id",
        }
    }
}

/// Which write the upsert performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Result of one successful specimen write
#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    /// The pair as stored after the write
    pub specimen: Specimen,
}

impl UpsertOutcome {
    pub fn mbtb_code(&self) -> &str {
        self.specimen.mbtb_code()
    }

    pub fn guid(&self) -> Uuid {
        self.specimen.guid()
    }
}

/// Result of a fully successful CSV ingestion
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// One outcome per data row, in file order
    pub outcomes: Vec<UpsertOutcome>,
}

impl IngestReport {
    pub fn created(&self) -> usize {
        self.count(UpsertAction::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(UpsertAction::Updated)
    }

    /// Identity codes written, in file order
    pub fn identities(&self) -> Vec<String> {
        self.outcomes.iter().map(|o| o.mbtb_code().to_string()).collect()
    }

    fn count(&self, action: UpsertAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }
}

/// Result of a cascading delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub guid: Uuid,
    pub mbtb_code: String,
    pub prime_details_removed: u64,
    pub other_details_removed: u64,
}
