//! Database models
//!
//! Row shapes as read back from storage, with lookup references resolved
//! to their names.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Demographic and collection facts for one specimen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimeRecord {
    /// Surrogate id
    pub guid: Uuid,
    /// Identity code (business key)
    pub mbtb_code: String,
    pub sex: String,
    pub age: String,
    pub postmortem_interval: String,
    pub time_in_fix: String,
    pub preservation_method: String,
    pub storage_year: NaiveDateTime,
    pub archive: String,
    pub clinical_diagnosis: String,
    pub tissue_type: String,
    pub neuropathology_diagnosis: String,
}

/// Clinical and pathology facts for one specimen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherRecord {
    pub guid: Uuid,
    /// Back-reference to the owning [`PrimeRecord`]
    pub prime_details_id: Uuid,
    pub autopsy_type: String,
    pub race: String,
    pub duration: i64,
    pub clinical_details: String,
    pub cause_of_death: String,
    pub brain_weight: i64,
    pub neuropathology_summary: String,
    pub neuropathology_gross: String,
    pub neuropathology_microscopic: String,
    pub cerad: String,
    pub abc: String,
    pub khachaturian: String,
    pub braak_stage: String,
    pub formalin_fixed: bool,
    pub fresh_frozen: bool,
}

/// A specimen: the linked prime/other pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specimen {
    pub prime: PrimeRecord,
    pub other: OtherRecord,
}

impl Specimen {
    /// Identity code of this specimen
    pub fn mbtb_code(&self) -> &str {
        &self.prime.mbtb_code
    }

    /// Surrogate id of this specimen
    pub fn guid(&self) -> Uuid {
        self.prime.guid
    }
}
