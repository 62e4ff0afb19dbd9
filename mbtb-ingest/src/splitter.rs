//! Record Splitter
//!
//! Partitions a validated record into its PrimeRecord and OtherRecord
//! halves by each field's entity tag. A `None` member means the input did
//! not provide that field.

use crate::error::{IngestError, IngestResult};
use crate::schema::{field_spec, Entity};
use crate::validators::{FieldValue, ValidatedRecord};
use chrono::NaiveDateTime;

/// PrimeRecord-shaped values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimeFields {
    pub mbtb_code: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub postmortem_interval: Option<String>,
    pub time_in_fix: Option<String>,
    pub preservation_method: Option<String>,
    pub storage_year: Option<NaiveDateTime>,
    pub archive: Option<String>,
    pub clinical_diagnosis: Option<String>,
    pub tissue_type: Option<String>,
    pub neuropathology_diagnosis: Option<String>,
}

/// OtherRecord-shaped values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtherFields {
    pub autopsy_type: Option<String>,
    pub race: Option<String>,
    pub duration: Option<i64>,
    pub clinical_details: Option<String>,
    pub cause_of_death: Option<String>,
    pub brain_weight: Option<i64>,
    pub neuropathology_summary: Option<String>,
    pub neuropathology_gross: Option<String>,
    pub neuropathology_microscopic: Option<String>,
    pub cerad: Option<String>,
    pub abc: Option<String>,
    pub khachaturian: Option<String>,
    pub braak_stage: Option<String>,
    pub formalin_fixed: Option<bool>,
    pub fresh_frozen: Option<bool>,
}

impl OtherFields {
    /// Preservation method implied by the two storage flags
    pub fn derived_preservation_method(&self) -> &'static str {
        match (
            self.formalin_fixed.unwrap_or(false),
            self.fresh_frozen.unwrap_or(false),
        ) {
            (true, true) => "Both",
            (true, false) => "Formalin-Fixed",
            (false, true) => "Fresh Frozen",
            (false, false) => "",
        }
    }
}

/// One specimen's values, split by owning record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitRecord {
    pub identity: Option<String>,
    pub prime: PrimeFields,
    pub other: OtherFields,
    /// Fields the owning record's write must reject
    pub mistyped: Vec<(Entity, String)>,
}

impl SplitRecord {
    /// Mistyped field names owned by `entity`
    pub fn mistyped_in(&self, entity: Entity) -> impl Iterator<Item = &str> {
        self.mistyped
            .iter()
            .filter(move |(owner, _)| *owner == entity)
            .map(|(_, name)| name.as_str())
    }
}

/// Split a validated record
pub fn split(record: ValidatedRecord) -> IngestResult<SplitRecord> {
    let mut out = SplitRecord {
        identity: record.identity,
        ..SplitRecord::default()
    };

    for (name, value) in record.values {
        let spec = field_spec(&name)?;
        let assigned = match spec.entity {
            Entity::Prime => assign_prime(&mut out.prime, &name, value),
            Entity::Other => assign_other(&mut out.other, &name, value),
        };
        if !assigned {
            return Err(IngestError::UnknownField(name));
        }
    }

    for name in record.mistyped {
        let spec = field_spec(&name)?;
        out.mistyped.push((spec.entity, name));
    }

    Ok(out)
}

fn assign_prime(prime: &mut PrimeFields, name: &str, value: FieldValue) -> bool {
    use FieldValue::*;

    match (name, value) {
        ("mbtb_code", Text(v)) => prime.mbtb_code = Some(v),
        ("sex", Text(v)) => prime.sex = Some(v),
        ("age", Text(v)) => prime.age = Some(v),
        ("postmortem_interval", Text(v)) => prime.postmortem_interval = Some(v),
        ("time_in_fix", Text(v)) => prime.time_in_fix = Some(v),
        ("preservation_method", Text(v)) => prime.preservation_method = Some(v),
        ("storage_year", Timestamp(v)) => prime.storage_year = v,
        ("archive", Text(v)) => prime.archive = Some(v),
        ("clinical_diagnosis", Text(v)) => prime.clinical_diagnosis = Some(v),
        ("tissue_type", Reference(v)) => prime.tissue_type = v,
        ("neuropathology_diagnosis", Reference(v)) => prime.neuropathology_diagnosis = v,
        _ => return false,
    }
    true
}

fn assign_other(other: &mut OtherFields, name: &str, value: FieldValue) -> bool {
    use FieldValue::*;

    match (name, value) {
        ("autopsy_type", Reference(v)) => other.autopsy_type = v,
        ("race", Text(v)) => other.race = Some(v),
        ("duration", Integer(v)) => other.duration = Some(v),
        ("clinical_details", Text(v)) => other.clinical_details = Some(v),
        ("cause_of_death", Text(v)) => other.cause_of_death = Some(v),
        ("brain_weight", Integer(v)) => other.brain_weight = Some(v),
        ("neuropathology_summary", Text(v)) => other.neuropathology_summary = Some(v),
        ("neuropathology_gross", Text(v)) => other.neuropathology_gross = Some(v),
        ("neuropathology_microscopic", Text(v)) => other.neuropathology_microscopic = Some(v),
        ("cerad", Text(v)) => other.cerad = Some(v),
        ("abc", Text(v)) => other.abc = Some(v),
        ("khachaturian", Text(v)) => other.khachaturian = Some(v),
        ("braak_stage", Text(v)) => other.braak_stage = Some(v),
        ("formalin_fixed", Boolean(v)) => other.formalin_fixed = v,
        ("fresh_frozen", Boolean(v)) => other.fresh_frozen = v,
        _ => return false,
    }
    true
}
