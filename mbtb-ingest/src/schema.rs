//! Field Schema
//!
//! The static, authoritative description of every field the pipeline
//! accepts: which record owns it, how its raw text is coerced, whether it
//! may be empty, and whether its column must be present in every input.
//!
//! The expected columns are the identity code plus 23 data fields
//! (8 prime + 15 other). `preservation_method` and `archive` are optional
//! columns: known to the schema but never demanded by the column check.

use crate::error::{IngestError, IngestResult};
use crate::types::IngestMode;
use mbtb_common::db::LookupKind;
use serde::Serialize;

/// Field holding the identity code (business key)
pub const IDENTITY_FIELD: &str = "mbtb_code";

/// Record that owns a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Entity {
    Prime,
    Other,
}

/// Primitive type a raw value is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Boolean,
    Timestamp,
    /// Name of a lookup value, resolved by persistence
    Reference(LookupKind),
}

/// Whether inputs must carry the column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPresence {
    Expected,
    Optional,
}

/// Schema entry for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub entity: Entity,
    pub field_type: FieldType,
    /// Value must be non-empty
    pub required: bool,
    pub presence: ColumnPresence,
}

const fn field(
    name: &'static str,
    entity: Entity,
    field_type: FieldType,
    required: bool,
) -> FieldSpec {
    FieldSpec {
        name,
        entity,
        field_type,
        required,
        presence: ColumnPresence::Expected,
    }
}

const fn optional(name: &'static str, entity: Entity, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        entity,
        field_type,
        required: false,
        presence: ColumnPresence::Optional,
    }
}

use Entity::{Other, Prime};
use FieldType::{Boolean, Integer, Reference, Text, Timestamp};

/// All known fields, in reporting order
pub static FIELD_SCHEMA: &[FieldSpec] = &[
    field(IDENTITY_FIELD, Prime, Text, true),
    field("sex", Prime, Text, true),
    field("age", Prime, Text, false),
    field("postmortem_interval", Prime, Text, false),
    field("time_in_fix", Prime, Text, false),
    field("storage_year", Prime, Timestamp, false),
    field("clinical_diagnosis", Prime, Text, false),
    field("tissue_type", Prime, Reference(LookupKind::TissueType), false),
    field(
        "neuropathology_diagnosis",
        Prime,
        Reference(LookupKind::NeuropathologyDiagnosis),
        false,
    ),
    field("autopsy_type", Other, Reference(LookupKind::AutopsyType), false),
    field("race", Other, Text, false),
    field("duration", Other, Integer, false),
    field("clinical_details", Other, Text, false),
    field("cause_of_death", Other, Text, false),
    field("brain_weight", Other, Integer, false),
    field("neuropathology_summary", Other, Text, false),
    field("neuropathology_gross", Other, Text, false),
    field("neuropathology_microscopic", Other, Text, false),
    field("cerad", Other, Text, false),
    field("braak_stage", Other, Text, false),
    field("khachaturian", Other, Text, false),
    field("abc", Other, Text, false),
    field("formalin_fixed", Other, Boolean, false),
    field("fresh_frozen", Other, Boolean, false),
    optional("preservation_method", Prime, Text),
    optional("archive", Prime, Text),
];

/// Names every input must carry, in schema order
pub fn expected_field_names() -> Vec<&'static str> {
    FIELD_SCHEMA
        .iter()
        .filter(|spec| spec.presence == ColumnPresence::Expected)
        .map(|spec| spec.name)
        .collect()
}

/// Expected names for an ingestion mode
///
/// Editing by surrogate id locates the record without the identity code,
/// so that column becomes optional.
pub fn expected_field_names_for(mode: &IngestMode) -> Vec<&'static str> {
    let mut names = expected_field_names();
    if matches!(mode, IngestMode::EditById(_)) {
        names.retain(|name| *name != IDENTITY_FIELD);
    }
    names
}

/// Look up the schema entry for `name`
pub fn field_spec(name: &str) -> IngestResult<&'static FieldSpec> {
    FIELD_SCHEMA
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| IngestError::UnknownField(name.to_string()))
}

/// Position of a field in reporting order (unknown names sort last)
pub(crate) fn schema_position(name: &str) -> usize {
    FIELD_SCHEMA
        .iter()
        .position(|spec| spec.name == name)
        .unwrap_or(FIELD_SCHEMA.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_expected_names_are_identity_plus_23_fields() {
        let names = expected_field_names();
        assert_eq!(names.len(), 24);
        assert_eq!(names[0], IDENTITY_FIELD);
        assert!(!names.contains(&"preservation_method"));
        assert!(!names.contains(&"archive"));
    }

    #[test]
    fn test_entity_split_counts() {
        let expected: Vec<&FieldSpec> = FIELD_SCHEMA
            .iter()
            .filter(|s| s.presence == ColumnPresence::Expected && s.name != IDENTITY_FIELD)
            .collect();
        let prime = expected.iter().filter(|s| s.entity == Entity::Prime).count();
        let other = expected.iter().filter(|s| s.entity == Entity::Other).count();
        assert_eq!((prime, other), (8, 15));
    }

    #[test]
    fn test_field_spec_lookup() {
        let spec = field_spec("duration").unwrap();
        assert_eq!(spec.entity, Entity::Other);
        assert_eq!(spec.field_type, FieldType::Integer);

        let spec = field_spec("tissue_type").unwrap();
        assert_eq!(spec.field_type, FieldType::Reference(LookupKind::TissueType));

        assert!(matches!(
            field_spec("durations"),
            Err(IngestError::UnknownField(name)) if name == "durations"
        ));
    }

    #[test]
    fn test_only_identity_and_sex_required() {
        let required: Vec<&str> = FIELD_SCHEMA
            .iter()
            .filter(|s| s.required)
            .map(|s| s.name)
            .collect();
        assert_eq!(required, vec![IDENTITY_FIELD, "sex"]);
    }

    #[test]
    fn test_edit_by_id_does_not_expect_identity() {
        let names = expected_field_names_for(&IngestMode::EditById(Uuid::new_v4()));
        assert_eq!(names.len(), 23);
        assert!(!names.contains(&IDENTITY_FIELD));

        let names = expected_field_names_for(&IngestMode::EditByKey);
        assert_eq!(names.len(), 24);
    }
}
