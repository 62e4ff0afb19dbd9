//! Shared fixtures for mbtb-ingest integration tests

#![allow(dead_code)]

use mbtb_common::config::IngestSettings;
use mbtb_common::db::{init_database, lookups, LookupKind};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// File-backed registry with the lookup values the fixtures reference
///
/// Lookup names are stored lower-case where the fixtures use capitals, so
/// every test also exercises case-insensitive resolution.
pub async fn setup_registry() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("registry.db")).await.unwrap();

    lookups::register(&pool, LookupKind::TissueType, "brain").await.unwrap();
    lookups::register(&pool, LookupKind::AutopsyType, "Brain").await.unwrap();
    lookups::register(&pool, LookupKind::NeuropathologyDiagnosis, "alzheimer's disease")
        .await
        .unwrap();

    (dir, pool)
}

pub fn settings() -> IngestSettings {
    IngestSettings::default()
}

/// One complete specimen, every expected field in schema order
pub fn specimen_fields(code: &str) -> Vec<(&'static str, String)> {
    vec![
        ("mbtb_code", code.to_string()),
        ("sex", "Male".to_string()),
        ("age", "Not known".to_string()),
        ("postmortem_interval", "3 hours".to_string()),
        ("time_in_fix", "2 days".to_string()),
        ("storage_year", "2018-06-06 03:03:03".to_string()),
        ("clinical_diagnosis", "Dementia".to_string()),
        ("tissue_type", "Brain".to_string()),
        ("neuropathology_diagnosis", "Alzheimer's disease".to_string()),
        ("autopsy_type", "Brain".to_string()),
        ("race", "White".to_string()),
        ("duration", "10".to_string()),
        ("clinical_details", "Progressive memory loss".to_string()),
        ("cause_of_death", "Pneumonia".to_string()),
        ("brain_weight", "1080".to_string()),
        ("neuropathology_summary", "Advanced AD, severe".to_string()),
        ("neuropathology_gross", "Atrophy".to_string()),
        ("neuropathology_microscopic", "Plaques and tangles".to_string()),
        ("cerad", "C3".to_string()),
        ("braak_stage", "VI".to_string()),
        ("khachaturian", "Yes".to_string()),
        ("abc", "A3B3C3".to_string()),
        ("formalin_fixed", "TRUE".to_string()),
        ("fresh_frozen", "FALSE".to_string()),
    ]
}

/// Replace the value of `name`
pub fn with_value(
    mut fields: Vec<(&'static str, String)>,
    name: &str,
    value: &str,
) -> Vec<(&'static str, String)> {
    for (n, v) in fields.iter_mut() {
        if *n == name {
            *v = value.to_string();
        }
    }
    fields
}

/// CSV bytes: header from the first row's names, one line per row
pub fn csv_bytes(rows: &[Vec<(&'static str, String)>]) -> Vec<u8> {
    csv_bytes_with_header(&rows[0].iter().map(|(n, _)| *n).collect::<Vec<_>>(), rows)
}

pub fn csv_bytes_with_header(header: &[&str], rows: &[Vec<(&'static str, String)>]) -> Vec<u8> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).unwrap();
    for row in rows {
        writer.write_record(row.iter().map(|(_, v)| v.as_str())).unwrap();
    }
    writer.into_inner().unwrap()
}

/// Structured payload from field pairs
pub fn payload(fields: &[(&'static str, String)]) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(n, v)| (n.to_string(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
