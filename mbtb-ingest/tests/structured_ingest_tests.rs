//! Integration tests for structured (JSON) insert and edit

mod helpers;

use helpers::*;
use mbtb_ingest::db::specimens;
use mbtb_ingest::pipeline::ingest_structured;
use mbtb_ingest::{ErrorKind, IngestError, IngestMode, IngestResponse, UpsertAction};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_insert_then_fetch_by_code() {
    let (_dir, pool) = setup_registry().await;
    let fields = specimen_fields("BB99-102");

    let outcome = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap();
    assert_eq!(outcome.action, UpsertAction::Created);

    let specimen = specimens::fetch_by_code(&pool, "BB99-102").await.unwrap();
    assert_eq!(specimen.other.duration, 10);
    assert_eq!(specimen.other.brain_weight, 1080);
    assert_eq!(specimen.prime.sex, "Male");
    assert_eq!(specimen.prime.age, "Not known");
    assert_eq!(specimen.prime.tissue_type, "brain");
    assert_eq!(specimen.prime.storage_year.to_string(), "2018-06-06 03:03:03");
    assert_eq!(specimen.prime.preservation_method, "Formalin-Fixed");
    assert_eq!(specimen.prime.archive, "No");
    assert_eq!(specimen.other.neuropathology_summary, "Advanced AD, severe");
    assert!(specimen.other.formalin_fixed);
    assert!(!specimen.other.fresh_frozen);
    assert_eq!(specimen.other.prime_details_id, specimen.prime.guid);

    let value = serde_json::to_value(IngestResponse::from_outcome(&outcome)).unwrap();
    assert_eq!(value, json!({"result": "success", "created_or_updated": "BB99-102"}));
}

#[tokio::test]
async fn test_insert_accepts_json_scalars() {
    let (_dir, pool) = setup_registry().await;
    let mut value = payload(&specimen_fields("BB99-110"));
    value["duration"] = json!(10);
    value["brain_weight"] = json!(1080);
    value["formalin_fixed"] = json!(false);
    value["fresh_frozen"] = json!(true);
    value["preservation_method"] = json!("Fresh Frozen");

    ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap();

    let specimen = specimens::fetch_by_code(&pool, "BB99-110").await.unwrap();
    assert_eq!(specimen.other.duration, 10);
    assert!(specimen.other.fresh_frozen);
    assert_eq!(specimen.prime.preservation_method, "Fresh Frozen");
}

#[tokio::test]
async fn test_insert_empty_duration_fails_without_write() {
    let (_dir, pool) = setup_registry().await;
    let fields = with_value(specimen_fields("BB99-102"), "duration", "");

    let err = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IsNumberCheckFailed);
    assert_eq!(
        err.to_string(),
        "Expecting value, received text for duration and/or brain_weight at mbtb_code: BB99-102."
    );
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
    assert_eq!(count_rows(&pool, "other_details").await, 0);
}

#[tokio::test]
async fn test_insert_non_numeric_brain_weight_fails() {
    let (_dir, pool) = setup_registry().await;
    let fields = with_value(specimen_fields("BB99-102"), "brain_weight", "heavy");

    let err = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IsNumberCheckFailed);
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
}

#[tokio::test]
async fn test_insert_renamed_column_is_column_mismatch() {
    let (_dir, pool) = setup_registry().await;
    let mut value = payload(&specimen_fields("BB99-102"));
    let duration = value.as_object_mut().unwrap().remove("duration").unwrap();
    value["durations"] = duration;

    let err = ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    match err {
        IngestError::ColumnMismatch { missing } => assert_eq!(missing, vec!["duration"]),
        other => panic!("expected ColumnMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_insert_unknown_extra_field_rejected() {
    let (_dir, pool) = setup_registry().await;
    let mut value = payload(&specimen_fields("BB99-102"));
    value["notes"] = json!("freezer 4");

    let err = ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownField);
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
}

#[tokio::test]
async fn test_duplicate_insert_rejected() {
    let (_dir, pool) = setup_registry().await;
    let value = payload(&specimen_fields("BB99-101"));

    ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap();
    let err = ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateIdentity);
    assert_eq!(err.identity(), Some("BB99-101"));
    assert_eq!(count_rows(&pool, "prime_details").await, 1);
}

#[tokio::test]
async fn test_required_fields_and_bad_boolean_aggregated() {
    let (_dir, pool) = setup_registry().await;
    let fields = with_value(specimen_fields("BB99-102"), "sex", " ");
    let fields = with_value(fields, "fresh_frozen", "sometimes");

    let err = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    let kinds: Vec<ErrorKind> = err.field_errors().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::RequiredFieldEmpty, ErrorKind::InvalidBoolean]);
    assert_eq!(
        err.to_string(),
        "Invalid data in field(s): sex, fresh_frozen at mbtb_code: BB99-102."
    );
}

#[tokio::test]
async fn test_insert_empty_storage_year_fails_prime_write() {
    let (_dir, pool) = setup_registry().await;
    let fields = with_value(specimen_fields("BB99-102"), "storage_year", "");

    let err = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PrimeDetailsWriteFailed);
    assert_eq!(
        err.to_string(),
        "Error in prime details, Data uploading failed at mbtb_code: BB99-102"
    );
    assert_eq!(err.field_errors()[0].field.as_deref(), Some("storage_year"));
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
}

#[tokio::test]
async fn test_insert_empty_flag_fails_other_write_and_rolls_back() {
    let (_dir, pool) = setup_registry().await;
    let fields = with_value(specimen_fields("BB99-102"), "fresh_frozen", "");

    let err = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OtherDetailsWriteFailed);
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
    assert_eq!(count_rows(&pool, "other_details").await, 0);
}

#[tokio::test]
async fn test_long_staging_score_fails_other_write() {
    let (_dir, pool) = setup_registry().await;
    let long = "x".repeat(256);
    let fields = with_value(specimen_fields("BB99-101"), "khachaturian", &long);

    let err = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OtherDetailsWriteFailed);
    assert_eq!(
        err.to_string(),
        "Error in other details, Data uploading failed at mbtb_code: BB99-101"
    );
    let errors = err.field_errors();
    assert_eq!(errors[0].field.as_deref(), Some("khachaturian"));
    assert_eq!(errors[0].kind, ErrorKind::FieldTooLong);

    // Prime half rolled back with it
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
}

#[tokio::test]
async fn test_boolean_in_text_field_fails_other_write() {
    let (_dir, pool) = setup_registry().await;
    let mut value = payload(&specimen_fields("BB99-102"));
    value["khachaturian"] = json!(false);

    let err = ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OtherDetailsWriteFailed);
    let errors = err.field_errors();
    assert_eq!(errors[0].field.as_deref(), Some("khachaturian"));
    assert_eq!(errors[0].kind, ErrorKind::OtherDetailsWriteFailed);
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
    assert_eq!(count_rows(&pool, "other_details").await, 0);
}

#[tokio::test]
async fn test_boolean_in_prime_text_field_fails_prime_write() {
    let (_dir, pool) = setup_registry().await;
    let mut value = payload(&specimen_fields("BB99-102"));
    value["sex"] = json!(true);

    let err = ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PrimeDetailsWriteFailed);
    assert_eq!(err.field_errors()[0].field.as_deref(), Some("sex"));
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
}

#[tokio::test]
async fn test_boolean_in_text_field_rejected_on_edit() {
    let (_dir, pool) = setup_registry().await;
    let created = ingest_structured(
        &pool,
        &payload(&specimen_fields("BB99-101")),
        IngestMode::Insert,
        &settings(),
    )
    .await
    .unwrap();

    let fields: Vec<_> = with_value(specimen_fields("BB99-101"), "duration", "12")
        .into_iter()
        .filter(|(n, _)| *n != "mbtb_code")
        .collect();
    let mut value = payload(&fields);
    value["khachaturian"] = json!(false);

    let err = ingest_structured(&pool, &value, IngestMode::EditById(created.guid()), &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OtherDetailsWriteFailed);
    // Whole edit rolled back
    let stored = specimens::fetch_by_id(&pool, created.guid()).await.unwrap();
    assert_eq!(stored.other.khachaturian, created.specimen.other.khachaturian);
    assert_eq!(stored.other.duration, created.specimen.other.duration);
}

#[tokio::test]
async fn test_unknown_tissue_type_fails_prime_write() {
    let (_dir, pool) = setup_registry().await;
    let fields = with_value(specimen_fields("BB99-101"), "tissue_type", "Spinal cord");

    let err = ingest_structured(&pool, &payload(&fields), IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PrimeDetailsWriteFailed);
    assert_eq!(err.field_errors()[0].field.as_deref(), Some("tissue_type"));
}

#[tokio::test]
async fn test_edit_by_id_updates_in_place() {
    let (_dir, pool) = setup_registry().await;
    let created = ingest_structured(
        &pool,
        &payload(&specimen_fields("BB99-101")),
        IngestMode::Insert,
        &settings(),
    )
    .await
    .unwrap();

    // Identity code omitted: located by surrogate id
    let fields: Vec<_> = with_value(specimen_fields("BB99-101"), "duration", "12")
        .into_iter()
        .filter(|(n, _)| *n != "mbtb_code")
        .collect();
    let updated = ingest_structured(
        &pool,
        &payload(&fields),
        IngestMode::EditById(created.guid()),
        &settings(),
    )
    .await
    .unwrap();

    assert_eq!(updated.action, UpsertAction::Updated);
    assert_eq!(updated.guid(), created.guid());
    assert_eq!(updated.mbtb_code(), "BB99-101");
    assert_eq!(updated.specimen.other.duration, 12);
    assert_eq!(count_rows(&pool, "prime_details").await, 1);
}

#[tokio::test]
async fn test_edit_by_id_not_found() {
    let (_dir, pool) = setup_registry().await;

    let err = ingest_structured(
        &pool,
        &payload(&specimen_fields("BB99-101")),
        IngestMode::EditById(Uuid::new_v4()),
        &settings(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(count_rows(&pool, "prime_details").await, 0);
}

#[tokio::test]
async fn test_edit_by_id_renaming_onto_existing_code_is_duplicate() {
    let (_dir, pool) = setup_registry().await;
    for code in ["BB99-101", "BB99-102"] {
        ingest_structured(&pool, &payload(&specimen_fields(code)), IngestMode::Insert, &settings())
            .await
            .unwrap();
    }
    let second = specimens::fetch_by_code(&pool, "BB99-102").await.unwrap();

    let err = ingest_structured(
        &pool,
        &payload(&specimen_fields("BB99-101")),
        IngestMode::EditById(second.guid()),
        &settings(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateIdentity);
    assert_eq!(
        specimens::fetch_by_id(&pool, second.guid()).await.unwrap().mbtb_code(),
        "BB99-102"
    );
}

#[tokio::test]
async fn test_nested_value_is_malformed() {
    let (_dir, pool) = setup_registry().await;
    let mut value = payload(&specimen_fields("BB99-101"));
    value["cerad"] = json!({"score": "C3"});

    let err = ingest_structured(&pool, &value, IngestMode::Insert, &settings())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}
