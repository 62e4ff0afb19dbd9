//! Integration tests for concurrent ingestion of the same identity code

mod helpers;

use helpers::*;
use mbtb_ingest::db::specimens;
use mbtb_ingest::pipeline::{ingest_csv, ingest_structured};
use mbtb_ingest::{CsvSource, ErrorKind, IngestMode};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_have_one_winner() {
    let (_dir, pool) = setup_registry().await;
    let value = payload(&specimen_fields("BB99-101"));

    let mut join_set = JoinSet::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let value = value.clone();
        join_set.spawn(async move {
            ingest_structured(&pool, &value, IngestMode::Insert, &settings()).await
        });
    }

    let mut created = 0;
    let mut duplicates = 0;
    while let Some(joined) = join_set.join_next().await {
        match joined.unwrap() {
            Ok(_) => created += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::DuplicateIdentity, "unexpected: {}", err);
                duplicates += 1;
            }
        }
    }

    assert_eq!(created, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(count_rows(&pool, "prime_details").await, 1);
    assert_eq!(count_rows(&pool, "other_details").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_converge_to_one_row() {
    let (_dir, pool) = setup_registry().await;

    let mut join_set = JoinSet::new();
    for weight in 1000..1006 {
        let pool = pool.clone();
        join_set.spawn(async move {
            let row = with_value(specimen_fields("BB99-101"), "brain_weight", &weight.to_string());
            let bytes = csv_bytes(&[row]);
            let source = CsvSource::new("concurrent.csv", &bytes).unwrap();
            ingest_csv(&pool, &source, &settings()).await.map(|_| weight)
        });
    }

    let mut written = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        written.push(joined.unwrap().unwrap());
    }

    assert_eq!(written.len(), 6);
    assert_eq!(count_rows(&pool, "prime_details").await, 1);
    assert_eq!(count_rows(&pool, "other_details").await, 1);

    let specimen = specimens::fetch_by_code(&pool, "BB99-101").await.unwrap();
    assert!((1000..1006).contains(&specimen.other.brain_weight));
}
