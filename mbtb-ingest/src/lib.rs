//! mbtb-ingest - Specimen registry ingestion
//!
//! Turns CSV uploads and structured payloads into validated specimen
//! records (a PrimeRecord/OtherRecord pair each) and writes them
//! transactionally:
//!
//! decode → column check → field validation → split → upsert → dual-write

pub mod db;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod services;
pub mod splitter;
pub mod types;
pub mod utils;
pub mod validators;

pub use decoder::{CsvSource, DecodedRow};
pub use error::{ErrorKind, FieldError, IngestError, IngestResult};
pub use report::{DeleteResponse, IngestFailure, IngestResponse};
pub use types::{DeleteOutcome, IngestMode, IngestReport, UpsertAction, UpsertOutcome};
