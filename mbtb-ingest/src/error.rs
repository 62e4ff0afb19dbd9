//! Error types for mbtb-ingest
//!
//! Every failure path of the pipeline ends in an [`IngestError`]. Each
//! variant maps to one [`ErrorKind`] and can list the field-level problems
//! behind it, so callers always get a structured, row-addressable error.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure taxonomy reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    EmptyInput,
    WrongFileType,
    RowShapeMismatch,
    ColumnMismatch,
    RequiredFieldEmpty,
    IsNumberCheckFailed,
    InvalidBoolean,
    InvalidDateTime,
    FieldTooLong,
    DuplicateIdentity,
    NotFound,
    PrimeDetailsWriteFailed,
    OtherDetailsWriteFailed,
    UnknownField,
    MalformedInput,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One problem with one field (or with the row as a whole when `field` is None)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            kind,
            message: message.into(),
        }
    }

    /// Error not attributable to a single field
    pub fn general(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: None,
            kind,
            message: message.into(),
        }
    }
}

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestError {
    /// Zero-byte upload, header without names, or header without data rows
    #[error("Error in file size, please upload valid file.")]
    EmptyInput,

    #[error("Wrong file type, please upload CSV file")]
    WrongFileType { filename: String },

    /// Data row whose cell count differs from the header's
    #[error("Not enough elements are present in single row.")]
    RowShapeMismatch { line: u64, expected: usize, found: usize },

    /// Expected column names absent from the input, in schema order
    #[error(
        "Column names don't match with following: {}, Please try again with valid names.",
        name_list(.missing)
    )]
    ColumnMismatch { missing: Vec<String> },

    /// Aggregated field-level validation failures for one row/request
    #[error("{}", invalid_fields_message(.identity, .errors))]
    InvalidFields {
        identity: Option<String>,
        errors: Vec<FieldError>,
    },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Specimen already exists with mbtb_code: {0}")]
    DuplicateIdentity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Error in prime details, Data uploading failed{}", at_identity(.identity))]
    PrimeDetailsWriteFailed {
        identity: Option<String>,
        errors: Vec<FieldError>,
    },

    #[error("Error in other details, Data uploading failed{}", at_identity(.identity))]
    OtherDetailsWriteFailed {
        identity: Option<String>,
        errors: Vec<FieldError>,
    },

    /// Bytes or values that cannot be decoded at all
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Database failure outside a sub-entity write
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// mbtb-common error
    #[error("Common error: {0}")]
    Common(#[from] mbtb_common::Error),
}

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    /// Kind reported to callers
    ///
    /// For aggregated field failures this is the kind of the first field
    /// error in schema order.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::EmptyInput => ErrorKind::EmptyInput,
            IngestError::WrongFileType { .. } => ErrorKind::WrongFileType,
            IngestError::RowShapeMismatch { .. } => ErrorKind::RowShapeMismatch,
            IngestError::ColumnMismatch { .. } => ErrorKind::ColumnMismatch,
            IngestError::InvalidFields { errors, .. } => errors
                .first()
                .map(|e| e.kind)
                .unwrap_or(ErrorKind::MalformedInput),
            IngestError::UnknownField(_) => ErrorKind::UnknownField,
            IngestError::DuplicateIdentity(_) => ErrorKind::DuplicateIdentity,
            IngestError::NotFound(_) => ErrorKind::NotFound,
            IngestError::PrimeDetailsWriteFailed { .. } => ErrorKind::PrimeDetailsWriteFailed,
            IngestError::OtherDetailsWriteFailed { .. } => ErrorKind::OtherDetailsWriteFailed,
            IngestError::MalformedInput(_) => ErrorKind::MalformedInput,
            IngestError::Database(_) => ErrorKind::Storage,
            IngestError::Common(mbtb_common::Error::NotFound(_)) => ErrorKind::NotFound,
            IngestError::Common(_) => ErrorKind::Storage,
        }
    }

    /// Field-level errors behind this failure (never empty)
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            IngestError::InvalidFields { errors, .. }
            | IngestError::PrimeDetailsWriteFailed { errors, .. }
            | IngestError::OtherDetailsWriteFailed { errors, .. }
                if !errors.is_empty() =>
            {
                errors.clone()
            }
            IngestError::ColumnMismatch { missing } => missing
                .iter()
                .map(|name| FieldError::new(name, ErrorKind::ColumnMismatch, "column missing"))
                .collect(),
            IngestError::RowShapeMismatch { line, expected, found } => vec![FieldError::general(
                ErrorKind::RowShapeMismatch,
                format!("line {}: expected {} cells, found {}", line, expected, found),
            )],
            IngestError::UnknownField(name) => vec![FieldError::new(
                name,
                ErrorKind::UnknownField,
                "no such field",
            )],
            other => vec![FieldError::general(other.kind(), other.to_string())],
        }
    }

    /// Identity code of the specimen the failure concerns, when known
    pub fn identity(&self) -> Option<&str> {
        match self {
            IngestError::InvalidFields { identity, .. }
            | IngestError::PrimeDetailsWriteFailed { identity, .. }
            | IngestError::OtherDetailsWriteFailed { identity, .. } => identity.as_deref(),
            IngestError::DuplicateIdentity(code) => Some(code),
            _ => None,
        }
    }

    /// Transient SQLite lock contention; the unit of work may be retried
    pub fn is_lock_contention(&self) -> bool {
        match self {
            IngestError::Database(err) => is_lock_error(err),
            IngestError::Common(mbtb_common::Error::Database(err)) => is_lock_error(err),
            _ => false,
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED and their extended codes
pub(crate) fn is_lock_error(err: &sqlx::Error) -> bool {
    if let Some(db_err) = err.as_database_error() {
        if let Some(code) = db_err.code() {
            if let Ok(code) = code.parse::<i32>() {
                // Primary result code lives in the low byte
                let primary = code & 0xff;
                if primary == 5 || primary == 6 {
                    return true;
                }
            }
        }
    }
    err.to_string().contains("database is locked")
}

fn name_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    format!("[{}]", quoted.join(", "))
}

fn at_identity(identity: &Option<String>) -> String {
    identity
        .as_deref()
        .map(|code| format!(" at mbtb_code: {}", code))
        .unwrap_or_default()
}

fn invalid_fields_message(identity: &Option<String>, errors: &[FieldError]) -> String {
    let numeric_only = !errors.is_empty()
        && errors
            .iter()
            .all(|e| e.kind == ErrorKind::IsNumberCheckFailed);

    if numeric_only {
        return format!(
            "Expecting value, received text for duration and/or brain_weight{}.",
            at_identity(identity)
        );
    }

    let fields: Vec<&str> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
    format!(
        "Invalid data in field(s): {}{}.",
        fields.join(", "),
        at_identity(identity)
    )
}
