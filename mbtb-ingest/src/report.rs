//! Error Aggregator and response shapes
//!
//! [`ErrorAggregator`] collects every field-level problem of one row so the
//! caller sees them all at once. [`IngestResponse`] and [`DeleteResponse`]
//! are the transport-agnostic JSON shapes returned to callers.

use crate::error::{ErrorKind, FieldError, IngestError, IngestResult};
use crate::schema::schema_position;
use crate::types::{DeleteOutcome, IngestReport, UpsertOutcome};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Collects field errors for one row/request
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Vec<FieldError>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` when nothing was collected, otherwise one
    /// [`IngestError::InvalidFields`] listing every error in schema order
    pub fn finish(mut self, identity: Option<String>) -> IngestResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }

        self.errors.sort_by_key(|e| {
            e.field
                .as_deref()
                .map(schema_position)
                .unwrap_or(usize::MAX)
        });

        Err(IngestError::InvalidFields {
            identity,
            errors: self.errors,
        })
    }
}

/// A CSV ingestion that stopped at a failing row
///
/// Rows before the failing one stay committed; their identity codes are
/// listed in `committed`. `line` is the failing row's 1-based source line
/// and is named in the message when the row has no identity code.
#[derive(Debug, Error)]
#[error("{}", failure_message(.error, .line))]
pub struct IngestFailure {
    #[source]
    pub error: IngestError,
    pub line: Option<u64>,
    pub committed: Vec<String>,
}

impl IngestFailure {
    pub fn at_line(error: IngestError, line: Option<u64>, committed: Vec<String>) -> Self {
        Self {
            line: line.or_else(|| error_line(&error)),
            error,
            committed,
        }
    }
}

impl From<IngestError> for IngestFailure {
    fn from(error: IngestError) -> Self {
        Self::at_line(error, None, Vec::new())
    }
}

fn error_line(error: &IngestError) -> Option<u64> {
    match error {
        IngestError::RowShapeMismatch { line, .. } => Some(*line),
        _ => None,
    }
}

fn failure_message(error: &IngestError, line: &Option<u64>) -> String {
    let message = error.to_string();
    match (error.identity(), line) {
        (None, Some(line)) => match message.strip_suffix('.') {
            Some(stem) => format!("{} at line {}.", stem, line),
            None => format!("{} at line {}", message, line),
        },
        _ => message,
    }
}

/// What a successful call created or updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CreatedOrUpdated {
    One(String),
    Many(Vec<String>),
}

/// Ingestion response
///
/// Serializes as `{"result": "success", "created_or_updated": ...}` or
/// `{"result": "failure", "message": ..., "kind": ..., "errors": [...]}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum IngestResponse {
    Success {
        created_or_updated: CreatedOrUpdated,
    },
    Failure {
        message: String,
        kind: ErrorKind,
        errors: Vec<FieldError>,
        #[serde(skip_serializing_if = "Option::is_none")]
        line: Option<u64>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        committed: Vec<String>,
    },
}

impl IngestResponse {
    pub fn from_outcome(outcome: &UpsertOutcome) -> Self {
        IngestResponse::Success {
            created_or_updated: CreatedOrUpdated::One(outcome.mbtb_code().to_string()),
        }
    }

    pub fn from_report(report: &IngestReport) -> Self {
        let mut identities = report.identities();
        let created_or_updated = if identities.len() == 1 {
            CreatedOrUpdated::One(identities.remove(0))
        } else {
            CreatedOrUpdated::Many(identities)
        };
        IngestResponse::Success { created_or_updated }
    }

    pub fn from_error(error: &IngestError) -> Self {
        IngestResponse::Failure {
            message: error.to_string(),
            kind: error.kind(),
            errors: error.field_errors(),
            line: None,
            committed: Vec::new(),
        }
    }

    pub fn from_failure(failure: &IngestFailure) -> Self {
        IngestResponse::Failure {
            message: failure.to_string(),
            kind: failure.error.kind(),
            errors: failure.error.field_errors(),
            line: failure.line,
            committed: failure.committed.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IngestResponse::Success { .. })
    }
}

/// Delete response
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum DeleteResponse {
    Success {
        guid: Uuid,
        mbtb_code: String,
        prime_details_removed: u64,
        other_details_removed: u64,
    },
    Failure {
        message: String,
        kind: ErrorKind,
    },
}

impl DeleteResponse {
    pub fn from_result(result: &IngestResult<DeleteOutcome>) -> Self {
        match result {
            Ok(outcome) => DeleteResponse::Success {
                guid: outcome.guid,
                mbtb_code: outcome.mbtb_code.clone(),
                prime_details_removed: outcome.prime_details_removed,
                other_details_removed: outcome.other_details_removed,
            },
            Err(err) => DeleteResponse::Failure {
                message: err.to_string(),
                kind: err.kind(),
            },
        }
    }
}
