//! Schema Validator
//!
//! Compares the field names of one input against the expected set. Missing
//! names fail the whole unit with a single [`IngestError::ColumnMismatch`];
//! extra names pass here and are rejected field by field later.

use crate::error::{IngestError, IngestResult};
use std::collections::HashSet;
use tracing::debug;

/// Check `names` against `expected`
///
/// Returns the extra names (present but not expected), in input order.
pub fn check_columns<S: AsRef<str>>(names: &[S], expected: &[&str]) -> IngestResult<Vec<String>> {
    let present: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();

    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !present.contains(*name))
        .map(|name| name.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(IngestError::ColumnMismatch { missing });
    }

    let extras: Vec<String> = names
        .iter()
        .map(|n| n.as_ref())
        .filter(|name| !expected.contains(name))
        .map(str::to_string)
        .collect();

    if !extras.is_empty() {
        debug!(?extras, "Input carries columns outside the expected set");
    }

    Ok(extras)
}
