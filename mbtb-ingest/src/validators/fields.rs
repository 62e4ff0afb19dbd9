//! Type & Semantic Validator
//!
//! Coerces each raw value through its Field Schema entry. Every problem in
//! a row is collected before returning, so one call reports them all.
//!
//! Empty values:
//! - text: the empty string is a real value ("not recorded"), except for
//!   required fields which fail `RequiredFieldEmpty`
//! - integer: always fails `IsNumberCheckFailed`
//! - boolean, timestamp, reference: "not provided"; creation then fails at
//!   storage, updates keep the stored value
//!
//! A JSON boolean sent for a text or reference field passes validation but
//! is listed in [`ValidatedRecord::mistyped`]; the owning record's write
//! rejects it.

use crate::decoder::DecodedRow;
use crate::error::{ErrorKind, FieldError, IngestResult};
use crate::report::ErrorAggregator;
use crate::schema::{field_spec, schema_position, FieldType, IDENTITY_FIELD};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

/// Accepted `storage_year` layouts besides RFC 3339
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A coerced field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(Option<bool>),
    Timestamp(Option<NaiveDateTime>),
    /// Lookup name, resolved at write time
    Reference(Option<String>),
}

/// A row whose every field passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord {
    /// Identity code, when the input carried a non-empty one
    pub identity: Option<String>,
    /// Values in schema order
    pub values: Vec<(String, FieldValue)>,
    /// Fields whose value type the stored column cannot hold, in schema order
    pub mistyped: Vec<String>,
}

impl ValidatedRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Validate every field of `row`
pub fn validate_fields(row: &DecodedRow) -> IngestResult<ValidatedRecord> {
    let identity = row
        .get(IDENTITY_FIELD)
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string);

    let mut errors = ErrorAggregator::new();
    let mut values = Vec::with_capacity(row.fields.len());
    let mut mistyped = Vec::new();

    for (name, raw) in &row.fields {
        let spec = match field_spec(name) {
            Ok(spec) => spec,
            Err(_) => {
                errors.push(FieldError::new(name, ErrorKind::UnknownField, "no such field"));
                continue;
            }
        };

        let value = raw.trim();

        if spec.required && value.is_empty() {
            errors.push(FieldError::new(
                name,
                ErrorKind::RequiredFieldEmpty,
                "This field may not be blank.",
            ));
            continue;
        }

        if row.booleans.contains(name)
            && matches!(spec.field_type, FieldType::Text | FieldType::Reference(_))
        {
            mistyped.push(name.clone());
            continue;
        }

        match coerce(spec.field_type, value) {
            Ok(coerced) => values.push((name.clone(), coerced)),
            Err((kind, message)) => errors.push(FieldError::new(name, kind, message)),
        }
    }

    if !errors.is_empty() {
        debug!(identity = ?identity, line = ?row.line, "Row failed field validation");
    }
    errors.finish(identity.clone())?;

    values.sort_by_key(|(name, _)| schema_position(name));
    mistyped.sort_by_key(|name| schema_position(name));
    Ok(ValidatedRecord {
        identity,
        values,
        mistyped,
    })
}

fn coerce(field_type: FieldType, value: &str) -> Result<FieldValue, (ErrorKind, String)> {
    match field_type {
        FieldType::Text => Ok(FieldValue::Text(value.to_string())),
        FieldType::Integer => value
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| (ErrorKind::IsNumberCheckFailed, "A valid integer is required.".to_string())),
        FieldType::Boolean => parse_boolean(value).map(FieldValue::Boolean),
        FieldType::Timestamp => parse_timestamp(value).map(FieldValue::Timestamp),
        FieldType::Reference(_) => Ok(FieldValue::Reference(
            (!value.is_empty()).then(|| value.to_string()),
        )),
    }
}

fn parse_boolean(value: &str) -> Result<Option<bool>, (ErrorKind, String)> {
    if value.is_empty() {
        return Ok(None);
    }
    if value.eq_ignore_ascii_case("true") {
        Ok(Some(true))
    } else if value.eq_ignore_ascii_case("false") {
        Ok(Some(false))
    } else {
        Err((
            ErrorKind::InvalidBoolean,
            format!("Must be a valid boolean, received '{}'.", value),
        ))
    }
}

fn parse_timestamp(value: &str) -> Result<Option<NaiveDateTime>, (ErrorKind, String)> {
    if value.is_empty() {
        return Ok(None);
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Some(parsed));
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(parsed.naive_utc()));
    }

    if let Some(midnight) = NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(midnight));
    }

    Err((
        ErrorKind::InvalidDateTime,
        format!("Datetime has wrong format, received '{}'.", value),
    ))
}
