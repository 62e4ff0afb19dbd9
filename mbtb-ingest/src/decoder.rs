//! Row Decoder
//!
//! Turns one input unit into a flat mapping of field name to raw string.
//!
//! - CSV: the first line names the columns, every following line is one
//!   specimen. Rows are decoded lazily in a single pass; calling
//!   [`CsvSource::rows`] again re-decodes from the original bytes.
//! - Structured: a JSON object of scalars, already flat.

use crate::error::{ErrorKind, FieldError, IngestError, IngestResult};
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Accepted tabular file extension
pub const CSV_EXTENSION: &str = "csv";

/// One decoded input unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedRow {
    /// 1-based source line for CSV rows
    pub line: Option<u64>,
    pub fields: BTreeMap<String, String>,
    /// Structured fields that arrived as JSON booleans
    pub booleans: BTreeSet<String>,
}

impl DecodedRow {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// A CSV upload: declared filename plus its bytes
#[derive(Debug, Clone, Copy)]
pub struct CsvSource<'a> {
    filename: &'a str,
    bytes: &'a [u8],
}

impl<'a> CsvSource<'a> {
    /// Accept an upload, rejecting wrong extensions and empty files
    pub fn new(filename: &'a str, bytes: &'a [u8]) -> IngestResult<Self> {
        if !has_csv_extension(filename) {
            return Err(IngestError::WrongFileType {
                filename: filename.to_string(),
            });
        }

        if bytes.is_empty() {
            return Err(IngestError::EmptyInput);
        }

        Ok(Self { filename, bytes })
    }

    pub fn filename(&self) -> &str {
        self.filename
    }

    /// Header names in column order
    pub fn headers(&self) -> IngestResult<Vec<String>> {
        let mut reader = self.reader();
        let record = reader.headers().map_err(csv_error)?;
        let headers = normalize_headers(record)?;

        if headers.iter().all(|h| h.is_empty()) {
            return Err(IngestError::EmptyInput);
        }

        Ok(headers)
    }

    /// Start a fresh single pass over the data rows
    pub fn rows(&self) -> IngestResult<CsvRows<'a>> {
        let headers = self.headers()?;
        Ok(CsvRows {
            headers,
            records: self.reader().into_records(),
        })
    }

    fn reader(&self) -> csv::Reader<&'a [u8]> {
        ReaderBuilder::new()
            .has_headers(true)
            // Row length is checked here, not by the csv crate
            .flexible(true)
            .from_reader(self.bytes)
    }
}

/// Lazy sequence of decoded CSV rows (finite, one pass, not restartable)
pub struct CsvRows<'a> {
    headers: Vec<String>,
    records: StringRecordsIntoIter<&'a [u8]>,
}

impl CsvRows<'_> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn decode(&self, record: StringRecord) -> IngestResult<DecodedRow> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.len() != self.headers.len() {
            return Err(IngestError::RowShapeMismatch {
                line,
                expected: self.headers.len(),
                found: record.len(),
            });
        }

        let fields = self
            .headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();

        Ok(DecodedRow {
            line: Some(line),
            fields,
            booleans: BTreeSet::new(),
        })
    }
}

impl Iterator for CsvRows<'_> {
    type Item = IngestResult<DecodedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(record.map_err(csv_error).and_then(|r| self.decode(r)))
    }
}

/// Decode a structured payload (a JSON object of scalars)
pub fn decode_structured(payload: &Value) -> IngestResult<DecodedRow> {
    match payload {
        Value::Object(map) => decode_object(map),
        other => Err(IngestError::MalformedInput(format!(
            "expected a JSON object, received {}",
            json_type_name(other)
        ))),
    }
}

fn decode_object(map: &Map<String, Value>) -> IngestResult<DecodedRow> {
    let mut fields = BTreeMap::new();
    let mut booleans = BTreeSet::new();
    let mut errors = Vec::new();

    for (name, value) in map {
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => {
                booleans.insert(name.clone());
                b.to_string()
            }
            Value::Null => String::new(),
            Value::Array(_) | Value::Object(_) => {
                errors.push(FieldError::new(
                    name,
                    ErrorKind::MalformedInput,
                    format!("expected a scalar value, received {}", json_type_name(value)),
                ));
                continue;
            }
        };
        fields.insert(name.clone(), raw);
    }

    if !errors.is_empty() {
        let identity = fields
            .get(crate::schema::IDENTITY_FIELD)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        return Err(IngestError::InvalidFields { identity, errors });
    }

    debug!(field_count = fields.len(), "Decoded structured payload");
    Ok(DecodedRow {
        line: None,
        fields,
        booleans,
    })
}

fn has_csv_extension(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION))
        .unwrap_or(false)
}

fn normalize_headers(record: &StringRecord) -> IngestResult<Vec<String>> {
    let mut headers: Vec<String> = record.iter().map(|h| h.trim().to_string()).collect();

    if let Some(first) = headers.first_mut() {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }

    for (idx, name) in headers.iter().enumerate() {
        if !name.is_empty() && headers[..idx].contains(name) {
            return Err(IngestError::MalformedInput(format!(
                "duplicate column '{}'",
                name
            )));
        }
    }

    Ok(headers)
}

fn csv_error(err: csv::Error) -> IngestError {
    IngestError::MalformedInput(err.to_string())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
