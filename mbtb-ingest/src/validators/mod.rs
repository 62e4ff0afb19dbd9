//! Input validation
//!
//! - [`columns`]: Schema Validator (column names against the Field Schema)
//! - [`fields`]: Type & Semantic Validator (per-field coercion)

pub mod columns;
pub mod fields;

pub use columns::check_columns;
pub use fields::{validate_fields, FieldValue, ValidatedRecord};
