//! Schema validation for report configurations and report records.
//!
//! Both validators take untyped JSON and return either the normalized typed
//! value or every field-level problem found. Neither ever panics on
//! malformed input.

pub mod schema_validator;

pub use schema_validator::{SchemaValidationResult, SchemaValidator};

use serde_json::Value;

use crate::error::FieldError;
use crate::report::{ReportConfig, ReportRecord};

/// Validate a raw report configuration. See [`SchemaValidator::validate_config`].
pub fn validate_config(raw: &Value) -> Result<ReportConfig, Vec<FieldError>> {
    SchemaValidator::validate_config(raw)
}

/// Validate a raw report record. See [`SchemaValidator::validate_record`].
pub fn validate_record(raw: &Value) -> Result<ReportRecord, Vec<FieldError>> {
    SchemaValidator::validate_record(raw)
}
