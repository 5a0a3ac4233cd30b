//! # Validation Errors
//!
//! Structured error types for value construction, built with `thiserror`.
//!
//! Single-value failures are reported as [`ValidationError`]. Inputs with
//! several fields (an endpoint, a redirect, a business card) collect every
//! problem into [`FieldErrors`] before aborting, so a caller can show all of
//! them against the fields they belong to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifier::IdentifierKind;

/// Validation errors for domain value types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifier value is empty.
    #[error("the {kind} value must not be empty")]
    EmptyIdentifierValue {
        /// Which identifier was being built.
        kind: IdentifierKind,
    },

    /// Identifier scheme is required by the active policy but missing.
    #[error("the {kind} scheme must not be empty")]
    MissingScheme {
        /// Which identifier was being built.
        kind: IdentifierKind,
    },

    /// Identifier scheme contains the `::` separator.
    #[error("the {kind} scheme \"{scheme}\" must not contain '::'")]
    InvalidScheme {
        /// Which identifier was being built.
        kind: IdentifierKind,
        /// The rejected scheme.
        scheme: String,
    },

    /// Identifier part exceeds its maximum length.
    #[error("the {kind} {part} is {len} characters long (maximum {max})")]
    TooLong {
        /// Which identifier was being built.
        kind: IdentifierKind,
        /// `"scheme"` or `"value"`.
        part: &'static str,
        /// Actual length in characters.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// Certificate text is not a parseable X.509 certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Extension text is not well-formed XML.
    #[error("The extension must be XML content. ({0})")]
    InvalidExtension(String),

    /// URL is not absolute or has no host.
    #[error("invalid URL \"{value}\": {reason}")]
    InvalidUrl {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Activation date lies after expiration date.
    #[error("Not Before Date must not be after Not After Date!")]
    InvalidValidityWindow,

    /// One or more fields of a composite input failed validation.
    #[error("{0}")]
    Fields(FieldErrors),
}

/// A single problem attached to a named input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name as exposed to callers (e.g. `documentTypeId`).
    pub field: String,
    /// Human-readable message.
    pub message: String,
}

/// Ordered collection of field errors.
///
/// Errors are kept in insertion order so that the first problem reported for
/// a form is the first one the validation code found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a collection holding exactly one error.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record an error against `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record a [`ValidationError`] against `field`.
    ///
    /// Nested field errors are flattened and keep their own field names.
    pub fn add_error(&mut self, field: impl Into<String>, error: &ValidationError) {
        match error {
            ValidationError::Fields(inner) => self.0.extend(inner.0.iter().cloned()),
            other => self.add(field, other.to_string()),
        }
    }

    /// Append all errors of another collection.
    pub fn extend(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    /// Whether no errors were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether at least one error is attached to `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Messages recorded for `field`, in insertion order.
    pub fn messages_for(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    /// Iterate over the recorded errors.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl From<FieldErrors> for ValidationError {
    fn from(errors: FieldErrors) -> Self {
        Self::Fields(errors)
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collection_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn errors_keep_insertion_order() {
        let mut errors = FieldErrors::new();
        errors.add("documentTypeId", "first");
        errors.add("processId", "second");
        errors.add("documentTypeId", "third");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.messages_for("documentTypeId"), vec!["first", "third"]);
        assert!(errors.has_field("processId"));
        assert!(!errors.has_field("certificate"));
    }

    #[test]
    fn add_error_flattens_nested_fields() {
        let nested = FieldErrors::single("entities[0].name", "missing");
        let mut errors = FieldErrors::new();
        errors.add_error("entities", &ValidationError::Fields(nested));
        assert!(errors.has_field("entities[0].name"));
        assert!(!errors.has_field("entities"));
    }

    #[test]
    fn add_error_uses_display_text() {
        let mut errors = FieldErrors::new();
        errors.add_error("activationDate", &ValidationError::InvalidValidityWindow);
        assert_eq!(
            errors.messages_for("activationDate"),
            vec!["Not Before Date must not be after Not After Date!"]
        );
    }

    #[test]
    fn display_joins_fields() {
        let mut errors = FieldErrors::new();
        errors.add("a", "x");
        errors.add("b", "y");
        assert_eq!(errors.to_string(), "a: x; b: y");
    }

    #[test]
    fn serializes_as_plain_list() {
        let errors = FieldErrors::single("certificate", "bad");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"field": "certificate", "message": "bad"}])
        );
    }

    #[test]
    fn identifier_errors_name_the_kind() {
        let err = ValidationError::MissingScheme {
            kind: IdentifierKind::DocumentType,
        };
        assert_eq!(err.to_string(), "the document type identifier scheme must not be empty");
    }
}
