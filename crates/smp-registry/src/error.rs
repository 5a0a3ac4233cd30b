//! # Registry Errors
//!
//! Every registry operation returns [`RegistryError`]. The variants follow
//! the error taxonomy of the registry:
//!
//! - **Validation** ([`RegistryError::Invalid`]): per-field problems, the
//!   operation was aborted before any mutation.
//! - **Conflict** ([`RegistryError::Conflict`]): the input is well-formed but
//!   collides with existing state (duplicate participant, duplicate endpoint,
//!   redirect/service information exclusion).
//! - **Remote sync** ([`RegistryError::RemoteSync`]): an SML or Directory
//!   call failed and the operation's policy is to abort.
//! - **Persistence** ([`RegistryError::Store`]): the backing store rejected
//!   a write. Memory was rolled back to the previous state.

use std::path::PathBuf;

use smp_core::{FieldErrors, ValidationError};
use thiserror::Error;

use crate::hooks::HookError;

/// Errors from registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// One or more input fields are invalid.
    #[error("validation failed: {0}")]
    Invalid(FieldErrors),

    /// The operation collides with existing state.
    #[error("{message}")]
    Conflict {
        /// Field the conflict is attributed to, when there is one.
        field: Option<String>,
        /// Human-readable description.
        message: String,
    },

    /// The addressed record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A remote SML or Directory call failed.
    #[error("{operation} failed: {source}")]
    RemoteSync {
        /// Remote operation name (e.g. `create_participant`).
        operation: &'static str,
        /// Underlying failure.
        source: HookError,
    },

    /// The operation is not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// Shorthand for a conflict attributed to `field`.
    pub fn conflict(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Shorthand for a single-field validation error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid(FieldErrors::single(field, message))
    }

    /// Field errors carried by this error, if it is a validation error.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<FieldErrors> for RegistryError {
    fn from(errors: FieldErrors) -> Self {
        Self::Invalid(errors)
    }
}

impl From<ValidationError> for RegistryError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::Fields(errors) => Self::Invalid(errors),
            other => {
                let mut errors = FieldErrors::new();
                errors.add_error("value", &other);
                Self::Invalid(errors)
            }
        }
    }
}

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing a collection file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A collection file exists but cannot be decoded.
    #[error("corrupt collection file {}: {source}", .path.display())]
    Corrupt {
        /// The offending file.
        path: PathBuf,
        /// Decoder error.
        source: serde_json::Error,
    },

    /// A write-through failed and the in-memory change was rolled back.
    #[error("failed to persist collection '{collection}': {reason}")]
    Persistence {
        /// Collection name.
        collection: &'static str,
        /// Why the write failed.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_field_errors() {
        let err: RegistryError = ValidationError::InvalidValidityWindow.into();
        let fields = err.field_errors().unwrap();
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn nested_fields_are_not_rewrapped() {
        let inner = FieldErrors::single("targetHref", "bad");
        let err: RegistryError = ValidationError::Fields(inner).into();
        assert!(err.field_errors().unwrap().has_field("targetHref"));
    }

    #[test]
    fn conflict_displays_message() {
        let err = RegistryError::conflict("participantId", "already present");
        assert_eq!(err.to_string(), "already present");
    }
}
