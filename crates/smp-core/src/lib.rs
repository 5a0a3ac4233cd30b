#![deny(missing_docs)]

//! # smp-core: Foundational Types for the SMP Registry
//!
//! Value types shared by every other crate in the workspace. No I/O, no
//! async, no global state.
//!
//! ## Design Principles
//!
//! 1. **Typed identifiers.** [`ParticipantId`], [`DocumentTypeId`] and
//!    [`ProcessId`] are distinct types. A participant identifier is
//!    normalised to lowercase at construction, so equality and hashing are
//!    case-insensitive without any caller cooperation.
//!
//! 2. **Validation at the edge.** Identifiers are built through an
//!    [`IdentifierPolicy`]; certificates through [`Certificate::parse`];
//!    extensions through [`Extension::parse`]. Once a value exists it is
//!    known to be well-formed.
//!
//! 3. **Field-level errors.** Multi-field inputs accumulate problems in
//!    [`FieldErrors`] and report them all at once, keyed by field name.

pub mod address;
pub mod certificate;
pub mod error;
pub mod extension;
pub mod identifier;
pub mod temporal;
pub mod uri;

pub use address::{validate_smp_addresses, SmpAddresses};
pub use certificate::{normalize_certificate_text, Certificate, CertificateInfo};
pub use error::{FieldError, FieldErrors, ValidationError};
pub use extension::Extension;
pub use identifier::{
    DocumentTypeId, Identifier, IdentifierKind, IdentifierPolicy, ParticipantId, ProcessId,
};
pub use temporal::check_validity_window;
pub use uri::validate_url;
