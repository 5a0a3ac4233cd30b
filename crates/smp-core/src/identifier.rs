//! # Identifier Model
//!
//! PEPPOL identifiers are `{scheme, value}` pairs rendered in URI form as
//! `scheme::value`. Three kinds exist in the registry:
//!
//! - [`ParticipantId`] keys a service group. Both parts are lowercased at
//!   construction, so two participants differing only in case are the same.
//! - [`DocumentTypeId`] keys a service information below a service group.
//! - [`ProcessId`] keys a process below a service information.
//!
//! Whether a scheme is mandatory is a deployment decision captured in
//! [`IdentifierPolicy`]. All constructors that take untrusted input go
//! through the policy.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Separator between scheme and value in the URI-encoded form.
pub const URI_SEPARATOR: &str = "::";

/// Default PEPPOL participant identifier scheme.
pub const PEPPOL_PARTICIPANT_SCHEME: &str = "iso6523-actorid-upis";

/// Default PEPPOL document type identifier scheme.
pub const PEPPOL_DOCTYPE_SCHEME: &str = "busdox-docid-qns";

/// Default PEPPOL process identifier scheme.
pub const PEPPOL_PROCESS_SCHEME: &str = "cenbii-procid-ubl";

/// Maximum scheme length in characters.
pub const MAX_SCHEME_LEN: usize = 100;

/// Maximum value length in characters.
pub const MAX_VALUE_LEN: usize = 1050;

// ---------------------------------------------------------------------------
// IdentifierKind
// ---------------------------------------------------------------------------

/// The three identifier kinds handled by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Participant (service group key).
    Participant,
    /// Document type.
    DocumentType,
    /// Process.
    Process,
}

impl IdentifierKind {
    /// Human-readable name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participant => "participant identifier",
            Self::DocumentType => "document type identifier",
            Self::Process => "process identifier",
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// An untyped `{scheme, value}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier {
    /// Identifier scheme. May be empty when the policy allows it.
    pub scheme: String,
    /// Identifier value.
    pub value: String,
}

impl Identifier {
    /// Build a pair without validation.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Split a URI-encoded identifier on the first `::`.
    ///
    /// A string without the separator yields an empty scheme.
    pub fn parse_uri(uri: &str) -> Self {
        match uri.split_once(URI_SEPARATOR) {
            Some((scheme, value)) => Self::new(scheme, value),
            None => Self::new("", uri),
        }
    }

    /// Whether a non-empty scheme is present.
    pub fn has_scheme(&self) -> bool {
        !self.scheme.is_empty()
    }

    /// Render as `scheme::value`.
    pub fn uri_encoded(&self) -> String {
        format!("{}{}{}", self.scheme, URI_SEPARATOR, self.value)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.scheme, URI_SEPARATOR, self.value)
    }
}

// ---------------------------------------------------------------------------
// Typed identifiers
// ---------------------------------------------------------------------------

macro_rules! typed_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Identifier);

        impl $name {
            /// Identifier kind of this type.
            pub const KIND: IdentifierKind = $kind;

            /// Scheme part.
            pub fn scheme(&self) -> &str {
                &self.0.scheme
            }

            /// Value part.
            pub fn value(&self) -> &str {
                &self.0.value
            }

            /// The underlying pair.
            pub fn as_identifier(&self) -> &Identifier {
                &self.0
            }

            /// Render as `scheme::value`.
            pub fn uri_encoded(&self) -> String {
                self.0.uri_encoded()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.uri_encoded()
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            /// Lenient parse used for persisted data: only an empty value is
            /// rejected, whatever the scheme policy.
            fn try_from(uri: String) -> Result<Self, Self::Error> {
                IdentifierPolicy::lenient().build($kind, Identifier::parse_uri(&uri)).map(Self)
            }
        }
    };
}

typed_identifier!(
    /// Participant identifier, the key of a service group.
    ///
    /// Scheme and value are stored lowercased.
    ParticipantId,
    IdentifierKind::Participant
);

typed_identifier!(
    /// Document type identifier.
    DocumentTypeId,
    IdentifierKind::DocumentType
);

typed_identifier!(
    /// Process identifier.
    ProcessId,
    IdentifierKind::Process
);

// ---------------------------------------------------------------------------
// IdentifierPolicy
// ---------------------------------------------------------------------------

/// Which identifier schemes are mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierPolicy {
    /// Participant identifiers must carry a scheme.
    pub participant_scheme_mandatory: bool,
    /// Document type identifiers must carry a scheme.
    pub document_type_scheme_mandatory: bool,
    /// Process identifiers must carry a scheme.
    pub process_scheme_mandatory: bool,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self::peppol()
    }
}

impl IdentifierPolicy {
    /// PEPPOL policy: every scheme is mandatory.
    pub fn peppol() -> Self {
        Self {
            participant_scheme_mandatory: true,
            document_type_scheme_mandatory: true,
            process_scheme_mandatory: true,
        }
    }

    /// No scheme is mandatory.
    pub fn lenient() -> Self {
        Self {
            participant_scheme_mandatory: false,
            document_type_scheme_mandatory: false,
            process_scheme_mandatory: false,
        }
    }

    /// Whether the scheme of `kind` is mandatory.
    pub fn is_scheme_mandatory(&self, kind: IdentifierKind) -> bool {
        match kind {
            IdentifierKind::Participant => self.participant_scheme_mandatory,
            IdentifierKind::DocumentType => self.document_type_scheme_mandatory,
            IdentifierKind::Process => self.process_scheme_mandatory,
        }
    }

    /// Build a participant identifier from separate parts.
    pub fn participant(&self, scheme: &str, value: &str) -> Result<ParticipantId, ValidationError> {
        self.build(IdentifierKind::Participant, Identifier::new(scheme, value))
            .map(ParticipantId)
    }

    /// Build a participant identifier from `scheme::value`.
    pub fn parse_participant(&self, uri: &str) -> Result<ParticipantId, ValidationError> {
        self.build(IdentifierKind::Participant, Identifier::parse_uri(uri))
            .map(ParticipantId)
    }

    /// Build a document type identifier from separate parts.
    pub fn document_type(
        &self,
        scheme: &str,
        value: &str,
    ) -> Result<DocumentTypeId, ValidationError> {
        self.build(IdentifierKind::DocumentType, Identifier::new(scheme, value))
            .map(DocumentTypeId)
    }

    /// Build a document type identifier from `scheme::value`.
    pub fn parse_document_type(&self, uri: &str) -> Result<DocumentTypeId, ValidationError> {
        self.build(IdentifierKind::DocumentType, Identifier::parse_uri(uri))
            .map(DocumentTypeId)
    }

    /// Build a process identifier from separate parts.
    pub fn process(&self, scheme: &str, value: &str) -> Result<ProcessId, ValidationError> {
        self.build(IdentifierKind::Process, Identifier::new(scheme, value))
            .map(ProcessId)
    }

    /// Build a process identifier from `scheme::value`.
    pub fn parse_process(&self, uri: &str) -> Result<ProcessId, ValidationError> {
        self.build(IdentifierKind::Process, Identifier::parse_uri(uri))
            .map(ProcessId)
    }

    fn build(&self, kind: IdentifierKind, raw: Identifier) -> Result<Identifier, ValidationError> {
        let scheme = raw.scheme.trim();
        let value = raw.value.trim();

        if value.is_empty() {
            return Err(ValidationError::EmptyIdentifierValue { kind });
        }
        if scheme.is_empty() && self.is_scheme_mandatory(kind) {
            return Err(ValidationError::MissingScheme { kind });
        }
        if scheme.contains(URI_SEPARATOR) {
            return Err(ValidationError::InvalidScheme {
                kind,
                scheme: scheme.to_string(),
            });
        }
        let scheme_len = scheme.chars().count();
        if scheme_len > MAX_SCHEME_LEN {
            return Err(ValidationError::TooLong {
                kind,
                part: "scheme",
                len: scheme_len,
                max: MAX_SCHEME_LEN,
            });
        }
        let value_len = value.chars().count();
        if value_len > MAX_VALUE_LEN {
            return Err(ValidationError::TooLong {
                kind,
                part: "value",
                len: value_len,
                max: MAX_VALUE_LEN,
            });
        }

        Ok(match kind {
            IdentifierKind::Participant => {
                Identifier::new(scheme.to_lowercase(), value.to_lowercase())
            }
            IdentifierKind::DocumentType | IdentifierKind::Process => {
                Identifier::new(scheme, value)
            }
        })
    }
}
