//! # Extensions
//!
//! Service groups, endpoints and redirects may carry an opaque extension
//! blob. The registry never interprets it, but it must be well-formed XML
//! so that it can be embedded in exchange documents and SMP responses.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Well-formed XML extension content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Extension(String);

impl Extension {
    /// Parse optional extension text.
    ///
    /// Blank input means "no extension" and yields `Ok(None)`.
    pub fn parse(text: &str) -> Result<Option<Self>, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        roxmltree::Document::parse(trimmed)
            .map_err(|e| ValidationError::InvalidExtension(e.to_string()))?;
        Ok(Some(Self(trimmed.to_string())))
    }

    /// Parse an optional input field, treating `None` like blank text.
    pub fn parse_opt(text: Option<&str>) -> Result<Option<Self>, ValidationError> {
        text.map_or(Ok(None), Self::parse)
    }

    /// The XML text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Extension {
    type Error = ValidationError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)?
            .ok_or_else(|| ValidationError::InvalidExtension("empty extension".to_string()))
    }
}

impl From<Extension> for String {
    fn from(ext: Extension) -> String {
        ext.0
    }
}

impl std::fmt::Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
