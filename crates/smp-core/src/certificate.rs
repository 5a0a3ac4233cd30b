//! # Endpoint Certificates
//!
//! Every endpoint publishes the X.509 certificate of its access point.
//! Operators paste certificates either PEM-armoured or as bare base64; both
//! are accepted and normalised to the bare base64 body (no whitespace), which
//! is the form stored, exported, and compared during bulk certificate changes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::certificate::X509Certificate;

use crate::error::ValidationError;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// A parsed, normalised X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Certificate(String);

/// Descriptive fields of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Serial number as colon-separated hex.
    pub serial: String,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    /// Whether `instant` lies inside the validity period.
    pub fn is_valid_at(&self, instant: DateTime<Utc>) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// Strip PEM armour and all whitespace.
///
/// Does not decode or parse; used to compare user input against stored
/// certificates by exact string equality.
pub fn normalize_certificate_text(text: &str) -> String {
    text.replace(PEM_BEGIN, "")
        .replace(PEM_END, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

impl Certificate {
    /// Parse PEM or bare base64 certificate text.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let body = normalize_certificate_text(text);
        if body.is_empty() {
            return Err(ValidationError::InvalidCertificate(
                "certificate must not be empty".to_string(),
            ));
        }
        let der = decode(&body)?;
        parse_der(&der)?;
        Ok(Self(body))
    }

    /// The normalised base64 body.
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// PEM rendering with 64-character lines.
    pub fn to_pem(&self) -> String {
        let mut pem = String::with_capacity(self.0.len() + 80);
        pem.push_str(PEM_BEGIN);
        pem.push('\n');
        let bytes = self.0.as_bytes();
        for chunk in bytes.chunks(64) {
            // base64 output is ASCII, so every chunk boundary is a char boundary.
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str(PEM_END);
        pem.push('\n');
        pem
    }

    /// DER bytes.
    pub fn der(&self) -> Result<Vec<u8>, ValidationError> {
        decode(&self.0)
    }

    /// Subject, issuer, serial and validity.
    pub fn info(&self) -> Result<CertificateInfo, ValidationError> {
        let der = self.der()?;
        let cert = parse_der(&der)?;
        let validity = cert.validity();
        Ok(CertificateInfo {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: to_utc(validity.not_before.timestamp())?,
            not_after: to_utc(validity.not_after.timestamp())?,
        })
    }

    /// Whether the certificate is valid at `instant`.
    pub fn is_valid_at(&self, instant: DateTime<Utc>) -> Result<bool, ValidationError> {
        Ok(self.info()?.is_valid_at(instant))
    }
}

fn decode(body: &str) -> Result<Vec<u8>, ValidationError> {
    STANDARD
        .decode(body)
        .map_err(|e| ValidationError::InvalidCertificate(format!("invalid base64: {e}")))
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>, ValidationError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| ValidationError::InvalidCertificate(format!("invalid X.509: {e}")))?;
    Ok(cert)
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        ValidationError::InvalidCertificate(format!("validity timestamp {timestamp} out of range"))
    })
}

impl TryFrom<String> for Certificate {
    type Error = ValidationError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<Certificate> for String {
    fn from(cert: Certificate) -> String {
        cert.0
    }
}
