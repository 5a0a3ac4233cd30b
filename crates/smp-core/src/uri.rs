//! URL validation shared by endpoint references, redirect targets, website
//! URIs and remote service addresses.

use url::Url;

use crate::error::ValidationError;

/// Parse `value` as an absolute URL with a host.
pub fn validate_url(value: &str) -> Result<Url, ValidationError> {
    let trimmed = value.trim();
    let url = Url::parse(trimmed).map_err(|e| ValidationError::InvalidUrl {
        value: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl {
            value: trimmed.to_string(),
            reason: "URL has no host".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("http://smp.example.org").is_ok());
        assert!(validate_url("https://ap.example.org/as4").is_ok());
    }

    #[test]
    fn rejects_relative_and_hostless() {
        assert!(validate_url("/as4").is_err());
        assert!(validate_url("mailto:someone@example.org").is_err());
        assert!(validate_url("").is_err());
    }
}
