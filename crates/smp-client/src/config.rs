//! Client configuration.
//!
//! Both clients read their settings from the environment. The SML and
//! Directory base URLs are not configured here: the SML URL comes from the
//! selected `SmlInfo` record and the Directory hostname from the persisted
//! settings, so both can change at runtime.

use std::path::Path;
use std::time::Duration;

use url::Url;
use zeroize::Zeroizing;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// TLS client identity presented to the SML and the Directory.
///
/// Custom `Debug` implementation redacts the private key.
#[derive(Clone)]
pub struct ClientIdentity {
    /// PEM encoded certificate chain.
    pub certificate_pem: String,
    /// PEM encoded private key.
    pub private_key_pem: Zeroizing<String>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificate_pem", &format_args!("{} bytes", self.certificate_pem.len()))
            .field("private_key_pem", &"[REDACTED]")
            .finish()
    }
}

impl ClientIdentity {
    /// Read certificate and key from PEM files.
    pub fn from_files(certificate: &Path, private_key: &Path) -> Result<Self, ConfigError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            certificate_pem: read(certificate)?,
            private_key_pem: Zeroizing::new(read(private_key)?),
        })
    }

    /// Identity from `SML_CLIENT_CERT_PEM` and `SML_CLIENT_KEY_PEM`, if both
    /// are set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match (
            std::env::var("SML_CLIENT_CERT_PEM").ok(),
            std::env::var("SML_CLIENT_KEY_PEM").ok(),
        ) {
            (Some(cert), Some(key)) => Self::from_files(Path::new(&cert), Path::new(&key)).map(Some),
            (None, None) => Ok(None),
            _ => Err(ConfigError::IncompleteIdentity),
        }
    }

    fn to_reqwest(&self) -> Result<reqwest::Identity, ConfigError> {
        let mut pem = Zeroizing::new(Vec::with_capacity(
            self.certificate_pem.len() + self.private_key_pem.len() + 1,
        ));
        pem.extend_from_slice(self.private_key_pem.as_bytes());
        pem.push(b'\n');
        pem.extend_from_slice(self.certificate_pem.as_bytes());
        reqwest::Identity::from_pem(&pem).map_err(|e| ConfigError::InvalidIdentity(e.to_string()))
    }
}

/// Configuration of the SML clients.
#[derive(Clone)]
pub struct SmlClientConfig {
    /// ID under which this SMP is registered at the SML.
    pub smp_id: String,
    /// Client identity for mutual TLS.
    pub identity: Option<ClientIdentity>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SmlClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmlClientConfig")
            .field("smp_id", &self.smp_id)
            .field("identity", &self.identity.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SmlClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SMP_ID` (required)
    /// - `SML_CLIENT_CERT_PEM`, `SML_CLIENT_KEY_PEM` (optional paths, both or neither)
    /// - `SML_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let smp_id = std::env::var("SMP_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSmpId)?;
        Ok(Self {
            smp_id,
            identity: ClientIdentity::from_env()?,
            timeout_secs: env_secs("SML_TIMEOUT_SECS"),
        })
    }

    /// Configuration without client identity and with a short timeout.
    pub fn local_mock(smp_id: &str) -> Self {
        Self {
            smp_id: smp_id.to_string(),
            identity: None,
            timeout_secs: 5,
        }
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        http_client(self.identity.as_ref(), self.timeout_secs)
    }
}

/// Configuration of the Directory client.
#[derive(Clone)]
pub struct DirectoryClientConfig {
    /// Base URL of the Directory, e.g. `https://directory.peppol.eu`.
    pub hostname: Url,
    /// Client identity for mutual TLS.
    pub identity: Option<ClientIdentity>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for DirectoryClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClientConfig")
            .field("hostname", &self.hostname.as_str())
            .field("identity", &self.identity.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl DirectoryClientConfig {
    /// Configuration for `hostname` with identity and timeout from the
    /// environment (`SML_CLIENT_CERT_PEM`, `SML_CLIENT_KEY_PEM`,
    /// `DIRECTORY_TIMEOUT_SECS`).
    pub fn from_env(hostname: &str) -> Result<Self, ConfigError> {
        Self::new(hostname, ClientIdentity::from_env()?)
    }

    /// Configuration for `hostname` with an explicit identity and the
    /// timeout from `DIRECTORY_TIMEOUT_SECS`.
    pub fn new(hostname: &str, identity: Option<ClientIdentity>) -> Result<Self, ConfigError> {
        Ok(Self {
            hostname: parse_url("directoryHostname", hostname)?,
            identity,
            timeout_secs: env_secs("DIRECTORY_TIMEOUT_SECS"),
        })
    }

    /// Configuration pointing at a local mock server.
    pub fn local_mock(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            hostname: parse_url("localhost", base_url)?,
            identity: None,
            timeout_secs: 5,
        })
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        http_client(self.identity.as_ref(), self.timeout_secs)
    }
}

fn http_client(
    identity: Option<&ClientIdentity>,
    timeout_secs: u64,
) -> Result<reqwest::Client, ConfigError> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs));
    if let Some(identity) = identity {
        builder = builder.identity(identity.to_reqwest()?);
    }
    builder
        .build()
        .map_err(|e| ConfigError::InvalidIdentity(e.to_string()))
}

fn env_secs(var: &str) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

fn parse_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `SMP_ID` is not set.
    #[error("SMP_ID environment variable is required")]
    MissingSmpId,
    /// Only one of certificate and key was given.
    #[error("SML_CLIENT_CERT_PEM and SML_CLIENT_KEY_PEM must be set together")]
    IncompleteIdentity,
    /// A PEM file could not be read.
    #[error("cannot read {path}: {reason}")]
    Unreadable {
        /// Path of the file.
        path: String,
        /// I/O error text.
        reason: String,
    },
    /// The PEM material is not a usable TLS identity.
    #[error("invalid client identity: {0}")]
    InvalidIdentity(String),
    /// A URL could not be parsed.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT: &str = include_str!("../testdata/smp-old.pem");
    const KEY: &str = include_str!("../testdata/smp-old.key");

    #[test]
    fn debug_redacts_private_key() {
        let identity = ClientIdentity {
            certificate_pem: CERT.to_string(),
            private_key_pem: Zeroizing::new(KEY.to_string()),
        };
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("PRIVATE KEY"));

        let config = SmlClientConfig {
            identity: Some(identity),
            ..SmlClientConfig::local_mock("SMP-1")
        };
        assert!(!format!("{config:?}").contains("PRIVATE KEY"));
    }

    #[test]
    fn identity_is_read_from_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, CERT).unwrap();
        std::fs::write(&key, KEY).unwrap();
        let identity = ClientIdentity::from_files(&cert, &key).unwrap();
        assert_eq!(identity.certificate_pem, CERT);
        assert!(identity.to_reqwest().is_ok());
    }

    #[test]
    fn missing_identity_file_is_reported() {
        let err = ClientIdentity::from_files(Path::new("/nonexistent/cert.pem"), Path::new("/x"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn local_mock_directory_config() {
        let config = DirectoryClientConfig::local_mock("http://127.0.0.1:9000").unwrap();
        assert_eq!(config.hostname.as_str(), "http://127.0.0.1:9000/");
        assert!(config.http_client().is_ok());
        assert!(DirectoryClientConfig::local_mock("not a url").is_err());
    }
}
