//! # Server Configuration
//!
//! [`AppConfig`] is read from the environment once at startup:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `PORT` | `8080` | listen port |
//! | `AUTH_TOKEN` | unset | bearer secret; unset disables auth |
//! | `SMP_DATA_DIR` | unset | directory of the JSON stores; unset keeps data in memory |
//! | `SMP_DEFAULT_OWNER` | `admin` | owner used when an imported owner is unknown |
//! | `SMP_KNOWN_OWNERS` | unset | comma-separated user IDs accepted as owners on import |

use std::collections::BTreeSet;
use std::path::PathBuf;

/// Default owner of imported service groups and identity of bare-secret callers.
pub const DEFAULT_OWNER: &str = "admin";

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer secret. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Data directory of the file-backed stores.
    pub data_dir: Option<PathBuf>,
    /// Fallback owner on import.
    pub default_owner: String,
    /// Users that may own service groups. `None` accepts any owner.
    pub known_owners: Option<BTreeSet<String>>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("data_dir", &self.data_dir)
            .field("default_owner", &self.default_owner)
            .field("known_owners", &self.known_owners)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            data_dir: None,
            default_owner: DEFAULT_OWNER.to_string(),
            known_owners: None,
        }
    }
}

impl AppConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            auth_token: var("AUTH_TOKEN"),
            data_dir: var("SMP_DATA_DIR").map(PathBuf::from),
            default_owner: var("SMP_DEFAULT_OWNER").unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            known_owners: var("SMP_KNOWN_OWNERS").map(|raw| parse_owner_list(&raw)),
        }
    }

    /// In-memory configuration with auth enabled for `token`.
    pub fn local_mock(token: &str) -> Self {
        Self {
            auth_token: Some(token.to_string()),
            ..Self::default()
        }
    }
}

fn parse_owner_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let output = format!("{:?}", AppConfig::local_mock("super-secret"));
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("super-secret"));
    }

    #[test]
    fn owner_list_ignores_blanks() {
        let owners = parse_owner_list(" alice, ,bob,alice ");
        assert_eq!(owners.into_iter().collect::<Vec<_>>(), vec!["alice", "bob"]);
    }
}
