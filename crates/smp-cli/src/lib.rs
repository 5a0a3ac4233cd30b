//! # smp-cli: CLI Tool for the SMP
//!
//! Provides the `smp` command-line interface. Every command opens the
//! file-backed stores in the data directory and runs the same registry
//! operations as the admin API, so validation, SML synchronization and the
//! audit trail behave identically.
//!
//! ## Subcommands
//!
//! - `smp export`: Write service groups to exchange XML.
//! - `smp import`: Read exchange XML into the data directory.
//! - `smp cert inspect`: Print subject, issuer and validity of a certificate.
//! - `smp sml`: Validate SMP addresses, register, update or unregister this
//!   SMP at the SML and check its DNS entry.
//! - `smp migration`: Move participants to or from another SMP.
//!
//! ```bash
//! smp --data-dir /var/lib/smp export --owner alice --output alice.xml
//! smp --data-dir /var/lib/smp import backup.xml --overwrite
//! SMP_ID=SMP-1 smp sml register --physical 192.0.2.10 --logical http://smp.example.org
//! SMP_ID=SMP-1 smp migration inbound iso6523-actorid-upis::9915:test --key 'Ab12@#cdEF34' --owner alice
//! ```

pub mod cert;
pub mod exchange;
pub mod migration;
pub mod sml;

use std::path::Path;

use anyhow::{Context, Result};
use smp_api::config::AppConfig;
use smp_api::state::AppState;
use smp_client::{ClientIdentity, SmlClient};

/// Actor recorded in the audit trail for CLI changes.
pub const CLI_ACTOR: &str = "smp-cli";

/// Open the stores in `data_dir` with the environment's owner settings and
/// client identity.
pub fn open_state(data_dir: &Path, sml_client: Option<SmlClient>) -> Result<AppState> {
    let config = AppConfig {
        data_dir: Some(data_dir.to_path_buf()),
        ..AppConfig::from_env()
    };
    let identity = ClientIdentity::from_env().context("invalid client identity")?;
    AppState::open(config, sml_client, identity)
        .with_context(|| format!("failed to open data directory: {}", data_dir.display()))
}

/// Single-threaded runtime for the async registry operations.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_state_creates_the_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let state = open_state(&data_dir, None).unwrap();
        assert!(data_dir.is_dir());
        assert!(state.registry.service_groups().get_all().is_empty());
    }
}
