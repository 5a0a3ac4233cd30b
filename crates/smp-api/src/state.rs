//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. It holds:
//!
//! - **Registry** ([`RegistryContext`]): every SMP record, the settings and
//!   the audit trail, in memory or backed by `SMP_DATA_DIR`
//! - **SML hooks** ([`SmlHooks`]): participant and SMP registration at the SML
//! - **Directory hook** ([`DirectoryHook`]): business card publication,
//!   re-pointed whenever the Directory hostname setting changes
//! - **DNS checker** ([`DnsChecker`]): verification of SML registrations

use std::sync::Arc;

use smp_client::{ClientIdentity, DnsChecker, SmlClient};
use smp_registry::exchange::ImportOptions;
use smp_registry::store::FileStorage;
use smp_registry::{RegistryContext, RegistryContextBuilder, StoreError};

use crate::auth::AuthConfig;
use crate::config::AppConfig;
use crate::remote::{DirectoryHook, SmlHooks};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<AppConfig>,
    /// The SMP registry.
    pub registry: RegistryContext,
    /// SML adapters; also know the configured SMP ID.
    pub sml: SmlHooks,
    /// Directory adapter.
    pub directory: Arc<DirectoryHook>,
    /// DNS checker for `checkdns` endpoints.
    pub dns: DnsChecker,
}

impl AppState {
    /// In-memory state with default configuration (auth disabled) and no
    /// SML client.
    pub fn new() -> Self {
        Self::in_memory(AppConfig::default(), None)
    }

    /// In-memory state, ignoring `config.data_dir`.
    pub fn in_memory(config: AppConfig, sml_client: Option<SmlClient>) -> Self {
        let (builder, sml, directory) = Self::hooks(sml_client, None);
        Self::assemble(config, builder.build_in_memory(), sml, directory)
    }

    /// State over `config.data_dir` when set, in memory otherwise.
    pub fn open(
        config: AppConfig,
        sml_client: Option<SmlClient>,
        identity: Option<ClientIdentity>,
    ) -> Result<Self, StoreError> {
        let (builder, sml, directory) = Self::hooks(sml_client, identity);
        let registry = match &config.data_dir {
            Some(dir) => {
                let storage = FileStorage::open(dir)?;
                tracing::info!(dir = %storage.dir().display(), "using file-backed stores");
                builder.build(&storage)?
            }
            None => {
                tracing::warn!("SMP_DATA_DIR not set, data is kept in memory only");
                builder.build_in_memory()
            }
        };
        Ok(Self::assemble(config, registry, sml, directory))
    }

    /// Replace the DNS checker.
    pub fn with_dns(mut self, dns: DnsChecker) -> Self {
        self.dns = dns;
        self
    }

    fn hooks(
        sml_client: Option<SmlClient>,
        identity: Option<ClientIdentity>,
    ) -> (RegistryContextBuilder, SmlHooks, Arc<DirectoryHook>) {
        let sml = SmlHooks::new(sml_client.map(Arc::new));
        let directory = Arc::new(DirectoryHook::new(identity));
        let builder = RegistryContext::builder()
            .registration_hook(Arc::new(sml.clone()))
            .sml_registrar(Arc::new(sml.clone()))
            .directory_publisher(directory.clone());
        (builder, sml, directory)
    }

    fn assemble(
        config: AppConfig,
        registry: RegistryContext,
        sml: SmlHooks,
        directory: Arc<DirectoryHook>,
    ) -> Self {
        directory.set_hostname(&registry.settings().get().directory_hostname);
        Self {
            config: Arc::new(config),
            registry,
            sml,
            directory,
            dns: DnsChecker::default(),
        }
    }

    /// Auth configuration for the middleware.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            token: self.config.auth_token.clone(),
            admin_user: self.config.default_owner.clone(),
        }
    }

    /// Import options from the configuration, with per-request overrides.
    pub fn import_options(&self, overwrite: bool, default_owner: Option<String>) -> ImportOptions {
        ImportOptions {
            overwrite_existing: overwrite,
            default_owner: default_owner.unwrap_or_else(|| self.config.default_owner.clone()),
            known_owners: self.config.known_owners.clone(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
