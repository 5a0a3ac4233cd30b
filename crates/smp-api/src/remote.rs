//! # Remote Hook Adapters
//!
//! Implementations of the registry hook traits over the `smp-client` clients.
//! Client errors are reduced to [`HookError`]s carrying the error kind
//! (`UnauthorizedFault`, `Http`, ...) and message for the audit trail.
//!
//! The Directory hostname is a runtime setting, so [`DirectoryHook`] keeps
//! the current client behind a lock and is re-pointed when settings change.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use smp_client::{
    ClientIdentity, DirectoryClient, DirectoryClientConfig, DirectoryError, SmlClient, SmlError,
};
use smp_core::{ParticipantId, SmpAddresses};
use smp_registry::hooks::{DirectoryPublisher, HookError, RegistrationHook, SmlRegistrar};
use smp_registry::sml_info::SmlInfo;

fn sml_hook_error(e: SmlError) -> HookError {
    HookError::new(e.kind(), e.to_string())
}

fn directory_hook_error(e: DirectoryError) -> HookError {
    HookError::new(e.kind(), e.to_string())
}

// -- SML ------------------------------------------------------------------------

/// SML participant registration and SMP registration over [`SmlClient`].
///
/// Without a client (no `SMP_ID` configured) every call fails with kind
/// `NotConfigured`.
#[derive(Debug, Clone, Default)]
pub struct SmlHooks {
    client: Option<Arc<SmlClient>>,
}

impl SmlHooks {
    /// Hooks over `client`.
    pub fn new(client: Option<Arc<SmlClient>>) -> Self {
        Self { client }
    }

    /// The configured SMP ID, if any.
    pub fn smp_id(&self) -> Option<&str> {
        self.client.as_deref().map(SmlClient::smp_id)
    }

    fn client(&self) -> Result<&SmlClient, HookError> {
        self.client.as_deref().ok_or_else(|| {
            HookError::new("NotConfigured", "no SML client is configured for this SMP")
        })
    }

    async fn create(&self, participant: &ParticipantId, sml: &SmlInfo) -> Result<(), HookError> {
        let client = self.client()?;
        client
            .participants(sml)
            .create(participant, client.smp_id())
            .await
            .map_err(sml_hook_error)
    }

    async fn delete(&self, participant: &ParticipantId, sml: &SmlInfo) -> Result<(), HookError> {
        let client = self.client()?;
        client
            .participants(sml)
            .delete(participant, client.smp_id())
            .await
            .map_err(sml_hook_error)
    }
}

#[async_trait]
impl RegistrationHook for SmlHooks {
    async fn create_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError> {
        self.create(participant, sml).await
    }

    async fn undo_create_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError> {
        self.delete(participant, sml).await
    }

    async fn delete_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError> {
        self.delete(participant, sml).await
    }

    async fn undo_delete_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError> {
        self.create(participant, sml).await
    }

    async fn prepare_to_migrate(
        &self,
        participant: &ParticipantId,
        migration_key: &str,
        sml: &SmlInfo,
    ) -> Result<(), HookError> {
        let client = self.client()?;
        client
            .participants(sml)
            .prepare_to_migrate(participant, migration_key, client.smp_id())
            .await
            .map_err(sml_hook_error)
    }

    async fn migrate(
        &self,
        participant: &ParticipantId,
        migration_key: &str,
        sml: &SmlInfo,
    ) -> Result<(), HookError> {
        let client = self.client()?;
        client
            .participants(sml)
            .migrate(participant, migration_key, client.smp_id())
            .await
            .map_err(sml_hook_error)
    }
}

#[async_trait]
impl SmlRegistrar for SmlHooks {
    async fn create_smp(
        &self,
        sml: &SmlInfo,
        smp_id: &str,
        addresses: &SmpAddresses,
    ) -> Result<(), HookError> {
        self.client()?
            .service_metadata(sml)
            .create(smp_id, addresses)
            .await
            .map_err(sml_hook_error)
    }

    async fn update_smp(
        &self,
        sml: &SmlInfo,
        smp_id: &str,
        addresses: &SmpAddresses,
    ) -> Result<(), HookError> {
        self.client()?
            .service_metadata(sml)
            .update(smp_id, addresses)
            .await
            .map_err(sml_hook_error)
    }

    async fn delete_smp(&self, sml: &SmlInfo, smp_id: &str) -> Result<(), HookError> {
        self.client()?
            .service_metadata(sml)
            .delete(smp_id)
            .await
            .map_err(sml_hook_error)
    }
}

// -- Directory ------------------------------------------------------------------

/// Directory publication over [`DirectoryClient`].
#[derive(Debug, Default)]
pub struct DirectoryHook {
    identity: Option<ClientIdentity>,
    current: RwLock<Option<DirectoryClient>>,
}

impl DirectoryHook {
    /// Hook using `identity` for mutual TLS; no hostname yet.
    pub fn new(identity: Option<ClientIdentity>) -> Self {
        Self {
            identity,
            current: RwLock::new(None),
        }
    }

    /// Point the hook at `hostname`. An invalid hostname leaves the hook
    /// without a client; calls then fail with kind `Config`.
    pub fn set_hostname(&self, hostname: &str) {
        let client = DirectoryClientConfig::new(hostname, self.identity.clone())
            .map_err(DirectoryError::from)
            .and_then(|config| DirectoryClient::new(&config));
        match client {
            Ok(client) => {
                tracing::info!(hostname, "Directory client configured");
                *self.current.write() = Some(client);
            }
            Err(e) => {
                tracing::warn!(hostname, error = %e, "Directory client not configured");
                *self.current.write() = None;
            }
        }
    }

    fn client(&self) -> Result<DirectoryClient, HookError> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| HookError::new("Config", "no valid Directory hostname is configured"))
    }
}

#[async_trait]
impl DirectoryPublisher for DirectoryHook {
    async fn add_service_group_to_index(
        &self,
        participant: &ParticipantId,
    ) -> Result<(), HookError> {
        self.client()?
            .add_service_group_to_index(participant)
            .await
            .map_err(directory_hook_error)
    }

    async fn delete_service_group_from_index(
        &self,
        participant: &ParticipantId,
    ) -> Result<(), HookError> {
        self.client()?
            .delete_service_group_from_index(participant)
            .await
            .map_err(directory_hook_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smp_core::IdentifierPolicy;
    use smp_registry::sml_info::PEPPOL_SMK_ID;

    fn participant() -> ParticipantId {
        IdentifierPolicy::peppol()
            .parse_participant("iso6523-actorid-upis::9915:test")
            .unwrap()
    }

    #[tokio::test]
    async fn unconfigured_sml_hooks_fail_with_kind() {
        let sml = SmlInfo::defaults()
            .into_iter()
            .find(|s| s.id == PEPPOL_SMK_ID)
            .unwrap();
        let err = SmlHooks::default()
            .create_participant(&participant(), &sml)
            .await
            .unwrap_err();
        assert_eq!(err.kind, "NotConfigured");
    }

    #[tokio::test]
    async fn directory_hook_without_hostname_fails() {
        let hook = DirectoryHook::new(None);
        hook.set_hostname("not a url");
        let err = hook
            .add_service_group_to_index(&participant())
            .await
            .unwrap_err();
        assert_eq!(err.kind, "Config");
    }
}
