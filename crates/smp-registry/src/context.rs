//! # Registry Context
//!
//! [`RegistryContext`] holds every store, the identifier policy and the
//! remote hooks. It is built once at startup and passed explicitly to the
//! REST layer, the CLI and tests. Cloning is cheap: all state sits behind
//! `Arc`s.

use std::sync::Arc;

use parking_lot::Mutex;
use smp_core::IdentifierPolicy;

use crate::audit::AuditTrail;
use crate::business_card::{BusinessCard, BusinessCardRegistry};
use crate::error::{RegistryError, StoreError};
use crate::exchange::Exchange;
use crate::hooks::{
    DirectoryPublisher, NoopDirectoryPublisher, NoopRegistrationHook, RegistrationHook,
    SmlRegistrar, UnconfiguredSmlRegistrar,
};
use crate::migration::{ParticipantMigration, ParticipantMigrationRegistry};
use crate::redirect::{Redirect, RedirectRegistry};
use crate::service_group::{PendingParticipants, ServiceGroup, ServiceGroupRegistry};
use crate::service_info::{ServiceInformation, ServiceInformationRegistry};
use crate::settings::{SettingsRegistry, SmpSettings};
use crate::sml_info::{SmlInfo, SmlInfoRegistry};
use crate::sml_registration::{SmlBusy, SmlRegistration, SmlRegistrationRegistry};
use crate::store::{Storage, Store};
use crate::transport_profile::{TransportProfile, TransportProfileRegistry};

/// Shared registry state.
#[derive(Clone)]
pub struct RegistryContext {
    pub(crate) service_groups: Store<ServiceGroup>,
    pub(crate) service_infos: Store<ServiceInformation>,
    pub(crate) redirects: Store<Redirect>,
    pub(crate) business_cards: Store<BusinessCard>,
    pub(crate) transport_profiles: Store<TransportProfile>,
    pub(crate) sml_infos: Store<SmlInfo>,
    pub(crate) settings: Store<SmpSettings>,
    pub(crate) sml_registration: Store<SmlRegistration>,
    pub(crate) participant_migrations: Store<ParticipantMigration>,
    pub(crate) audit: AuditTrail,
    pub(crate) policy: IdentifierPolicy,
    pub(crate) registration_hook: Arc<dyn RegistrationHook>,
    pub(crate) directory: Arc<dyn DirectoryPublisher>,
    pub(crate) sml_registrar: Arc<dyn SmlRegistrar>,
    /// Serializes read-modify-write on service information and redirects.
    pub(crate) service_info_gate: Arc<Mutex<()>>,
    pub(crate) pending_participants: PendingParticipants,
    pub(crate) pending_migrations: PendingParticipants,
    pub(crate) sml_busy: SmlBusy,
}

impl std::fmt::Debug for RegistryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryContext")
            .field("service_groups", &self.service_groups.len())
            .field("service_infos", &self.service_infos.len())
            .field("redirects", &self.redirects.len())
            .field("business_cards", &self.business_cards.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RegistryContext {
    /// Start building a context.
    pub fn builder() -> RegistryContextBuilder {
        RegistryContextBuilder::default()
    }

    /// Service group registry.
    pub fn service_groups(&self) -> ServiceGroupRegistry<'_> {
        ServiceGroupRegistry { ctx: self }
    }

    /// Service information registry.
    pub fn service_information(&self) -> ServiceInformationRegistry<'_> {
        ServiceInformationRegistry { ctx: self }
    }

    /// Redirect registry.
    pub fn redirects(&self) -> RedirectRegistry<'_> {
        RedirectRegistry { ctx: self }
    }

    /// Business card registry.
    pub fn business_cards(&self) -> BusinessCardRegistry<'_> {
        BusinessCardRegistry { ctx: self }
    }

    /// Transport profile registry.
    pub fn transport_profiles(&self) -> TransportProfileRegistry<'_> {
        TransportProfileRegistry { ctx: self }
    }

    /// SML configuration registry.
    pub fn sml_infos(&self) -> SmlInfoRegistry<'_> {
        SmlInfoRegistry { ctx: self }
    }

    /// Settings.
    pub fn settings(&self) -> SettingsRegistry<'_> {
        SettingsRegistry { ctx: self }
    }

    /// SML registration of this SMP.
    pub fn sml_registration(&self) -> SmlRegistrationRegistry<'_> {
        SmlRegistrationRegistry { ctx: self }
    }

    /// Participant migrations between SMPs.
    pub fn participant_migrations(&self) -> ParticipantMigrationRegistry<'_> {
        ParticipantMigrationRegistry { ctx: self }
    }

    /// Import and export.
    pub fn exchange(&self) -> Exchange<'_> {
        Exchange { ctx: self }
    }

    /// Audit trail.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Identifier policy.
    pub fn policy(&self) -> &IdentifierPolicy {
        &self.policy
    }

    /// The SML configuration to sync participants with, or `None` when the
    /// SML integration is inactive.
    pub(crate) fn active_sml(&self) -> Result<Option<SmlInfo>, RegistryError> {
        let settings = self.settings().get();
        if !settings.sml_active {
            return Ok(None);
        }
        settings
            .sml_info_id
            .and_then(|id| self.sml_infos.get(&id))
            .map(Some)
            .ok_or_else(|| {
                RegistryError::InvalidState(
                    "the SML integration is active but no SML configuration is selected"
                        .to_string(),
                )
            })
    }
}

/// Builder for [`RegistryContext`].
pub struct RegistryContextBuilder {
    policy: IdentifierPolicy,
    registration_hook: Arc<dyn RegistrationHook>,
    directory: Arc<dyn DirectoryPublisher>,
    sml_registrar: Arc<dyn SmlRegistrar>,
    initial_settings: Option<SmpSettings>,
}

impl Default for RegistryContextBuilder {
    fn default() -> Self {
        Self {
            policy: IdentifierPolicy::default(),
            registration_hook: Arc::new(NoopRegistrationHook),
            directory: Arc::new(NoopDirectoryPublisher),
            sml_registrar: Arc::new(UnconfiguredSmlRegistrar),
            initial_settings: None,
        }
    }
}

impl RegistryContextBuilder {
    /// Identifier policy; PEPPOL by default.
    pub fn policy(mut self, policy: IdentifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// SML participant registration hook.
    pub fn registration_hook(mut self, hook: Arc<dyn RegistrationHook>) -> Self {
        self.registration_hook = hook;
        self
    }

    /// Directory publisher.
    pub fn directory_publisher(mut self, publisher: Arc<dyn DirectoryPublisher>) -> Self {
        self.directory = publisher;
        self
    }

    /// SMP registrar.
    pub fn sml_registrar(mut self, registrar: Arc<dyn SmlRegistrar>) -> Self {
        self.sml_registrar = registrar;
        self
    }

    /// Settings used when storage holds none yet.
    pub fn initial_settings(mut self, settings: SmpSettings) -> Self {
        self.initial_settings = Some(settings);
        self
    }

    /// Build over `storage`, seeding transport profiles, SML configurations
    /// and settings when their collections are empty.
    pub fn build(self, storage: &dyn Storage) -> Result<RegistryContext, StoreError> {
        let transport_profiles = Store::open(storage, "transport-profiles")?;
        if transport_profiles.is_empty() {
            for profile in TransportProfile::defaults() {
                transport_profiles.insert(profile)?;
            }
        }
        let sml_infos = Store::open(storage, "sml-infos")?;
        if sml_infos.is_empty() {
            for info in SmlInfo::defaults() {
                sml_infos.insert(info)?;
            }
        }
        let settings = Store::open(storage, "settings")?;
        if settings.is_empty() {
            settings.insert(self.initial_settings.clone().unwrap_or_default())?;
        }

        let ctx = RegistryContext {
            service_groups: Store::open(storage, "service-groups")?,
            service_infos: Store::open(storage, "service-information")?,
            redirects: Store::open(storage, "redirects")?,
            business_cards: Store::open(storage, "business-cards")?,
            transport_profiles,
            sml_infos,
            settings,
            sml_registration: Store::open(storage, "sml-registration")?,
            participant_migrations: Store::open(storage, "participant-migrations")?,
            audit: AuditTrail::open(storage)?,
            policy: self.policy,
            registration_hook: self.registration_hook,
            directory: self.directory,
            sml_registrar: self.sml_registrar,
            service_info_gate: Arc::new(Mutex::new(())),
            pending_participants: PendingParticipants::default(),
            pending_migrations: PendingParticipants::default(),
            sml_busy: SmlBusy::default(),
        };
        tracing::info!(
            service_groups = ctx.service_groups.len(),
            service_information = ctx.service_infos.len(),
            redirects = ctx.redirects.len(),
            business_cards = ctx.business_cards.len(),
            participant_migrations = ctx.participant_migrations.len(),
            "registry loaded"
        );
        Ok(ctx)
    }

    /// Build with in-memory stores only.
    pub fn build_in_memory(self) -> RegistryContext {
        RegistryContext {
            service_groups: Store::in_memory("service-groups"),
            service_infos: Store::in_memory("service-information"),
            redirects: Store::in_memory("redirects"),
            business_cards: Store::in_memory("business-cards"),
            transport_profiles: Store::in_memory_with(
                "transport-profiles",
                TransportProfile::defaults(),
            ),
            sml_infos: Store::in_memory_with("sml-infos", SmlInfo::defaults()),
            settings: Store::in_memory_with(
                "settings",
                [self.initial_settings.unwrap_or_default()],
            ),
            sml_registration: Store::in_memory("sml-registration"),
            participant_migrations: Store::in_memory("participant-migrations"),
            audit: AuditTrail::in_memory(),
            policy: self.policy,
            registration_hook: self.registration_hook,
            directory: self.directory,
            sml_registrar: self.sml_registrar,
            service_info_gate: Arc::new(Mutex::new(())),
            pending_participants: PendingParticipants::default(),
            pending_migrations: PendingParticipants::default(),
            sml_busy: SmlBusy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStorage;

    #[test]
    fn file_context_seeds_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        {
            let ctx = RegistryContext::builder().build(&storage).unwrap();
            assert_eq!(ctx.transport_profiles().get_all().len(), 3);
            ctx.transport_profiles()
                .delete("admin", crate::transport_profile::PEPPOL_AS2_V1)
                .unwrap();
        }
        let ctx = RegistryContext::builder().build(&storage).unwrap();
        assert_eq!(ctx.transport_profiles().get_all().len(), 2);
        assert_eq!(ctx.sml_infos().get_all().len(), 2);
        assert_eq!(ctx.audit().len(), 1);
    }

    #[test]
    fn initial_settings_apply_to_fresh_storage() {
        let ctx = RegistryContext::builder()
            .initial_settings(SmpSettings {
                directory_integration_auto_update: false,
                ..SmpSettings::default()
            })
            .build_in_memory();
        assert!(!ctx.settings().get().directory_auto_push());
    }

    #[test]
    fn inactive_sml_yields_none() {
        let ctx = RegistryContext::builder().build_in_memory();
        assert!(ctx.active_sml().unwrap().is_none());
    }
}
