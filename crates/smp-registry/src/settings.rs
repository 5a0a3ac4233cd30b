//! # SMP Settings
//!
//! Process-wide runtime toggles, persisted as a singleton record. They gate
//! the out-of-band integrations: SML participant registration on service
//! group create/delete, and Directory publication of business cards.

use serde::{Deserialize, Serialize};
use smp_core::FieldErrors;

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::outcome::Change;
use crate::sml_info::SmlInfo;
use crate::store::Record;

/// Default Directory host.
pub const DEFAULT_DIRECTORY_HOSTNAME: &str = "https://directory.peppol.eu";

/// Global SMP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmpSettings {
    /// Reject all write calls of the REST API except settings changes.
    pub rest_writable_api_disabled: bool,
    /// Business cards are managed and exported.
    pub directory_integration_enabled: bool,
    /// The Directory integration is mandatory for this deployment.
    pub directory_integration_required: bool,
    /// Push business card changes to the Directory automatically.
    pub directory_integration_auto_update: bool,
    /// Base URL of the Directory.
    pub directory_hostname: String,
    /// The SML integration is mandatory for this deployment.
    pub sml_required: bool,
    /// Register participants at the SML on service group create/delete.
    pub sml_active: bool,
    /// ID of the SML configuration in use.
    pub sml_info_id: Option<String>,
}

impl Default for SmpSettings {
    fn default() -> Self {
        Self {
            rest_writable_api_disabled: false,
            directory_integration_enabled: true,
            directory_integration_required: true,
            directory_integration_auto_update: true,
            directory_hostname: DEFAULT_DIRECTORY_HOSTNAME.to_string(),
            sml_required: true,
            sml_active: false,
            sml_info_id: None,
        }
    }
}

impl Record for SmpSettings {
    type Key = ();

    fn key(&self) {}
}

impl SmpSettings {
    /// Whether business card changes are pushed automatically.
    pub fn directory_auto_push(&self) -> bool {
        self.directory_integration_enabled && self.directory_integration_auto_update
    }
}

/// Registry view over the settings singleton.
pub struct SettingsRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl SettingsRegistry<'_> {
    /// Current settings.
    pub fn get(&self) -> SmpSettings {
        self.ctx.settings.get(&()).unwrap_or_default()
    }

    /// The selected SML configuration, whether or not SML is active.
    pub fn selected_sml_info(&self) -> Option<SmlInfo> {
        self.get()
            .sml_info_id
            .and_then(|id| self.ctx.sml_infos.get(&id))
    }

    /// Replace the settings after validation.
    pub fn update(&self, actor: &str, settings: SmpSettings) -> Result<Change, RegistryError> {
        let mut settings = settings;
        settings.directory_hostname = settings.directory_hostname.trim().to_string();
        settings.sml_info_id = settings
            .sml_info_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let mut errors = FieldErrors::new();
        if smp_core::validate_url(&settings.directory_hostname).is_err() {
            errors.add(
                "directoryHostname",
                "The Directory hostname must be a valid URL!",
            );
        }
        match &settings.sml_info_id {
            Some(id) if !self.ctx.sml_infos.contains(id) => {
                errors.add("smlInfoId", "The selected SML configuration does not exist!");
            }
            None if settings.sml_active => {
                errors.add(
                    "smlInfoId",
                    "An SML configuration must be selected when the SML integration is active!",
                );
            }
            _ => {}
        }
        if settings.directory_integration_auto_update && !settings.directory_integration_enabled {
            errors.add(
                "directoryIntegrationAutoUpdate",
                "Automatic Directory updates require the Directory integration to be enabled!",
            );
        }
        errors.into_result()?;

        if self.get() == settings {
            return Ok(Change::Unchanged);
        }
        self.ctx.settings.replace(settings.clone())?;
        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::SettingsUpdate, "settings")
                .with_details(serde_json::to_value(&settings).unwrap_or_default()),
        );
        tracing::info!(
            sml_active = settings.sml_active,
            directory = settings.directory_integration_enabled,
            "settings updated"
        );
        Ok(Change::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sml_info::PEPPOL_SMK_ID;

    #[test]
    fn defaults_are_seeded() {
        let ctx = RegistryContext::builder().build_in_memory();
        let settings = ctx.settings().get();
        assert_eq!(settings, SmpSettings::default());
        assert!(settings.directory_auto_push());
        assert!(!settings.sml_active);
    }

    #[test]
    fn sml_active_requires_configuration() {
        let ctx = RegistryContext::builder().build_in_memory();
        let settings = SmpSettings {
            sml_active: true,
            ..SmpSettings::default()
        };
        let err = ctx.settings().update("admin", settings).unwrap_err();
        assert!(err.field_errors().unwrap().has_field("smlInfoId"));
    }

    #[test]
    fn unknown_configuration_is_rejected() {
        let ctx = RegistryContext::builder().build_in_memory();
        let settings = SmpSettings {
            sml_info_id: Some("missing".to_string()),
            ..SmpSettings::default()
        };
        assert!(ctx.settings().update("admin", settings).is_err());
    }

    #[test]
    fn auto_update_requires_directory() {
        let ctx = RegistryContext::builder().build_in_memory();
        let settings = SmpSettings {
            directory_integration_enabled: false,
            ..SmpSettings::default()
        };
        let err = ctx.settings().update("admin", settings).unwrap_err();
        assert!(err
            .field_errors()
            .unwrap()
            .has_field("directoryIntegrationAutoUpdate"));
    }

    #[test]
    fn update_is_audited_once() {
        let ctx = RegistryContext::builder().build_in_memory();
        let settings = SmpSettings {
            sml_active: true,
            sml_info_id: Some(PEPPOL_SMK_ID.to_string()),
            ..SmpSettings::default()
        };
        assert_eq!(
            ctx.settings().update("admin", settings.clone()).unwrap(),
            Change::Changed
        );
        assert_eq!(
            ctx.settings().update("admin", settings).unwrap(),
            Change::Unchanged
        );
        assert_eq!(ctx.audit().len(), 1);
        assert_eq!(ctx.settings().selected_sml_info().unwrap().id, PEPPOL_SMK_ID);
    }
}
