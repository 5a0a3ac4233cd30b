//! # SML Configurations
//!
//! An [`SmlInfo`] describes one Service Metadata Locator: the DNS zone it
//! publishes participants under and the base URL of its management
//! services. The store is seeded with the PEPPOL production SML and the
//! PEPPOL test SML (SMK).

use serde::{Deserialize, Serialize};
use smp_core::FieldErrors;

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::outcome::Change;
use crate::sml_registration::SmlRegistration;
use crate::store::Record;

/// Path suffix of the ManageServiceMetadata service.
pub const MANAGE_SERVICE_METADATA_PATH: &str = "manageservicemetadata";

/// Path suffix of the ManageParticipantIdentifier service.
pub const MANAGE_PARTICIPANT_IDENTIFIER_PATH: &str = "manageparticipantidentifier";

/// ID of the seeded PEPPOL production SML.
pub const PEPPOL_SML_ID: &str = "peppol-sml";

/// ID of the seeded PEPPOL test SML.
pub const PEPPOL_SMK_ID: &str = "peppol-smk";

/// One SML endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmlInfo {
    /// Stable ID.
    pub id: String,
    /// Name shown to operators.
    pub display_name: String,
    /// DNS zone participants are published under. Stored lowercased.
    pub dns_zone: String,
    /// Base URL of the management services.
    pub management_service_url: String,
    /// Whether the SML requires a TLS client certificate.
    pub client_certificate_required: bool,
}

impl Record for SmlInfo {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl SmlInfo {
    /// DNS zone SMP hostnames are published under.
    pub fn publisher_dns_zone(&self) -> String {
        format!("publisher.{}", self.dns_zone)
    }

    /// URL of the ManageServiceMetadata service.
    pub fn manage_service_metadata_url(&self) -> String {
        self.service_url(MANAGE_SERVICE_METADATA_PATH)
    }

    /// URL of the ManageParticipantIdentifier service.
    pub fn manage_participant_identifier_url(&self) -> String {
        self.service_url(MANAGE_PARTICIPANT_IDENTIFIER_PATH)
    }

    fn service_url(&self, suffix: &str) -> String {
        format!(
            "{}/{suffix}",
            self.management_service_url.trim_end_matches('/')
        )
    }

    /// The two PEPPOL locators every installation knows about.
    pub fn defaults() -> Vec<SmlInfo> {
        vec![
            SmlInfo {
                id: PEPPOL_SML_ID.to_string(),
                display_name: "SML".to_string(),
                dns_zone: "edelivery.tech.ec.europa.eu.".to_string(),
                management_service_url: "https://edelivery.tech.ec.europa.eu/edelivery-sml"
                    .to_string(),
                client_certificate_required: true,
            },
            SmlInfo {
                id: PEPPOL_SMK_ID.to_string(),
                display_name: "SMK".to_string(),
                dns_zone: "acc.edelivery.tech.ec.europa.eu.".to_string(),
                management_service_url: "https://acc.edelivery.tech.ec.europa.eu/edelivery-sml"
                    .to_string(),
                client_certificate_required: true,
            },
        ]
    }
}

/// Untrusted SML configuration input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmlInfoInput {
    /// Name shown to operators.
    pub display_name: String,
    /// DNS zone.
    pub dns_zone: String,
    /// Management service base URL.
    pub management_service_url: String,
    /// Whether a client certificate is required.
    #[serde(default)]
    pub client_certificate_required: bool,
}

impl SmlInfoInput {
    fn validate(&self) -> Result<(String, String, String), FieldErrors> {
        let mut errors = FieldErrors::new();

        let display_name = self.display_name.trim();
        if display_name.is_empty() {
            errors.add("displayName", "The SML configuration name must not be empty!");
        }

        let dns_zone = self.dns_zone.trim().to_lowercase();
        if dns_zone.is_empty() {
            errors.add("dnsZone", "The DNS Zone must not be empty!");
        }

        let url = self.management_service_url.trim();
        if url.is_empty() {
            errors.add(
                "managementServiceUrl",
                "The Management Address URL must not be empty!",
            );
        } else {
            match smp_core::validate_url(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => errors.add(
                    "managementServiceUrl",
                    "The Management Address URL is not a valid URL!",
                ),
            }
        }

        errors.into_result()?;
        Ok((display_name.to_string(), dns_zone, url.to_string()))
    }
}

/// Registry view over SML configurations.
pub struct SmlInfoRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl SmlInfoRegistry<'_> {
    /// Create a configuration with a generated ID.
    pub fn create(&self, actor: &str, input: &SmlInfoInput) -> Result<SmlInfo, RegistryError> {
        let (display_name, dns_zone, management_service_url) = input.validate()?;
        let info = SmlInfo {
            id: uuid::Uuid::new_v4().to_string(),
            display_name,
            dns_zone,
            management_service_url,
            client_certificate_required: input.client_certificate_required,
        };
        self.ctx.sml_infos.insert(info.clone())?;
        self.ctx
            .audit
            .record_or_log(AuditEvent::success(actor, AuditAction::SmlInfoCreate, &info.id));
        tracing::info!(id = %info.id, name = %info.display_name, "created SML configuration");
        Ok(info)
    }

    /// Replace the configuration with `id`.
    pub fn update(
        &self,
        actor: &str,
        id: &str,
        input: &SmlInfoInput,
    ) -> Result<Change, RegistryError> {
        let (display_name, dns_zone, management_service_url) = input.validate()?;
        let updated = SmlInfo {
            id: id.to_string(),
            display_name,
            dns_zone,
            management_service_url,
            client_certificate_required: input.client_certificate_required,
        };
        let Some(current) = self.ctx.sml_infos.get(&id.to_string()) else {
            return Err(RegistryError::NotFound(format!("SML configuration '{id}'")));
        };
        if current == updated {
            return Ok(Change::Unchanged);
        }
        self.ctx.sml_infos.replace(updated)?;
        self.ctx
            .audit
            .record_or_log(AuditEvent::success(actor, AuditAction::SmlInfoUpdate, id));
        Ok(Change::Changed)
    }

    /// Delete the configuration with `id`.
    ///
    /// Rejected while the settings or the SMP registration reference it.
    pub fn delete(&self, actor: &str, id: &str) -> Result<Change, RegistryError> {
        if self.ctx.settings().get().sml_info_id.as_deref() == Some(id) {
            return Err(RegistryError::conflict(
                "smlInfoId",
                "The SML configuration is selected in the settings and cannot be deleted.",
            ));
        }
        if let SmlRegistration::Registered { sml_info_id, .. } =
            self.ctx.sml_registration().state()
        {
            if sml_info_id == id {
                return Err(RegistryError::conflict(
                    "smlInfoId",
                    "The SMP is registered at this SML and the configuration cannot be deleted.",
                ));
            }
        }
        let removed = self.ctx.sml_infos.remove(&id.to_string())?;
        if removed.is_some() {
            self.ctx
                .audit
                .record_or_log(AuditEvent::success(actor, AuditAction::SmlInfoDelete, id));
        }
        Ok(Change::from_bool(removed.is_some()))
    }

    /// Configuration by ID.
    pub fn get(&self, id: &str) -> Option<SmlInfo> {
        self.ctx.sml_infos.get(&id.to_string())
    }

    /// All configurations.
    pub fn get_all(&self) -> Vec<SmlInfo> {
        self.ctx.sml_infos.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(url: &str) -> SmlInfoInput {
        SmlInfoInput {
            display_name: "Local".to_string(),
            dns_zone: "SML.Example.ORG".to_string(),
            management_service_url: url.to_string(),
            client_certificate_required: false,
        }
    }

    #[test]
    fn derived_urls() {
        let info = &SmlInfo::defaults()[0];
        assert_eq!(
            info.manage_service_metadata_url(),
            "https://edelivery.tech.ec.europa.eu/edelivery-sml/manageservicemetadata"
        );
        assert_eq!(
            info.manage_participant_identifier_url(),
            "https://edelivery.tech.ec.europa.eu/edelivery-sml/manageparticipantidentifier"
        );
        assert_eq!(info.publisher_dns_zone(), "publisher.edelivery.tech.ec.europa.eu.");
    }

    #[test]
    fn trailing_slash_is_not_doubled() {
        let mut info = SmlInfo::defaults()[1].clone();
        info.management_service_url.push('/');
        assert!(info
            .manage_service_metadata_url()
            .ends_with("edelivery-sml/manageservicemetadata"));
    }

    #[test]
    fn create_lowercases_zone() {
        let ctx = RegistryContext::builder().build_in_memory();
        let info = ctx
            .sml_infos()
            .create("admin", &input("http://sml.example.org/manage"))
            .unwrap();
        assert_eq!(info.dns_zone, "sml.example.org");
        assert_eq!(ctx.sml_infos().get_all().len(), 3);
    }

    #[test]
    fn rejects_non_http_url() {
        let ctx = RegistryContext::builder().build_in_memory();
        let err = ctx
            .sml_infos()
            .create("admin", &input("ftp://sml.example.org"))
            .unwrap_err();
        assert!(err.field_errors().unwrap().has_field("managementServiceUrl"));
    }

    #[test]
    fn rejects_empty_fields() {
        let ctx = RegistryContext::builder().build_in_memory();
        let err = ctx
            .sml_infos()
            .create("admin", &SmlInfoInput::default())
            .unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.has_field("displayName"));
        assert!(fields.has_field("dnsZone"));
        assert!(fields.has_field("managementServiceUrl"));
    }

    #[test]
    fn selected_configuration_cannot_be_deleted() {
        let ctx = RegistryContext::builder().build_in_memory();
        let mut settings = ctx.settings().get();
        settings.sml_info_id = Some(PEPPOL_SMK_ID.to_string());
        ctx.settings().update("admin", settings).unwrap();
        let err = ctx.sml_infos().delete("admin", PEPPOL_SMK_ID).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
        assert_eq!(
            ctx.sml_infos().delete("admin", PEPPOL_SML_ID).unwrap(),
            Change::Changed
        );
    }

    #[test]
    fn update_unknown_is_not_found() {
        let ctx = RegistryContext::builder().build_in_memory();
        let err = ctx
            .sml_infos()
            .update("admin", "nope", &input("https://sml.example.org"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
