//! Transport profiles endpoints may reference.

use serde::{Deserialize, Serialize};
use smp_core::FieldErrors;

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::outcome::Change;
use crate::store::Record;

/// PEPPOL AS4 v2.0.
pub const PEPPOL_AS4_V2: &str = "peppol-transport-as4-v2_0";
/// PEPPOL AS2 v2.0.
pub const PEPPOL_AS2_V2: &str = "busdox-transport-as2-ver2p0";
/// PEPPOL AS2 v1.0, deprecated.
pub const PEPPOL_AS2_V1: &str = "busdox-transport-as2-ver1p0";

/// A transport profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportProfile {
    /// Profile ID as published in endpoints.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Deprecated profiles remain usable but should be phased out.
    #[serde(default)]
    pub deprecated: bool,
}

impl Record for TransportProfile {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl TransportProfile {
    /// Profiles present in a fresh installation.
    pub fn defaults() -> Vec<TransportProfile> {
        vec![
            TransportProfile {
                id: PEPPOL_AS4_V2.to_string(),
                name: "Peppol AS4 v2".to_string(),
                deprecated: false,
            },
            TransportProfile {
                id: PEPPOL_AS2_V2.to_string(),
                name: "Peppol AS2 v2".to_string(),
                deprecated: false,
            },
            TransportProfile {
                id: PEPPOL_AS2_V1.to_string(),
                name: "Peppol AS2 v1".to_string(),
                deprecated: true,
            },
        ]
    }
}

/// Registry view over transport profiles.
pub struct TransportProfileRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl TransportProfileRegistry<'_> {
    /// Create a profile. The ID must be unused.
    pub fn create(
        &self,
        actor: &str,
        profile: TransportProfile,
    ) -> Result<TransportProfile, RegistryError> {
        let profile = validate(profile)?;
        if !self.ctx.transport_profiles.insert(profile.clone())? {
            return Err(RegistryError::conflict(
                "id",
                format!("Another transport profile with ID '{}' is already present.", profile.id),
            ));
        }
        self.ctx.audit.record_or_log(AuditEvent::success(
            actor,
            AuditAction::TransportProfileCreate,
            &profile.id,
        ));
        Ok(profile)
    }

    /// Change name and deprecation flag of an existing profile.
    pub fn update(
        &self,
        actor: &str,
        id: &str,
        name: &str,
        deprecated: bool,
    ) -> Result<Change, RegistryError> {
        let updated = validate(TransportProfile {
            id: id.to_string(),
            name: name.to_string(),
            deprecated,
        })?;
        let Some(current) = self.ctx.transport_profiles.get(&updated.id) else {
            return Err(RegistryError::NotFound(format!("transport profile '{id}'")));
        };
        if current == updated {
            return Ok(Change::Unchanged);
        }
        self.ctx.transport_profiles.replace(updated)?;
        self.ctx.audit.record_or_log(AuditEvent::success(
            actor,
            AuditAction::TransportProfileUpdate,
            id,
        ));
        Ok(Change::Changed)
    }

    /// Delete a profile no endpoint uses.
    ///
    /// Holds the service information gate so no endpoint can start using the
    /// profile between the check and the removal.
    pub fn delete(&self, actor: &str, id: &str) -> Result<Change, RegistryError> {
        let gate = self.ctx.service_info_gate.lock();
        if self
            .ctx
            .service_information()
            .contains_any_endpoint_with_transport_profile(id)
        {
            return Err(RegistryError::conflict(
                "id",
                "The transport profile is used by at least one endpoint and cannot be deleted.",
            ));
        }
        let removed = self.ctx.transport_profiles.remove(&id.to_string())?;
        drop(gate);
        if removed.is_some() {
            self.ctx.audit.record_or_log(AuditEvent::success(
                actor,
                AuditAction::TransportProfileDelete,
                id,
            ));
        }
        Ok(Change::from_bool(removed.is_some()))
    }

    /// Profile by ID.
    pub fn get(&self, id: &str) -> Option<TransportProfile> {
        self.ctx.transport_profiles.get(&id.to_string())
    }

    /// Whether a profile with `id` exists.
    pub fn contains(&self, id: &str) -> bool {
        self.ctx.transport_profiles.contains(&id.to_string())
    }

    /// All profiles.
    pub fn get_all(&self) -> Vec<TransportProfile> {
        self.ctx.transport_profiles.list()
    }
}

fn validate(profile: TransportProfile) -> Result<TransportProfile, FieldErrors> {
    let id = profile.id.trim().to_string();
    let name = profile.name.trim().to_string();
    let mut errors = FieldErrors::new();
    if id.is_empty() {
        errors.add("id", "The transport profile ID must not be empty!");
    }
    if name.is_empty() {
        errors.add("name", "The transport profile name must not be empty!");
    }
    errors.into_result()?;
    Ok(TransportProfile {
        id,
        name,
        deprecated: profile.deprecated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> TransportProfile {
        TransportProfile {
            id: id.to_string(),
            name: "Custom".to_string(),
            deprecated: false,
        }
    }

    #[test]
    fn seeded_with_peppol_profiles() {
        let ctx = RegistryContext::builder().build_in_memory();
        let all = ctx.transport_profiles().get_all();
        assert_eq!(all.len(), 3);
        assert!(ctx.transport_profiles().get(PEPPOL_AS2_V1).unwrap().deprecated);
    }

    #[test]
    fn duplicate_id_conflicts() {
        let ctx = RegistryContext::builder().build_in_memory();
        let err = ctx
            .transport_profiles()
            .create("admin", profile(PEPPOL_AS4_V2))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[test]
    fn empty_fields_are_rejected() {
        let ctx = RegistryContext::builder().build_in_memory();
        let err = ctx
            .transport_profiles()
            .create(
                "admin",
                TransportProfile {
                    id: " ".to_string(),
                    name: String::new(),
                    deprecated: false,
                },
            )
            .unwrap_err();
        assert_eq!(err.field_errors().unwrap().len(), 2);
    }

    #[test]
    fn update_and_delete_unused() {
        let ctx = RegistryContext::builder().build_in_memory();
        let registry = ctx.transport_profiles();
        registry.create("admin", profile("custom")).unwrap();
        assert_eq!(
            registry.update("admin", "custom", "Custom", true).unwrap(),
            Change::Changed
        );
        assert_eq!(
            registry.update("admin", "custom", "Custom", true).unwrap(),
            Change::Unchanged
        );
        assert_eq!(registry.delete("admin", "custom").unwrap(), Change::Changed);
        assert_eq!(registry.delete("admin", "custom").unwrap(), Change::Unchanged);
    }
}
