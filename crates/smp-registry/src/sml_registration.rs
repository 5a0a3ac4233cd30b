//! # SML Registration State
//!
//! Registration of this SMP at an SML, driven by explicit admin actions:
//!
//! ```text
//!                  register
//!  NotRegistered ────────────▶ Registered ──┐
//!        ▲                        │  ▲      │ update (new addresses)
//!        └────────────────────────┘  └──────┘
//!                 unregister
//! ```
//!
//! Addresses are validated before the state is inspected, and the state is
//! only changed after the remote call succeeded. Every attempt, successful
//! or not, is written to the audit trail with the actor, SMP ID, addresses
//! and the SML management URL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smp_core::{validate_smp_addresses, FieldErrors, SmpAddresses};

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::hooks::HookError;
use crate::service_group::with_error;
use crate::sml_info::SmlInfo;
use crate::store::Record;

/// Registration state of this SMP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SmlRegistration {
    /// The SMP is not known to any SML.
    #[default]
    NotRegistered,
    /// The SMP is registered.
    #[serde(rename_all = "camelCase")]
    Registered {
        /// SMP ID used at the SML.
        smp_id: String,
        /// Physical IPv4 address.
        physical_address: String,
        /// Logical address URL.
        logical_address: String,
        /// SML configuration the SMP is registered at.
        sml_info_id: String,
        /// First registration.
        registered_at: DateTime<Utc>,
        /// Last address update.
        updated_at: DateTime<Utc>,
    },
}

impl Record for SmlRegistration {
    type Key = ();

    fn key(&self) {}
}

impl SmlRegistration {
    /// Whether the SMP is registered.
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }
}

/// Set while a remote SML operation is in flight.
#[derive(Debug, Default, Clone)]
pub(crate) struct SmlBusy(Arc<AtomicBool>);

struct BusyGuard(Arc<AtomicBool>);

impl SmlBusy {
    fn acquire(&self) -> Result<BusyGuard, RegistryError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                RegistryError::InvalidState("another SML operation is in progress".to_string())
            })?;
        Ok(BusyGuard(Arc::clone(&self.0)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registry view over the SML registration.
pub struct SmlRegistrationRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl SmlRegistrationRegistry<'_> {
    /// Current state.
    pub fn state(&self) -> SmlRegistration {
        self.ctx.sml_registration.get(&()).unwrap_or_default()
    }

    fn sml_info(&self, sml_info_id: Option<&str>) -> Result<SmlInfo, RegistryError> {
        let id = match sml_info_id {
            Some(id) => Some(id.to_string()),
            None => self.ctx.settings().get().sml_info_id,
        };
        let Some(id) = id else {
            return Err(RegistryError::invalid(
                "smlInfoId",
                "An SML configuration must be selected!",
            ));
        };
        self.ctx.sml_infos.get(&id).ok_or_else(|| {
            RegistryError::invalid("smlInfoId", "The selected SML configuration does not exist!")
        })
    }

    /// Register this SMP at the SML selected by `sml_info_id`, or at the SML
    /// selected in the settings.
    pub async fn register(
        &self,
        actor: &str,
        smp_id: &str,
        physical: &str,
        logical: &str,
        sml_info_id: Option<&str>,
    ) -> Result<SmlRegistration, RegistryError> {
        let addresses = validate(smp_id, physical, logical)?;
        let _busy = self.ctx.sml_busy.acquire()?;
        if self.state().is_registered() {
            return Err(RegistryError::InvalidState(
                "the SMP is already registered at the SML".to_string(),
            ));
        }
        let sml = self.sml_info(sml_info_id)?;

        let result = self
            .ctx
            .sml_registrar
            .create_smp(&sml, smp_id, &addresses)
            .await;
        self.record(actor, AuditAction::SmpSmlCreate, smp_id, Some(&addresses), &sml, &result);
        result.map_err(|source| RegistryError::RemoteSync {
            operation: "create_smp",
            source,
        })?;

        let now = Utc::now();
        let state = SmlRegistration::Registered {
            smp_id: smp_id.to_string(),
            physical_address: addresses.physical.to_string(),
            logical_address: addresses.logical.clone(),
            sml_info_id: sml.id.clone(),
            registered_at: now,
            updated_at: now,
        };
        self.ctx.sml_registration.replace(state.clone())?;
        Ok(state)
    }

    /// Change the addresses of the registered SMP.
    pub async fn update(
        &self,
        actor: &str,
        physical: &str,
        logical: &str,
    ) -> Result<SmlRegistration, RegistryError> {
        let addresses = validate_smp_addresses(physical, logical)?;
        let _busy = self.ctx.sml_busy.acquire()?;
        let SmlRegistration::Registered {
            smp_id,
            sml_info_id,
            registered_at,
            ..
        } = self.state()
        else {
            return Err(RegistryError::InvalidState(
                "the SMP is not registered at the SML".to_string(),
            ));
        };
        let sml = self.sml_info(Some(&sml_info_id))?;

        let result = self
            .ctx
            .sml_registrar
            .update_smp(&sml, &smp_id, &addresses)
            .await;
        self.record(actor, AuditAction::SmpSmlUpdate, &smp_id, Some(&addresses), &sml, &result);
        result.map_err(|source| RegistryError::RemoteSync {
            operation: "update_smp",
            source,
        })?;

        let state = SmlRegistration::Registered {
            smp_id,
            physical_address: addresses.physical.to_string(),
            logical_address: addresses.logical.clone(),
            sml_info_id,
            registered_at,
            updated_at: Utc::now(),
        };
        self.ctx.sml_registration.replace(state.clone())?;
        Ok(state)
    }

    /// Remove the SMP from the SML.
    pub async fn unregister(&self, actor: &str) -> Result<SmlRegistration, RegistryError> {
        let _busy = self.ctx.sml_busy.acquire()?;
        let SmlRegistration::Registered {
            smp_id,
            sml_info_id,
            ..
        } = self.state()
        else {
            return Err(RegistryError::InvalidState(
                "the SMP is not registered at the SML".to_string(),
            ));
        };
        let sml = self.sml_info(Some(&sml_info_id))?;

        let result = self.ctx.sml_registrar.delete_smp(&sml, &smp_id).await;
        self.record(actor, AuditAction::SmpSmlDelete, &smp_id, None, &sml, &result);
        result.map_err(|source| RegistryError::RemoteSync {
            operation: "delete_smp",
            source,
        })?;

        let state = SmlRegistration::NotRegistered;
        self.ctx.sml_registration.replace(state.clone())?;
        Ok(state)
    }

    fn record(
        &self,
        actor: &str,
        action: AuditAction,
        smp_id: &str,
        addresses: Option<&SmpAddresses>,
        sml: &SmlInfo,
        result: &Result<(), HookError>,
    ) {
        let details = json!({
            "smpId": smp_id,
            "physicalAddress": addresses.map(|a| a.physical.to_string()),
            "logicalAddress": addresses.map(|a| a.logical.clone()),
            "smlInfoId": sml.id,
            "smlUrl": sml.manage_service_metadata_url(),
        });
        let event = match result {
            Ok(()) => {
                tracing::info!(%action, smp_id, sml = %sml.display_name, "SML operation succeeded");
                AuditEvent::success(actor, action, smp_id).with_details(details)
            }
            Err(e) => {
                tracing::error!(%action, smp_id, sml = %sml.display_name, error = %e, "SML operation failed");
                AuditEvent::failure(actor, action, smp_id)
                    .with_details(with_error(details, &e.kind, &e.message))
            }
        };
        self.ctx.audit.record_or_log(event);
    }
}

fn validate(smp_id: &str, physical: &str, logical: &str) -> Result<SmpAddresses, FieldErrors> {
    let mut errors = FieldErrors::new();
    if smp_id.trim().is_empty() {
        errors.add("smpId", "The SMP ID must not be empty!");
    }
    match validate_smp_addresses(physical, logical) {
        Ok(addresses) => errors.into_result().map(|()| addresses),
        Err(address_errors) => {
            errors.extend(address_errors);
            Err(errors)
        }
    }
}
