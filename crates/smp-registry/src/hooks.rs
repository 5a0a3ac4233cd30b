//! # Out-of-Band Hooks
//!
//! Traits for the remote side effects triggered by registry mutations:
//!
//! - [`RegistrationHook`]: participant registration at the SML, called on
//!   service group create and delete when SML integration is active, and
//!   the two halves of a participant migration between SMPs.
//! - [`DirectoryPublisher`]: business card publication to the Directory.
//! - [`SmlRegistrar`]: registration of this SMP itself at the SML.
//!
//! The registry owns the failure policy; implementations only report what
//! happened. Concrete adapters over HTTP clients live in the API crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smp_core::{ParticipantId, SmpAddresses};

use crate::sml_info::SmlInfo;

/// Failure of a remote call, with enough detail for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HookError {
    /// Technical class of the failure (e.g. `BadRequestFault`, `Http`).
    pub kind: String,
    /// Technical message.
    pub message: String,
}

impl HookError {
    /// Build an error from its parts.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Participant registration at the SML.
#[async_trait]
pub trait RegistrationHook: Send + Sync {
    /// Register `participant` as served by this SMP.
    async fn create_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError>;

    /// Compensate a successful [`create_participant`](Self::create_participant)
    /// whose local counterpart could not be stored.
    async fn undo_create_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError>;

    /// Remove the registration of `participant`.
    async fn delete_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError>;

    /// Compensate a successful [`delete_participant`](Self::delete_participant)
    /// whose local counterpart could not be removed.
    async fn undo_delete_participant(
        &self,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), HookError>;

    /// Announce that `participant` leaves this SMP. The SMP taking over has
    /// to present `migration_key`.
    async fn prepare_to_migrate(
        &self,
        participant: &ParticipantId,
        migration_key: &str,
        sml: &SmlInfo,
    ) -> Result<(), HookError>;

    /// Move `participant` from its current SMP to this one.
    async fn migrate(
        &self,
        participant: &ParticipantId,
        migration_key: &str,
        sml: &SmlInfo,
    ) -> Result<(), HookError>;
}

/// Business card publication to the Directory.
#[async_trait]
pub trait DirectoryPublisher: Send + Sync {
    /// Ask the Directory to (re)index the card of `participant`.
    async fn add_service_group_to_index(&self, participant: &ParticipantId)
        -> Result<(), HookError>;

    /// Ask the Directory to drop the card of `participant`.
    async fn delete_service_group_from_index(
        &self,
        participant: &ParticipantId,
    ) -> Result<(), HookError>;
}

/// Registration of this SMP at the SML.
#[async_trait]
pub trait SmlRegistrar: Send + Sync {
    /// Create the SMP entry.
    async fn create_smp(
        &self,
        sml: &SmlInfo,
        smp_id: &str,
        addresses: &SmpAddresses,
    ) -> Result<(), HookError>;

    /// Change the addresses of the SMP entry.
    async fn update_smp(
        &self,
        sml: &SmlInfo,
        smp_id: &str,
        addresses: &SmpAddresses,
    ) -> Result<(), HookError>;

    /// Delete the SMP entry.
    async fn delete_smp(&self, sml: &SmlInfo, smp_id: &str) -> Result<(), HookError>;
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Registration hook that accepts everything without a remote call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrationHook;

#[async_trait]
impl RegistrationHook for NoopRegistrationHook {
    async fn create_participant(&self, _: &ParticipantId, _: &SmlInfo) -> Result<(), HookError> {
        Ok(())
    }

    async fn undo_create_participant(
        &self,
        _: &ParticipantId,
        _: &SmlInfo,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn delete_participant(&self, _: &ParticipantId, _: &SmlInfo) -> Result<(), HookError> {
        Ok(())
    }

    async fn undo_delete_participant(
        &self,
        _: &ParticipantId,
        _: &SmlInfo,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn prepare_to_migrate(
        &self,
        _: &ParticipantId,
        _: &str,
        _: &SmlInfo,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn migrate(&self, _: &ParticipantId, _: &str, _: &SmlInfo) -> Result<(), HookError> {
        Ok(())
    }
}

/// Directory publisher that accepts everything without a remote call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirectoryPublisher;

#[async_trait]
impl DirectoryPublisher for NoopDirectoryPublisher {
    async fn add_service_group_to_index(&self, _: &ParticipantId) -> Result<(), HookError> {
        Ok(())
    }

    async fn delete_service_group_from_index(&self, _: &ParticipantId) -> Result<(), HookError> {
        Ok(())
    }
}

/// Registrar used when no SML client is configured. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredSmlRegistrar;

impl UnconfiguredSmlRegistrar {
    fn error() -> HookError {
        HookError::new("NotConfigured", "no SML client is configured for this SMP")
    }
}

#[async_trait]
impl SmlRegistrar for UnconfiguredSmlRegistrar {
    async fn create_smp(&self, _: &SmlInfo, _: &str, _: &SmpAddresses) -> Result<(), HookError> {
        Err(Self::error())
    }

    async fn update_smp(&self, _: &SmlInfo, _: &str, _: &SmpAddresses) -> Result<(), HookError> {
        Err(Self::error())
    }

    async fn delete_smp(&self, _: &SmlInfo, _: &str) -> Result<(), HookError> {
        Err(Self::error())
    }
}
