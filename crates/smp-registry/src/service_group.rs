//! # Service Groups
//!
//! A service group is the registry entry of one participant. It owns all
//! service information, redirects and the business card of that participant.
//!
//! ## Remote consistency
//!
//! When the SML integration is active, the participant is also registered at
//! the SML. The two directions are deliberately asymmetric:
//!
//! - **create**: the SML call happens first. If it fails nothing is stored;
//!   if the local insert fails afterwards the SML registration is undone.
//! - **delete**: the SML call happens first, but its failure only produces a
//!   warning. The local cascade delete always runs.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smp_core::{Extension, FieldErrors, ParticipantId};

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::outcome::{Change, DeleteOutcome, Outcome};
use crate::sml_info::SmlInfo;
use crate::store::Record;

/// Message of the duplicate participant conflict.
pub const DUPLICATE_PARTICIPANT: &str =
    "Another Service Group for the same participant ID is already present (the participant ID is treated case insensitive)!";

/// Message of the conflict when deleting a participant that is moving away.
pub const MIGRATION_IN_PROGRESS: &str =
    "The participant is being migrated to another SMP. Finalize or cancel the migration first.";

/// Registry entry of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGroup {
    /// Participant identifier. Immutable after creation.
    pub participant_id: ParticipantId,
    /// User owning the service group.
    pub owner_id: String,
    /// Opaque XML extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

impl Record for ServiceGroup {
    type Key = ParticipantId;

    fn key(&self) -> ParticipantId {
        self.participant_id.clone()
    }
}

/// Untrusted service group input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGroupInput {
    /// Participant identifier as `scheme::value`.
    pub participant_id: String,
    /// Owning user.
    pub owner_id: String,
    /// Optional XML extension.
    #[serde(default)]
    pub extension: Option<String>,
}

/// Participants with a remote SML call in flight.
///
/// Reserved before the remote call so that two concurrent creates (or two
/// migrations) of the same participant cannot both reach the SML.
#[derive(Debug, Default, Clone)]
pub(crate) struct PendingParticipants(Arc<Mutex<BTreeSet<ParticipantId>>>);

impl PendingParticipants {
    pub(crate) fn reserve(&self, participant: &ParticipantId) -> Option<Reservation> {
        if !self.0.lock().insert(participant.clone()) {
            return None;
        }
        Some(Reservation {
            pending: self.clone(),
            participant: participant.clone(),
        })
    }
}

pub(crate) struct Reservation {
    pending: PendingParticipants,
    participant: ParticipantId,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pending.0.lock().remove(&self.participant);
    }
}

/// Registry view over service groups.
pub struct ServiceGroupRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl ServiceGroupRegistry<'_> {
    fn validate(&self, input: &ServiceGroupInput) -> Result<ServiceGroup, RegistryError> {
        let mut errors = FieldErrors::new();

        let participant = if input.participant_id.trim().is_empty() {
            errors.add("participantId", "The Participant Identifier must not be empty!");
            None
        } else {
            match self.ctx.policy.parse_participant(&input.participant_id) {
                Ok(pid) => Some(pid),
                Err(e) => {
                    errors.add(
                        "participantId",
                        format!("The provided Participant Identifier has an invalid syntax! ({e})"),
                    );
                    None
                }
            }
        };

        let owner_id = input.owner_id.trim();
        if owner_id.is_empty() {
            errors.add("ownerId", "An owner must be selected!");
        }

        let extension = match Extension::parse_opt(input.extension.as_deref()) {
            Ok(ext) => ext,
            Err(e) => {
                errors.add_error("extension", &e);
                None
            }
        };

        errors.into_result()?;
        match participant {
            Some(participant_id) => Ok(ServiceGroup {
                participant_id,
                owner_id: owner_id.to_string(),
                extension,
            }),
            None => Err(RegistryError::invalid(
                "participantId",
                "The Participant Identifier must not be empty!",
            )),
        }
    }

    /// Create a service group, registering the participant at the SML when
    /// the SML integration is active.
    pub async fn create(
        &self,
        actor: &str,
        input: &ServiceGroupInput,
    ) -> Result<ServiceGroup, RegistryError> {
        self.create_with(actor, input, true).await
    }

    /// Create a service group without touching the SML. Used when the SML
    /// entry already points here, e.g. after an inbound migration.
    pub(crate) async fn create_local(
        &self,
        actor: &str,
        input: &ServiceGroupInput,
    ) -> Result<ServiceGroup, RegistryError> {
        self.create_with(actor, input, false).await
    }

    async fn create_with(
        &self,
        actor: &str,
        input: &ServiceGroupInput,
        sync_sml: bool,
    ) -> Result<ServiceGroup, RegistryError> {
        let group = self.validate(input)?;
        let participant = group.participant_id.clone();

        let Some(_reservation) = self.ctx.pending_participants.reserve(&participant) else {
            return Err(RegistryError::conflict("participantId", DUPLICATE_PARTICIPANT));
        };
        if self.ctx.service_groups.contains(&participant) {
            return Err(RegistryError::conflict("participantId", DUPLICATE_PARTICIPANT));
        }

        let sml = if sync_sml { self.ctx.active_sml()? } else { None };
        if let Some(sml) = &sml {
            self.register_at_sml(actor, &participant, sml).await?;
        }

        let stored = match self.ctx.service_groups.insert(group.clone()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RegistryError::conflict("participantId", DUPLICATE_PARTICIPANT)),
            Err(e) => Err(RegistryError::from(e)),
        };
        if let Err(e) = stored {
            if let Some(sml) = &sml {
                self.undo_sml_create(actor, &participant, sml).await;
            }
            return Err(e);
        }

        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::ServiceGroupCreate, participant.uri_encoded())
                .with_details(json!({ "ownerId": group.owner_id, "sml": sync_sml })),
        );
        tracing::info!(participant = %participant, owner = %group.owner_id, "created service group");
        Ok(group)
    }

    async fn register_at_sml(
        &self,
        actor: &str,
        participant: &ParticipantId,
        sml: &SmlInfo,
    ) -> Result<(), RegistryError> {
        let details = json!({
            "smlInfoId": sml.id,
            "smlUrl": sml.manage_participant_identifier_url(),
        });
        match self
            .ctx
            .registration_hook
            .create_participant(participant, sml)
            .await
        {
            Ok(()) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::success(
                        actor,
                        AuditAction::SmlParticipantCreate,
                        participant.uri_encoded(),
                    )
                    .with_details(details),
                );
                tracing::info!(participant = %participant, sml = %sml.display_name, "registered participant at SML");
                Ok(())
            }
            Err(e) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::failure(
                        actor,
                        AuditAction::SmlParticipantCreate,
                        participant.uri_encoded(),
                    )
                    .with_details(with_error(details, &e.kind, &e.message)),
                );
                tracing::warn!(participant = %participant, error = %e, "SML participant registration failed");
                Err(RegistryError::RemoteSync {
                    operation: "create_participant",
                    source: e,
                })
            }
        }
    }

    async fn undo_sml_create(&self, actor: &str, participant: &ParticipantId, sml: &SmlInfo) {
        match self
            .ctx
            .registration_hook
            .undo_create_participant(participant, sml)
            .await
        {
            Ok(()) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::success(
                        actor,
                        AuditAction::SmlParticipantDelete,
                        participant.uri_encoded(),
                    )
                    .with_details(json!({ "undo": true, "smlInfoId": sml.id })),
                );
                tracing::info!(participant = %participant, "rolled back SML registration");
            }
            Err(e) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::failure(
                        actor,
                        AuditAction::SmlParticipantDelete,
                        participant.uri_encoded(),
                    )
                    .with_details(with_error(
                        json!({ "undo": true, "smlInfoId": sml.id }),
                        &e.kind,
                        &e.message,
                    )),
                );
                tracing::error!(participant = %participant, error = %e, "failed to roll back SML registration");
            }
        }
    }

    /// Change owner and extension. The participant itself is immutable.
    pub fn update(
        &self,
        actor: &str,
        participant: &ParticipantId,
        owner_id: &str,
        extension: Option<&str>,
    ) -> Result<Change, RegistryError> {
        let mut errors = FieldErrors::new();
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            errors.add("ownerId", "An owner must be selected!");
        }
        let extension = match Extension::parse_opt(extension) {
            Ok(ext) => ext,
            Err(e) => {
                errors.add_error("extension", &e);
                None
            }
        };
        errors.into_result()?;

        let changed = self
            .ctx
            .service_groups
            .try_update(participant, |current| {
                if current.owner_id == owner_id && current.extension == extension {
                    return Err(UpdateError::Unchanged);
                }
                Ok(ServiceGroup {
                    participant_id: current.participant_id.clone(),
                    owner_id: owner_id.to_string(),
                    extension: extension.clone(),
                })
            });
        match changed {
            Ok(Some(_)) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::success(
                        actor,
                        AuditAction::ServiceGroupUpdate,
                        participant.uri_encoded(),
                    )
                    .with_details(json!({ "ownerId": owner_id })),
                );
                Ok(Change::Changed)
            }
            Ok(None) => Err(RegistryError::NotFound(format!("service group '{participant}'"))),
            Err(UpdateError::Unchanged) => Ok(Change::Unchanged),
            Err(UpdateError::Store(e)) => Err(e.into()),
        }
    }

    /// Delete a service group and everything it owns.
    ///
    /// SML and Directory failures become warnings on the outcome. A
    /// participant with an outbound migration in progress cannot be deleted;
    /// the migration has to be finalized or cancelled first.
    pub async fn delete(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Result<DeleteOutcome, RegistryError> {
        if self
            .ctx
            .participant_migrations()
            .contains_outbound_in_progress(participant)
        {
            return Err(RegistryError::conflict("participantId", MIGRATION_IN_PROGRESS));
        }
        self.delete_with(actor, participant, true).await
    }

    /// Delete a service group without touching the SML, which already points
    /// to the SMP the participant moved to.
    pub(crate) async fn delete_local(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Result<DeleteOutcome, RegistryError> {
        self.delete_with(actor, participant, false).await
    }

    async fn delete_with(
        &self,
        actor: &str,
        participant: &ParticipantId,
        sync_sml: bool,
    ) -> Result<DeleteOutcome, RegistryError> {
        if !self.ctx.service_groups.contains(participant) {
            return Ok(Outcome::ok(Change::Unchanged));
        }
        let mut outcome = Outcome::ok(Change::Changed);

        let sml = if sync_sml { self.ctx.active_sml()? } else { None };
        let mut removed_from_sml = None;
        if let Some(sml) = sml {
            let details = json!({
                "smlInfoId": sml.id,
                "smlUrl": sml.manage_participant_identifier_url(),
            });
            match self
                .ctx
                .registration_hook
                .delete_participant(participant, &sml)
                .await
            {
                Ok(()) => {
                    self.ctx.audit.record_or_log(
                        AuditEvent::success(
                            actor,
                            AuditAction::SmlParticipantDelete,
                            participant.uri_encoded(),
                        )
                        .with_details(details),
                    );
                    removed_from_sml = Some(sml);
                }
                Err(e) => {
                    self.ctx.audit.record_or_log(
                        AuditEvent::failure(
                            actor,
                            AuditAction::SmlParticipantDelete,
                            participant.uri_encoded(),
                        )
                        .with_details(with_error(details, &e.kind, &e.message)),
                    );
                    tracing::warn!(participant = %participant, error = %e, "SML participant deletion failed, deleting locally anyway");
                    outcome.warn(format!(
                        "The participant could not be removed from the SML: {e}"
                    ));
                }
            }
        }

        let had_card = self.ctx.business_cards.contains(participant);
        if let Err(e) = self.remove_locally(participant) {
            if let Some(sml) = &removed_from_sml {
                self.undo_sml_delete(actor, participant, sml).await;
            }
            return Err(e);
        }
        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::ServiceGroupDelete, participant.uri_encoded())
                .with_details(json!({ "sml": sync_sml })),
        );
        tracing::info!(participant = %participant, sml = sync_sml, "deleted service group");

        if had_card && self.ctx.settings().get().directory_auto_push() {
            if let Some(warning) = self
                .ctx
                .business_cards()
                .retract_from_directory(actor, participant)
                .await
            {
                outcome.warn(warning);
            }
        }
        Ok(outcome)
    }

    fn remove_locally(&self, participant: &ParticipantId) -> Result<(), RegistryError> {
        self.ctx
            .service_information()
            .delete_all_of_service_group(participant)?;
        self.ctx.redirects().delete_all_of_service_group(participant)?;
        self.ctx.business_cards.remove(participant)?;
        self.ctx.service_groups.remove(participant)?;
        Ok(())
    }

    async fn undo_sml_delete(&self, actor: &str, participant: &ParticipantId, sml: &SmlInfo) {
        let result = self
            .ctx
            .registration_hook
            .undo_delete_participant(participant, sml)
            .await;
        let event = match &result {
            Ok(()) => AuditEvent::success(
                actor,
                AuditAction::SmlParticipantCreate,
                participant.uri_encoded(),
            )
            .with_details(json!({ "undo": true, "smlInfoId": sml.id })),
            Err(e) => AuditEvent::failure(
                actor,
                AuditAction::SmlParticipantCreate,
                participant.uri_encoded(),
            )
            .with_details(with_error(
                json!({ "undo": true, "smlInfoId": sml.id }),
                &e.kind,
                &e.message,
            )),
        };
        self.ctx.audit.record_or_log(event);
        if let Err(e) = result {
            tracing::error!(participant = %participant, error = %e, "failed to restore SML registration");
        }
    }

    /// Service group by participant.
    pub fn get(&self, participant: &ParticipantId) -> Option<ServiceGroup> {
        self.ctx.service_groups.get(participant)
    }

    /// Whether the participant has a service group.
    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.ctx.service_groups.contains(participant)
    }

    /// All service groups ordered by participant.
    pub fn get_all(&self) -> Vec<ServiceGroup> {
        self.ctx.service_groups.list()
    }

    /// Service groups owned by `owner_id`.
    pub fn get_all_of_owner(&self, owner_id: &str) -> Vec<ServiceGroup> {
        self.ctx
            .service_groups
            .values_where(|sg| sg.owner_id == owner_id)
    }

    /// Number of service groups.
    pub fn count(&self) -> usize {
        self.ctx.service_groups.len()
    }
}

enum UpdateError {
    Unchanged,
    Store(crate::error::StoreError),
}

impl From<crate::error::StoreError> for UpdateError {
    fn from(e: crate::error::StoreError) -> Self {
        Self::Store(e)
    }
}

/// Add error kind and message to audit details.
pub(crate) fn with_error(
    mut details: serde_json::Value,
    kind: &str,
    message: &str,
) -> serde_json::Value {
    if let Some(map) = details.as_object_mut() {
        map.insert("errorKind".to_string(), json!(kind));
        map.insert("errorMessage".to_string(), json!(message));
    }
    details
}
