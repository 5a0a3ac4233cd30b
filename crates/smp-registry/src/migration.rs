//! # Participant Migration
//!
//! Moving a participant between two SMPs is a handshake over the SML:
//!
//! ```text
//!  source SMP                         SML                      target SMP
//!  start_outbound ── prepareToMigrate(key) ─▶
//!                  (key handed over out of band) ─────────────▶ migrate_inbound
//!                                             ◀── migrate(key) ──
//!  finalize_outbound (local delete, no SML call)
//! ```
//!
//! Outbound migrations start `InProgress` and end `Migrated` or `Cancelled`.
//! Inbound migrations are recorded once the SML accepted the key, so they
//! are always `Migrated`.
//!
//! While an outbound migration is in progress the service group cannot be
//! deleted through the regular path; finalizing removes it locally only,
//! because the SML entry already points to the new SMP.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smp_core::{Extension, FieldErrors, ParticipantId};

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::hooks::HookError;
use crate::outcome::{Change, Outcome};
use crate::service_group::{with_error, ServiceGroupInput, DUPLICATE_PARTICIPANT};
use crate::sml_info::SmlInfo;
use crate::store::Record;

/// Special characters a migration key may contain.
pub const MIGRATION_KEY_SPECIALS: &str = "@#$%()[]{}*^-!~|+=";

/// Length of generated migration keys. Accepted keys have 8 to 24 characters.
pub const MIGRATION_KEY_LENGTH: usize = 24;

const MIGRATION_KEY_MIN_LENGTH: usize = 8;

/// Message of the conflict when an outbound migration is already running.
pub const OUTBOUND_IN_PROGRESS: &str = "The migration of this participant is already in progress.";

/// Message of the conflict when the participant was already migrated here.
pub const INBOUND_PRESENT: &str = "The inbound migration of this participant is already contained.";

/// Which side of the migration this SMP is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    /// The participant leaves this SMP.
    Outbound,
    /// The participant moves to this SMP.
    Inbound,
}

impl MigrationDirection {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}

/// Progress of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// The key was announced at the SML; the other SMP has not confirmed.
    InProgress,
    /// The participant moved.
    Migrated,
    /// The migration was abandoned.
    Cancelled,
}

impl MigrationState {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Migrated => "migrated",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant migration, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantMigration {
    /// Generated ID.
    pub id: String,
    /// Outbound or inbound.
    pub direction: MigrationDirection,
    /// Current state.
    pub state: MigrationState,
    /// Participant being moved.
    pub participant_id: ParticipantId,
    /// When this SMP started its part of the migration.
    pub initiated_at: DateTime<Utc>,
    /// Key shared between the two SMPs through the SML.
    pub migration_key: String,
}

impl Record for ParticipantMigration {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl ParticipantMigration {
    fn new(
        direction: MigrationDirection,
        state: MigrationState,
        participant_id: ParticipantId,
        migration_key: String,
    ) -> Self {
        if !is_valid_migration_key(&migration_key) {
            tracing::warn!(participant = %participant_id, "storing a migration with an invalid key");
        }
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction,
            state,
            participant_id,
            initiated_at: Utc::now(),
            migration_key,
        }
    }

    fn with_state(&self, state: MigrationState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

/// Random key accepted by the SML: upper and lower case letters, digits and
/// special characters, shuffled.
pub fn generate_migration_key() -> String {
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"0123456789";

    let mut rng = rand::thread_rng();
    let mut key = Vec::with_capacity(MIGRATION_KEY_LENGTH);
    for class in [UPPER, LOWER, DIGITS, MIGRATION_KEY_SPECIALS.as_bytes()] {
        for _ in 0..MIGRATION_KEY_LENGTH / 4 {
            key.push(class[rng.gen_range(0..class.len())]);
        }
    }
    key.shuffle(&mut rng);
    key.into_iter().map(char::from).collect()
}

/// Whether `key` has the shape the SML requires: 8 to 24 characters, at
/// least two each of upper case, lower case, digits and
/// [`MIGRATION_KEY_SPECIALS`], and nothing else.
pub fn is_valid_migration_key(key: &str) -> bool {
    let length = key.chars().count();
    if !(MIGRATION_KEY_MIN_LENGTH..=MIGRATION_KEY_LENGTH).contains(&length) {
        return false;
    }
    let (mut upper, mut lower, mut digits, mut specials) = (0, 0, 0, 0);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            upper += 1;
        } else if c.is_ascii_lowercase() {
            lower += 1;
        } else if c.is_ascii_digit() {
            digits += 1;
        } else if MIGRATION_KEY_SPECIALS.contains(c) {
            specials += 1;
        } else {
            return false;
        }
    }
    upper >= 2 && lower >= 2 && digits >= 2 && specials >= 2
}

/// Untrusted input of an inbound migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMigrationInput {
    /// Participant identifier as `scheme::value`.
    pub participant_id: String,
    /// Key received from the source SMP.
    pub migration_key: String,
    /// Owner of the service group created here.
    pub owner_id: String,
    /// Optional XML extension of that service group.
    #[serde(default)]
    pub extension: Option<String>,
}

/// Result of an inbound migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMigration {
    /// The recorded migration.
    pub migration: ParticipantMigration,
    /// Whether a service group was created. `false` when the participant
    /// came back from an outbound migration of this SMP, or when creation
    /// failed (see the warnings).
    pub service_group_created: bool,
    /// Whether the migration record was stored.
    pub migration_recorded: bool,
    /// Outbound migration of this SMP that the inbound one completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_outbound_id: Option<String>,
}

/// Registry view over participant migrations.
pub struct ParticipantMigrationRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl ParticipantMigrationRegistry<'_> {
    fn require_sml(&self) -> Result<SmlInfo, RegistryError> {
        self.ctx.active_sml()?.ok_or_else(|| {
            RegistryError::InvalidState(
                "the SML integration is not active, hence no participant can be migrated"
                    .to_string(),
            )
        })
    }

    /// Start moving `participant` away from this SMP.
    ///
    /// A fresh migration key is announced at the SML. The key has to be
    /// handed to the target SMP, which completes the move with
    /// [`Self::migrate_inbound`].
    pub async fn start_outbound(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Result<ParticipantMigration, RegistryError> {
        if !self.ctx.service_groups.contains(participant) {
            return Err(RegistryError::NotFound(format!("service group '{participant}'")));
        }
        let Some(_reservation) = self.ctx.pending_migrations.reserve(participant) else {
            return Err(RegistryError::conflict("participantId", OUTBOUND_IN_PROGRESS));
        };
        if self.contains_outbound_in_progress(participant) {
            return Err(RegistryError::conflict("participantId", OUTBOUND_IN_PROGRESS));
        }
        let sml = self.require_sml()?;

        let key = generate_migration_key();
        let result = self
            .ctx
            .registration_hook
            .prepare_to_migrate(participant, &key, &sml)
            .await;
        self.record_remote(
            actor,
            AuditAction::SmlParticipantPrepareMigration,
            participant,
            &sml,
            &result,
        );
        result.map_err(|source| RegistryError::RemoteSync {
            operation: "prepare_to_migrate",
            source,
        })?;

        let migration = ParticipantMigration::new(
            MigrationDirection::Outbound,
            MigrationState::InProgress,
            participant.clone(),
            key,
        );
        self.ctx.participant_migrations.insert(migration.clone())?;
        self.ctx.audit.record_or_log(
            AuditEvent::success(
                actor,
                AuditAction::MigrationOutboundStart,
                participant.uri_encoded(),
            )
            .with_details(json!({ "migrationId": migration.id, "smlInfoId": sml.id })),
        );
        tracing::info!(participant = %participant, migration = %migration.id, "started outbound migration");
        Ok(migration)
    }

    /// Abandon an outbound migration that is still in progress.
    pub fn cancel_outbound(
        &self,
        actor: &str,
        id: &str,
    ) -> Result<ParticipantMigration, RegistryError> {
        let migration = self.close_outbound(id, MigrationState::Cancelled)?;
        self.ctx.audit.record_or_log(
            AuditEvent::success(
                actor,
                AuditAction::MigrationOutboundCancel,
                migration.participant_id.uri_encoded(),
            )
            .with_details(json!({ "migrationId": migration.id })),
        );
        tracing::info!(participant = %migration.participant_id, migration = %migration.id, "cancelled outbound migration");
        Ok(migration)
    }

    /// Complete an outbound migration after the target SMP confirmed it.
    ///
    /// The state becomes `Migrated` and the service group is deleted locally
    /// without an SML call. If the delete fails the migration goes back to
    /// `InProgress`.
    pub async fn finalize_outbound(
        &self,
        actor: &str,
        id: &str,
    ) -> Result<Outcome<ParticipantMigration>, RegistryError> {
        let migration = self.close_outbound(id, MigrationState::Migrated)?;
        let participant = &migration.participant_id;

        let deleted = match self
            .ctx
            .service_groups()
            .delete_local(actor, participant)
            .await
        {
            Ok(outcome) if outcome.value.is_changed() => Ok(outcome.warnings),
            Ok(_) => Err(RegistryError::NotFound(format!("service group '{participant}'"))),
            Err(e) => Err(e),
        };
        match deleted {
            Ok(warnings) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::success(
                        actor,
                        AuditAction::MigrationOutboundFinalize,
                        participant.uri_encoded(),
                    )
                    .with_details(json!({ "migrationId": migration.id })),
                );
                tracing::info!(participant = %participant, migration = %migration.id, "finalized outbound migration");
                Ok(Outcome {
                    value: migration,
                    warnings,
                })
            }
            Err(e) => {
                let reverted = migration.with_state(MigrationState::InProgress);
                if let Err(revert) = self.ctx.participant_migrations.replace(reverted) {
                    tracing::error!(migration = %migration.id, error = %revert, "failed to revert the migration state");
                }
                self.ctx.audit.record_or_log(
                    AuditEvent::failure(
                        actor,
                        AuditAction::MigrationOutboundFinalize,
                        participant.uri_encoded(),
                    )
                    .with_details(json!({ "migrationId": migration.id, "error": e.to_string() })),
                );
                tracing::warn!(participant = %participant, error = %e, "outbound migration could not be finalized");
                Err(e)
            }
        }
    }

    fn close_outbound(
        &self,
        id: &str,
        state: MigrationState,
    ) -> Result<ParticipantMigration, RegistryError> {
        self.ctx
            .participant_migrations
            .try_update(&id.to_string(), |current| {
                if current.direction != MigrationDirection::Outbound {
                    return Err(RegistryError::InvalidState(format!(
                        "participant migration '{id}' is not an outbound migration"
                    )));
                }
                if current.state != MigrationState::InProgress {
                    return Err(RegistryError::InvalidState(format!(
                        "participant migration '{id}' is already {}",
                        current.state
                    )));
                }
                Ok(current.with_state(state))
            })?
            .ok_or_else(|| RegistryError::NotFound(format!("participant migration '{id}'")))
    }

    /// Take over a participant from another SMP with the key it handed out.
    ///
    /// The SML call has to succeed. A failure to create the service group or
    /// to store the migration afterwards is reported as a warning, since the
    /// SML already points here. A participant whose outbound migration from
    /// this SMP is in progress keeps its service group, and that outbound
    /// migration is marked `Migrated`.
    pub async fn migrate_inbound(
        &self,
        actor: &str,
        input: &InboundMigrationInput,
    ) -> Result<Outcome<InboundMigration>, RegistryError> {
        let mut errors = FieldErrors::new();
        let key = input.migration_key.trim();
        if key.is_empty() {
            errors.add("migrationKey", "The migration key must not be empty!");
        } else if !is_valid_migration_key(key) {
            errors.add(
                "migrationKey",
                "The migration key is not valid. Please verify the received code is correct.",
            );
        }
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
        if input.owner_id.trim().is_empty() {
            errors.add("ownerId", "An owner must be selected!");
        }
        if let Err(e) = Extension::parse_opt(input.extension.as_deref()) {
            errors.add_error("extension", &e);
        }
        errors.into_result()?;
        let Some(participant) = participant else {
            return Err(RegistryError::invalid(
                "participantId",
                "The Participant Identifier must not be empty!",
            ));
        };

        let sml = self.require_sml()?;
        let Some(_reservation) = self.ctx.pending_migrations.reserve(&participant) else {
            return Err(RegistryError::conflict("participantId", INBOUND_PRESENT));
        };
        let outbound = self.find(
            MigrationDirection::Outbound,
            MigrationState::InProgress,
            &participant,
        );
        if outbound.is_none() && self.ctx.service_groups.contains(&participant) {
            return Err(RegistryError::conflict("participantId", DUPLICATE_PARTICIPANT));
        }
        if self.contains_inbound(&participant) {
            return Err(RegistryError::conflict("participantId", INBOUND_PRESENT));
        }

        let result = self
            .ctx
            .registration_hook
            .migrate(&participant, key, &sml)
            .await;
        self.record_remote(actor, AuditAction::SmlParticipantMigrate, &participant, &sml, &result);
        result.map_err(|source| RegistryError::RemoteSync {
            operation: "migrate",
            source,
        })?;

        let mut warnings = Vec::new();
        let service_group_created = match &outbound {
            Some(_) => false,
            None => {
                let group = ServiceGroupInput {
                    participant_id: participant.uri_encoded(),
                    owner_id: input.owner_id.trim().to_string(),
                    extension: input.extension.clone(),
                };
                match self.ctx.service_groups().create_local(actor, &group).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(participant = %participant, error = %e, "failed to create the service group of a migrated participant");
                        warnings.push(format!(
                            "The service group for '{participant}' could not be created: {e}"
                        ));
                        false
                    }
                }
            }
        };

        let migration = ParticipantMigration::new(
            MigrationDirection::Inbound,
            MigrationState::Migrated,
            participant.clone(),
            key.to_string(),
        );
        let migration_recorded = match self.ctx.participant_migrations.insert(migration.clone()) {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::error!(participant = %participant, error = %e, "failed to store the inbound migration");
                warnings.push(format!("The migration could not be recorded: {e}"));
                false
            }
        };

        if let Some(outbound) = &outbound {
            let closed = outbound.with_state(MigrationState::Migrated);
            if let Err(e) = self.ctx.participant_migrations.replace(closed) {
                warnings.push(format!(
                    "The outbound migration '{}' could not be closed: {e}",
                    outbound.id
                ));
            }
        }

        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::MigrationInbound, participant.uri_encoded())
                .with_details(json!({
                    "migrationId": migration.id,
                    "serviceGroupCreated": service_group_created,
                    "migrationRecorded": migration_recorded,
                    "completedOutboundId": outbound.as_ref().map(|m| m.id.clone()),
                })),
        );
        tracing::info!(participant = %participant, migration = %migration.id, "performed inbound migration");
        Ok(Outcome {
            value: InboundMigration {
                migration,
                service_group_created,
                migration_recorded,
                completed_outbound_id: outbound.map(|m| m.id),
            },
            warnings,
        })
    }

    fn record_remote(
        &self,
        actor: &str,
        action: AuditAction,
        participant: &ParticipantId,
        sml: &SmlInfo,
        result: &Result<(), HookError>,
    ) {
        let details = json!({
            "smlInfoId": sml.id,
            "smlUrl": sml.manage_participant_identifier_url(),
        });
        let event = match result {
            Ok(()) => AuditEvent::success(actor, action, participant.uri_encoded())
                .with_details(details),
            Err(e) => {
                tracing::warn!(%action, participant = %participant, error = %e, "SML migration call failed");
                AuditEvent::failure(actor, action, participant.uri_encoded())
                    .with_details(with_error(details, &e.kind, &e.message))
            }
        };
        self.ctx.audit.record_or_log(event);
    }

    /// Delete a migration record. The service group is not touched.
    pub fn delete(&self, actor: &str, id: &str) -> Result<Change, RegistryError> {
        let removed = self.ctx.participant_migrations.remove(&id.to_string())?;
        if let Some(migration) = &removed {
            self.ctx.audit.record_or_log(
                AuditEvent::success(
                    actor,
                    AuditAction::MigrationDelete,
                    migration.participant_id.uri_encoded(),
                )
                .with_details(json!({ "migrationId": id })),
            );
        }
        Ok(Change::from_bool(removed.is_some()))
    }

    /// Delete every migration record of `participant`, returning how many
    /// were removed.
    pub fn delete_all_of_participant(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Result<usize, RegistryError> {
        let removed = self
            .ctx
            .participant_migrations
            .remove_where(|m| &m.participant_id == participant)?;
        for migration in &removed {
            self.ctx.audit.record_or_log(
                AuditEvent::success(actor, AuditAction::MigrationDelete, participant.uri_encoded())
                    .with_details(json!({ "migrationId": migration.id })),
            );
        }
        Ok(removed.len())
    }

    /// Migration by ID.
    pub fn get(&self, id: &str) -> Option<ParticipantMigration> {
        self.ctx.participant_migrations.get(&id.to_string())
    }

    /// The migration of `participant` in `direction` and `state`, if any.
    pub fn find(
        &self,
        direction: MigrationDirection,
        state: MigrationState,
        participant: &ParticipantId,
    ) -> Option<ParticipantMigration> {
        self.ctx
            .participant_migrations
            .values_where(|m| {
                m.direction == direction && m.state == state && &m.participant_id == participant
            })
            .into_iter()
            .next()
    }

    fn all_of(
        &self,
        direction: MigrationDirection,
        state: Option<MigrationState>,
    ) -> Vec<ParticipantMigration> {
        let mut all = self.ctx.participant_migrations.values_where(|m| {
            m.direction == direction && state.map_or(true, |s| m.state == s)
        });
        all.sort_by(|a, b| a.initiated_at.cmp(&b.initiated_at));
        all
    }

    /// Outbound migrations, optionally only those in `state`, oldest first.
    pub fn all_outbound(&self, state: Option<MigrationState>) -> Vec<ParticipantMigration> {
        self.all_of(MigrationDirection::Outbound, state)
    }

    /// Inbound migrations, optionally only those in `state`, oldest first.
    pub fn all_inbound(&self, state: Option<MigrationState>) -> Vec<ParticipantMigration> {
        self.all_of(MigrationDirection::Inbound, state)
    }

    /// Whether an outbound migration of `participant` is in progress.
    pub fn contains_outbound_in_progress(&self, participant: &ParticipantId) -> bool {
        self.ctx.participant_migrations.any(|m| {
            m.direction == MigrationDirection::Outbound
                && m.state == MigrationState::InProgress
                && &m.participant_id == participant
        })
    }

    /// Whether `participant` was migrated to this SMP.
    pub fn contains_inbound(&self, participant: &ParticipantId) -> bool {
        self.ctx.participant_migrations.any(|m| {
            m.direction == MigrationDirection::Inbound && &m.participant_id == participant
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_keys_are_valid_and_differ() {
        let a = generate_migration_key();
        let b = generate_migration_key();
        assert_eq!(a.len(), MIGRATION_KEY_LENGTH);
        assert!(is_valid_migration_key(&a), "{a}");
        assert_ne!(a, b);
    }

    #[test]
    fn key_rules() {
        assert!(is_valid_migration_key("Ab12@#cd"));
        assert!(!is_valid_migration_key("Ab12@#c"));
        assert!(!is_valid_migration_key("AB12@#CD"));
        assert!(!is_valid_migration_key("Ab12@#cd Ef"));
        assert!(!is_valid_migration_key("Abcd@#ef"));
        assert!(!is_valid_migration_key("Ab12@cde"));
        assert!(!is_valid_migration_key("Ab12@#cdEF34Ab12@#cdEF34x"));
        assert!(!is_valid_migration_key(""));
    }

    #[test]
    fn state_strings_match_serde() {
        for state in [
            MigrationState::InProgress,
            MigrationState::Migrated,
            MigrationState::Cancelled,
        ] {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, serde_json::Value::String(state.as_str().to_string()));
        }
    }

    proptest! {
        #[test]
        fn every_generated_key_is_accepted(_seed in 0u8..32) {
            prop_assert!(is_valid_migration_key(&generate_migration_key()));
        }
    }
}
