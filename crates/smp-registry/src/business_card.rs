//! # Business Cards
//!
//! Human-readable directory entries per service group, mirrored to the
//! Directory. Saving a card replaces its entity list as a whole.
//!
//! Directory pushes are fire-and-forget relative to the local store: a push
//! failure is reported as a warning and the local change stays. This is the
//! opposite of the service group create policy towards the SML.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smp_core::{FieldErrors, ParticipantId};

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::outcome::{Change, DeleteOutcome, Outcome, SaveMode};
use crate::service_group::with_error;
use crate::store::Record;

/// Date format of registration dates.
pub const REGISTRATION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifier of a business entity (e.g. a VAT number).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessCardIdentifier {
    /// Identifier scheme.
    pub scheme: String,
    /// Identifier value.
    pub value: String,
}

/// Contact person of a business entity. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessCardContact {
    /// Contact type, free text.
    #[serde(rename = "type")]
    pub contact_type: String,
    /// Contact name.
    pub name: String,
    /// Phone number.
    pub phone: String,
    /// E-mail address.
    pub email: String,
}

/// One business entity on a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessCardEntity {
    /// Stable entity ID.
    pub id: String,
    /// Entity name.
    pub name: String,
    /// ISO country code.
    pub country_code: String,
    /// Geographical information, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_info: Option<String>,
    /// Identifiers, sorted by scheme and value.
    #[serde(default)]
    pub identifiers: Vec<BusinessCardIdentifier>,
    /// Website URIs, sorted.
    #[serde(default)]
    pub website_uris: Vec<String>,
    /// Contacts, sorted by type, name, phone and email.
    #[serde(default)]
    pub contacts: Vec<BusinessCardContact>,
    /// Additional information, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    /// Registration date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<NaiveDate>,
}

/// The business card of a service group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessCard {
    /// Owning service group.
    pub service_group_id: ParticipantId,
    /// Entities, sorted by name.
    pub entities: Vec<BusinessCardEntity>,
}

impl Record for BusinessCard {
    type Key = ParticipantId;

    fn key(&self) -> ParticipantId {
        self.service_group_id.clone()
    }
}

impl BusinessCard {
    /// Bring entities and their lists into canonical order.
    pub fn sorted(mut self) -> Self {
        for entity in &mut self.entities {
            entity.identifiers.sort_by_cached_key(|i| {
                (i.scheme.to_lowercase(), i.value.to_lowercase())
            });
            entity.website_uris.sort();
            entity.contacts.sort_by_cached_key(|c| {
                (
                    c.contact_type.to_lowercase(),
                    c.name.to_lowercase(),
                    c.phone.to_lowercase(),
                    c.email.to_lowercase(),
                )
            });
        }
        self.entities
            .sort_by_cached_key(|e| (e.name.to_lowercase(), e.name.clone()));
        self
    }
}

/// Untrusted entity input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessCardEntityInput {
    /// Existing entity ID; generated when absent.
    pub id: Option<String>,
    /// Entity name.
    pub name: String,
    /// Country code.
    pub country_code: String,
    /// Geographical information.
    pub geo_info: Option<String>,
    /// Identifiers.
    pub identifiers: Vec<BusinessCardIdentifier>,
    /// Website URIs.
    pub website_uris: Vec<String>,
    /// Contacts.
    pub contacts: Vec<BusinessCardContact>,
    /// Additional information.
    pub additional_info: Option<String>,
    /// Registration date as `YYYY-MM-DD`.
    pub registration_date: Option<String>,
}

/// Untrusted business card input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessCardInput {
    /// Service group as `scheme::value`.
    pub service_group_id: String,
    /// Entities; replaces the stored list entirely.
    pub entities: Vec<BusinessCardEntityInput>,
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn validate_entity(
    index: usize,
    input: &BusinessCardEntityInput,
    errors: &mut FieldErrors,
) -> BusinessCardEntity {
    let prefix = format!("entities[{index}]");

    let name = input.name.trim();
    if name.is_empty() {
        errors.add(format!("{prefix}.name"), "The Name of the Entity must be provided!");
    }
    let country_code = input.country_code.trim().to_uppercase();
    if country_code.is_empty() {
        errors.add(
            format!("{prefix}.countryCode"),
            "The Country Code of the Entity must be provided!",
        );
    }

    let mut identifiers = Vec::with_capacity(input.identifiers.len());
    for (j, identifier) in input.identifiers.iter().enumerate() {
        let scheme = identifier.scheme.trim();
        let value = identifier.value.trim();
        if scheme.is_empty() {
            errors.add(
                format!("{prefix}.identifiers[{j}].scheme"),
                "The Scheme of the Identifier must be provided!",
            );
        }
        if value.is_empty() {
            errors.add(
                format!("{prefix}.identifiers[{j}].value"),
                "The Value of the Identifier must be provided!",
            );
        }
        identifiers.push(BusinessCardIdentifier {
            scheme: scheme.to_string(),
            value: value.to_string(),
        });
    }

    let mut website_uris = Vec::with_capacity(input.website_uris.len());
    for (j, uri) in input.website_uris.iter().enumerate() {
        let uri = uri.trim();
        if uri.is_empty() {
            continue;
        }
        if smp_core::validate_url(uri).is_err() {
            errors.add(
                format!("{prefix}.websiteUris[{j}]"),
                format!("The website URI '{uri}' is invalid!"),
            );
        }
        website_uris.push(uri.to_string());
    }

    let mut contacts = Vec::with_capacity(input.contacts.len());
    for (j, contact) in input.contacts.iter().enumerate() {
        let email = contact.email.trim();
        if !email.is_empty() && !email.contains('@') {
            errors.add(
                format!("{prefix}.contacts[{j}].email"),
                "The provided email address is invalid!",
            );
        }
        let contact = BusinessCardContact {
            contact_type: contact.contact_type.trim().to_string(),
            name: contact.name.trim().to_string(),
            phone: contact.phone.trim().to_string(),
            email: email.to_string(),
        };
        if contact != BusinessCardContact::default() {
            contacts.push(contact);
        }
    }

    let registration_date = match optional_text(input.registration_date.as_deref()) {
        None => None,
        Some(text) => match NaiveDate::parse_from_str(&text, REGISTRATION_DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(_) => {
                errors.add(
                    format!("{prefix}.registrationDate"),
                    "The entered registration date is invalid!",
                );
                None
            }
        },
    };

    BusinessCardEntity {
        id: optional_text(input.id.as_deref()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: name.to_string(),
        country_code,
        geo_info: optional_text(input.geo_info.as_deref()),
        identifiers,
        website_uris,
        contacts,
        additional_info: optional_text(input.additional_info.as_deref()),
        registration_date,
    }
}

/// Registry view over business cards.
pub struct BusinessCardRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl BusinessCardRegistry<'_> {
    fn validate(&self, input: &BusinessCardInput) -> Result<BusinessCard, RegistryError> {
        let mut errors = FieldErrors::new();

        let participant = if input.service_group_id.trim().is_empty() {
            errors.add("serviceGroupId", "A Service Group must be selected!");
            None
        } else {
            let pid = self
                .ctx
                .policy
                .parse_participant(&input.service_group_id)
                .ok()
                .filter(|pid| self.ctx.service_groups.contains(pid));
            if pid.is_none() {
                errors.add("serviceGroupId", "The provided Service Group does not exist!");
            }
            pid
        };

        if input.entities.is_empty() {
            errors.add("entities", "At least one entity must be provided.");
        }
        let entities: Vec<BusinessCardEntity> = input
            .entities
            .iter()
            .enumerate()
            .map(|(i, entity)| validate_entity(i, entity, &mut errors))
            .collect();

        errors.into_result()?;
        match participant {
            Some(service_group_id) => Ok(BusinessCard {
                service_group_id,
                entities,
            }
            .sorted()),
            None => Err(RegistryError::invalid(
                "serviceGroupId",
                "A Service Group must be selected!",
            )),
        }
    }

    /// Validate and store a business card, replacing any previous entity
    /// list, then push it to the Directory if automatic updates are on.
    ///
    /// [`SaveMode::Create`] rejects a service group that already has a card.
    pub async fn create_or_update(
        &self,
        actor: &str,
        input: &BusinessCardInput,
        mode: SaveMode,
    ) -> Result<Outcome<BusinessCard>, RegistryError> {
        let card = self.validate(input)?;
        self.save_validated(actor, card, mode).await
    }

    pub(crate) async fn save_validated(
        &self,
        actor: &str,
        card: BusinessCard,
        mode: SaveMode,
    ) -> Result<Outcome<BusinessCard>, RegistryError> {
        let participant = card.service_group_id.clone();
        match mode {
            SaveMode::Create => {
                if !self.ctx.business_cards.insert(card.clone())? {
                    return Err(RegistryError::conflict(
                        "serviceGroupId",
                        "The selected Service Group already has a Business Card assigned!",
                    ));
                }
            }
            SaveMode::Edit => {
                self.ctx.business_cards.replace(card.clone())?;
            }
        }
        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::BusinessCardSave, participant.uri_encoded())
                .with_details(json!({ "entities": card.entities.len() })),
        );
        tracing::info!(participant = %participant, entities = card.entities.len(), "saved business card");

        let mut outcome = Outcome::ok(card);
        if self.ctx.settings().get().directory_auto_push() {
            if let Some(warning) = self.push_to_directory(actor, &participant).await {
                outcome.warn(warning);
            }
        }
        Ok(outcome)
    }

    /// Delete the business card of a service group and retract it from the
    /// Directory if automatic updates are on.
    pub async fn delete(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Result<DeleteOutcome, RegistryError> {
        if self.ctx.business_cards.remove(participant)?.is_none() {
            return Ok(Outcome::ok(Change::Unchanged));
        }
        self.ctx.audit.record_or_log(AuditEvent::success(
            actor,
            AuditAction::BusinessCardDelete,
            participant.uri_encoded(),
        ));
        let mut outcome = Outcome::ok(Change::Changed);
        if self.ctx.settings().get().directory_auto_push() {
            if let Some(warning) = self.retract_from_directory(actor, participant).await {
                outcome.warn(warning);
            }
        }
        Ok(outcome)
    }

    /// Manually publish the card to the Directory, independent of automatic
    /// updates. A remote failure is returned as an error.
    pub async fn publish_to_index(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Result<(), RegistryError> {
        let settings = self.ctx.settings().get();
        if !settings.directory_integration_enabled {
            return Err(RegistryError::InvalidState(
                "the Directory integration is disabled".to_string(),
            ));
        }
        if !self.ctx.business_cards.contains(participant) {
            return Err(RegistryError::NotFound(format!(
                "business card of '{participant}'"
            )));
        }
        let details = json!({ "directoryHostname": settings.directory_hostname });
        match self
            .ctx
            .directory
            .add_service_group_to_index(participant)
            .await
        {
            Ok(()) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::success(
                        actor,
                        AuditAction::BusinessCardPublish,
                        participant.uri_encoded(),
                    )
                    .with_details(details),
                );
                tracing::info!(participant = %participant, "published business card");
                Ok(())
            }
            Err(e) => {
                self.ctx.audit.record_or_log(
                    AuditEvent::failure(
                        actor,
                        AuditAction::BusinessCardPublish,
                        participant.uri_encoded(),
                    )
                    .with_details(with_error(details, &e.kind, &e.message)),
                );
                tracing::warn!(participant = %participant, error = %e, "business card publication failed");
                Err(RegistryError::RemoteSync {
                    operation: "add_service_group_to_index",
                    source: e,
                })
            }
        }
    }

    /// Push to the Directory; returns a warning on failure.
    pub(crate) async fn push_to_directory(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Option<String> {
        let result = self
            .ctx
            .directory
            .add_service_group_to_index(participant)
            .await;
        self.record_directory_outcome(actor, AuditAction::DirectoryAdd, participant, &result);
        result.err().map(|e| {
            format!("The Business Card was saved locally but could not be pushed to the Directory: {e}")
        })
    }

    /// Retract from the Directory; returns a warning on failure.
    pub(crate) async fn retract_from_directory(
        &self,
        actor: &str,
        participant: &ParticipantId,
    ) -> Option<String> {
        let result = self
            .ctx
            .directory
            .delete_service_group_from_index(participant)
            .await;
        self.record_directory_outcome(actor, AuditAction::DirectoryDelete, participant, &result);
        result.err().map(|e| {
            format!("The Business Card was deleted locally but could not be removed from the Directory: {e}")
        })
    }

    fn record_directory_outcome(
        &self,
        actor: &str,
        action: AuditAction,
        participant: &ParticipantId,
        result: &Result<(), crate::hooks::HookError>,
    ) {
        let details = json!({ "directoryHostname": self.ctx.settings().get().directory_hostname });
        let event = match result {
            Ok(()) => {
                tracing::info!(participant = %participant, %action, "Directory updated");
                AuditEvent::success(actor, action, participant.uri_encoded()).with_details(details)
            }
            Err(e) => {
                tracing::warn!(participant = %participant, %action, error = %e, "Directory update failed");
                AuditEvent::failure(actor, action, participant.uri_encoded())
                    .with_details(with_error(details, &e.kind, &e.message))
            }
        };
        self.ctx.audit.record_or_log(event);
    }

    /// Card of a service group.
    pub fn get(&self, participant: &ParticipantId) -> Option<BusinessCard> {
        self.ctx.business_cards.get(participant)
    }

    /// All cards.
    pub fn get_all(&self) -> Vec<BusinessCard> {
        self.ctx.business_cards.list()
    }

    /// Number of cards.
    pub fn count(&self) -> usize {
        self.ctx.business_cards.len()
    }
}
