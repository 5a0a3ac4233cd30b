//! # ManageParticipantIdentifier
//!
//! Registration of participants served by this SMP. Requests go to
//! `{managementServiceUrl}/manageparticipantidentifier`.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use smp_core::ParticipantId;

use crate::error::SmlError;
use crate::soap::{self, element, text_element, XmlWriter};

const ACTION_PREFIX: &str = "http://busdox.org/serviceMetadata/ManageBusinessIdentifierService/1.0/";

/// Client for the ManageParticipantIdentifier service of one SML.
#[derive(Debug, Clone)]
pub struct ManageParticipantClient<'a> {
    http: &'a reqwest::Client,
    url: String,
}

impl<'a> ManageParticipantClient<'a> {
    pub(crate) fn new(http: &'a reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    /// URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Register `participant` as served by `smp_id`.
    pub async fn create(&self, participant: &ParticipantId, smp_id: &str) -> Result<(), SmlError> {
        self.send("createIn", "lrs:CreateParticipantIdentifier", participant, smp_id)
            .await
    }

    /// Remove the registration of `participant`.
    pub async fn delete(&self, participant: &ParticipantId, smp_id: &str) -> Result<(), SmlError> {
        self.send("deleteIn", "lrs:DeleteParticipantIdentifier", participant, smp_id)
            .await
    }

    /// Announce that `participant` is going to move to another SMP. The
    /// receiving SMP has to present `migration_key` to [`Self::migrate`].
    pub async fn prepare_to_migrate(
        &self,
        participant: &ParticipantId,
        migration_key: &str,
        smp_id: &str,
    ) -> Result<(), SmlError> {
        self.send_migration_record(
            "prepareToMigrateIn",
            "lrs:PrepareMigrationRecord",
            participant,
            migration_key,
            smp_id,
        )
        .await
    }

    /// Take over `participant` from its current SMP.
    pub async fn migrate(
        &self,
        participant: &ParticipantId,
        migration_key: &str,
        smp_id: &str,
    ) -> Result<(), SmlError> {
        self.send_migration_record(
            "migrateIn",
            "lrs:CompleteMigrationRecord",
            participant,
            migration_key,
            smp_id,
        )
        .await
    }

    async fn send_migration_record(
        &self,
        operation: &str,
        root: &str,
        participant: &ParticipantId,
        migration_key: &str,
        smp_id: &str,
    ) -> Result<(), SmlError> {
        let body = soap::envelope(|w| {
            element(w, root, |w| {
                text_element(w, "lrs:ServiceMetadataPublisherID", smp_id)?;
                write_participant(w, participant)?;
                text_element(w, "lrs:MigrationKey", migration_key)
            })
        })?;
        let action = format!("{ACTION_PREFIX}:{operation}");
        soap::call(self.http, &self.url, &action, body).await?;
        tracing::debug!(participant = %participant, smp_id, operation, "SML migration call done");
        Ok(())
    }

    async fn send(
        &self,
        operation: &str,
        root: &str,
        participant: &ParticipantId,
        smp_id: &str,
    ) -> Result<(), SmlError> {
        let body = soap::envelope(|w| {
            element(w, root, |w| {
                write_participant(w, participant)?;
                text_element(w, "lrs:ServiceMetadataPublisherID", smp_id)
            })
        })?;
        let action = format!("{ACTION_PREFIX}:{operation}");
        soap::call(self.http, &self.url, &action, body).await?;
        tracing::debug!(participant = %participant, smp_id, operation, "SML participant call done");
        Ok(())
    }
}

fn write_participant(w: &mut XmlWriter, participant: &ParticipantId) -> Result<(), SmlError> {
    let mut start = BytesStart::new("ids:ParticipantIdentifier");
    start.push_attribute(("scheme", participant.scheme()));
    w.write_event(Event::Start(start))?;
    w.write_event(Event::Text(BytesText::new(participant.value())))?;
    w.write_event(Event::End(BytesEnd::new("ids:ParticipantIdentifier")))?;
    Ok(())
}
