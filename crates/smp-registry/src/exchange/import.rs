use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use roxmltree::Node;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smp_core::{Certificate, Extension, FieldErrors, ParticipantId};

use super::*;
use crate::audit::{AuditAction, AuditEvent};
use crate::business_card::{
    validate_entity, BusinessCard, BusinessCardContact, BusinessCardEntityInput,
    BusinessCardIdentifier,
};
use crate::outcome::SaveMode;
use crate::redirect::Redirect;
use crate::service_group::{ServiceGroup, ServiceGroupInput};
use crate::service_info::{Endpoint, Process, ServiceInformation};

static IMPORT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How an import treats existing data and owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Replace service groups and business cards that already exist.
    pub overwrite_existing: bool,
    /// Owner for service groups whose recorded owner is unknown.
    pub default_owner: String,
    /// Users that may own service groups. `None` accepts every recorded
    /// owner.
    pub known_owners: Option<BTreeSet<String>>,
}

impl ImportOptions {
    /// Options that keep existing data and accept every recorded owner.
    pub fn new(default_owner: impl Into<String>) -> Self {
        Self {
            overwrite_existing: false,
            default_owner: default_owner.into(),
            known_owners: None,
        }
    }

    fn is_known_owner(&self, owner: &str) -> bool {
        match &self.known_owners {
            Some(known) => known.contains(owner),
            None => true,
        }
    }
}

/// Severity of an import action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportLevel {
    /// Something was read or written.
    Success,
    /// Progress information.
    Info,
    /// Something was skipped or replaced by a default.
    Warning,
    /// Something failed. Before the apply phase, any error aborts the import.
    Error,
}

/// One line of the import log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAction {
    /// Severity.
    pub level: ImportLevel,
    /// Operator-facing message.
    pub message: String,
}

/// Result of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Everything that happened, in order.
    pub actions: Vec<ImportAction>,
    /// Whether the apply phase ran.
    pub imported: bool,
    /// Service groups created.
    pub service_groups_created: usize,
    /// Existing service groups deleted for overwriting.
    pub service_groups_deleted: usize,
    /// Existing service groups left alone.
    pub service_groups_skipped: usize,
    /// Service information records merged.
    pub service_information_merged: usize,
    /// Redirects created.
    pub redirects_created: usize,
    /// Business cards saved.
    pub business_cards_saved: usize,
    /// Business cards left alone.
    pub business_cards_skipped: usize,
}

impl ImportSummary {
    /// Whether any action is an error.
    pub fn has_errors(&self) -> bool {
        self.actions.iter().any(|a| a.level == ImportLevel::Error)
    }
}

/// Collects actions and mirrors them to the log with a per-import prefix.
struct ImportLog {
    prefix: String,
    summary: ImportSummary,
}

impl ImportLog {
    fn start() -> Self {
        let n = IMPORT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            prefix: format!("[SG-IMPORT-{n}]"),
            summary: ImportSummary::default(),
        }
    }

    fn push(&mut self, level: ImportLevel, message: String) {
        match level {
            ImportLevel::Success | ImportLevel::Info => {
                tracing::info!("{} {}", self.prefix, message)
            }
            ImportLevel::Warning => tracing::warn!("{} {}", self.prefix, message),
            ImportLevel::Error => tracing::error!("{} {}", self.prefix, message),
        }
        self.summary.actions.push(ImportAction { level, message });
    }

    fn success(&mut self, message: impl Into<String>) {
        self.push(ImportLevel::Success, message.into());
    }

    fn info(&mut self, message: impl Into<String>) {
        self.push(ImportLevel::Info, message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.push(ImportLevel::Warning, message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.push(ImportLevel::Error, message.into());
    }
}

struct ParsedGroup {
    group: ServiceGroup,
    infos: Vec<ServiceInformation>,
    redirects: Vec<Redirect>,
    overwrite: bool,
}

// ---------------------------------------------------------------------------
// XML helpers
// ---------------------------------------------------------------------------

fn elements<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: Node<'_, '_>, name: &'static str) -> Option<String> {
    elements(node, name)
        .next()
        .map(|n| n.text().unwrap_or_default().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).map(str::trim).filter(|v| !v.is_empty())
}

fn read_extension(node: Node<'_, '_>, field: String, errors: &mut FieldErrors) -> Option<Extension> {
    match Extension::parse_opt(child_text(node, ELEMENT_EXTENSION).as_deref()) {
        Ok(ext) => ext,
        Err(e) => {
            errors.add_error(field, &e);
            None
        }
    }
}

fn read_date(
    node: Node<'_, '_>,
    name: &str,
    field: String,
    errors: &mut FieldErrors,
) -> Option<DateTime<Utc>> {
    let text = attr(node, name)?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(date) => Some(date.with_timezone(&Utc)),
        Err(_) => {
            errors.add(field, format!("'{text}' is not an RFC 3339 date time"));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

impl Exchange<'_> {
    /// Import an exchange document.
    ///
    /// The whole file is read first. If reading produced any error, nothing
    /// is written. Otherwise overwritten service groups are deleted, then
    /// service groups are created (SML hooks included), service information
    /// merged, redirects created and business cards saved. Failures during
    /// that phase are logged and do not stop the remaining items.
    pub async fn import_xml(
        &self,
        actor: &str,
        xml: &str,
        options: &ImportOptions,
    ) -> Result<ImportSummary, ExchangeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != ELEMENT_ROOT {
            return Err(ExchangeError::Format(format!(
                "expected root element <{ELEMENT_ROOT}> but found <{}>",
                root.tag_name().name()
            )));
        }
        match root.attribute(ATTR_VERSION) {
            Some(VERSION_1_0) => {}
            Some(other) => return Err(ExchangeError::UnsupportedVersion(other.to_string())),
            None => {
                return Err(ExchangeError::Format(
                    "the version attribute is missing".to_string(),
                ))
            }
        }

        let mut log = ImportLog::start();
        log.info(format!(
            "Starting import of service groups from XML v1.0, overwrite is {}",
            if options.overwrite_existing { "enabled" } else { "disabled" }
        ));
        let directory_enabled = self.ctx.settings().get().directory_integration_enabled;

        let groups = self.read_service_groups(root, options, &mut log);
        let cards = if directory_enabled {
            self.read_business_cards(root, &groups, options, &mut log)
        } else {
            Vec::new()
        };

        if groups.is_empty() && cards.is_empty() {
            log.warn(if directory_enabled {
                "Found neither a service group nor a business card to import."
            } else {
                "Found no service group to import."
            });
            return Ok(log.summary);
        }
        if log.summary.has_errors() {
            log.error("Nothing will be imported because of the previous errors!");
            return Ok(log.summary);
        }

        log.info("Import is performed!");
        self.apply(actor, groups, cards, &mut log).await;
        log.summary.imported = true;

        let summary = &log.summary;
        let details = json!({
            "serviceGroupsCreated": summary.service_groups_created,
            "serviceGroupsDeleted": summary.service_groups_deleted,
            "serviceGroupsSkipped": summary.service_groups_skipped,
            "serviceInformationMerged": summary.service_information_merged,
            "redirectsCreated": summary.redirects_created,
            "businessCardsSaved": summary.business_cards_saved,
        });
        let event = if summary.has_errors() {
            AuditEvent::failure(actor, AuditAction::Import, log.prefix.as_str())
        } else {
            AuditEvent::success(actor, AuditAction::Import, log.prefix.as_str())
        };
        self.ctx.audit.record_or_log(event.with_details(details));
        Ok(log.summary)
    }

    // -- Read phase ----------------------------------------------------------

    fn read_service_groups(
        &self,
        root: Node<'_, '_>,
        options: &ImportOptions,
        log: &mut ImportLog,
    ) -> Vec<ParsedGroup> {
        let mut parsed = Vec::new();
        let mut seen = BTreeSet::new();
        for (index, node) in elements(root, ELEMENT_SERVICEGROUP).enumerate() {
            let group = match self.read_service_group(node, options, log) {
                Ok(group) => group,
                Err(errors) => {
                    log.error(format!(
                        "Error parsing the service group at index {index}: {errors}"
                    ));
                    continue;
                }
            };
            let participant = group.participant_id.clone();
            if !seen.insert(participant.clone()) {
                log.error(format!(
                    "The service group {participant} (index {index}) is contained more than once in the file."
                ));
                continue;
            }
            let exists = self.ctx.service_groups.contains(&participant);
            if exists && !options.overwrite_existing {
                log.warn(format!("Ignoring already contained service group {participant}"));
                log.summary.service_groups_skipped += 1;
                continue;
            }
            log.success(format!(
                "Will {} service group {participant}",
                if exists { "overwrite" } else { "import" }
            ));

            let mut infos = Vec::new();
            for (i, si_node) in elements(node, ELEMENT_SERVICEINFO).enumerate() {
                match self.read_service_information(si_node, &participant) {
                    Ok(si) => infos.push(si),
                    Err(errors) => log.error(format!(
                        "Error parsing service information {i} of service group {participant}: {errors}"
                    )),
                }
            }
            log.info(format!(
                "Read {} service information of service group {participant}",
                infos.len()
            ));

            let mut redirects = Vec::new();
            for (i, rd_node) in elements(node, ELEMENT_REDIRECT).enumerate() {
                match self.read_redirect(rd_node, &participant) {
                    Ok(redirect) => redirects.push(redirect),
                    Err(errors) => log.error(format!(
                        "Error parsing redirect {i} of service group {participant}: {errors}"
                    )),
                }
            }
            log.info(format!(
                "Read {} redirects of service group {participant}",
                redirects.len()
            ));
            for redirect in &redirects {
                let document_type = &redirect.document_type_id;
                if infos.iter().any(|si| &si.document_type_id == document_type) {
                    log.error(format!(
                        "The service group {participant} contains both service information and a redirect for document type {document_type}"
                    ));
                }
            }

            parsed.push(ParsedGroup {
                group,
                infos,
                redirects,
                overwrite: exists,
            });
        }
        parsed
    }

    fn read_service_group(
        &self,
        node: Node<'_, '_>,
        options: &ImportOptions,
        log: &mut ImportLog,
    ) -> Result<ServiceGroup, FieldErrors> {
        let mut errors = FieldErrors::new();
        let participant = match attr(node, ATTR_PARTICIPANT) {
            None => {
                errors.add(ATTR_PARTICIPANT, "The participant identifier is missing");
                None
            }
            Some(uri) => match self.ctx.policy.parse_participant(uri) {
                Ok(pid) => Some(pid),
                Err(e) => {
                    errors.add_error(ATTR_PARTICIPANT, &e);
                    None
                }
            },
        };
        let extension = read_extension(node, ELEMENT_EXTENSION.to_string(), &mut errors);
        errors.into_result()?;
        let Some(participant_id) = participant else {
            return Err(FieldErrors::single(
                ATTR_PARTICIPANT,
                "The participant identifier is missing",
            ));
        };

        let owner_id = match attr(node, ATTR_OWNER_ID) {
            Some(owner) if options.is_known_owner(owner) => owner.to_string(),
            recorded => {
                log.warn(format!(
                    "Failed to resolve stored owner '{}' of service group {participant_id} - using default owner '{}'",
                    recorded.unwrap_or_default(),
                    options.default_owner
                ));
                options.default_owner.clone()
            }
        };
        Ok(ServiceGroup {
            participant_id,
            owner_id,
            extension,
        })
    }

    fn read_service_information(
        &self,
        node: Node<'_, '_>,
        service_group: &ParticipantId,
    ) -> Result<ServiceInformation, FieldErrors> {
        let mut errors = FieldErrors::new();
        let policy = &self.ctx.policy;
        let document_type = match attr(node, ATTR_DOCTYPE) {
            None => {
                errors.add(ATTR_DOCTYPE, "The document type identifier is missing");
                None
            }
            Some(uri) => match policy.parse_document_type(uri) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    errors.add_error(ATTR_DOCTYPE, &e);
                    None
                }
            },
        };
        let extension = read_extension(node, ELEMENT_EXTENSION.to_string(), &mut errors);

        let mut processes: Vec<Process> = Vec::new();
        for (p, process_node) in elements(node, ELEMENT_PROCESS).enumerate() {
            let prefix = format!("process[{p}]");
            let process_id = match attr(process_node, ATTR_PROCESS)
                .map(|uri| policy.parse_process(uri))
            {
                Some(Ok(process_id)) => Some(process_id),
                Some(Err(e)) => {
                    errors.add_error(format!("{prefix}.{ATTR_PROCESS}"), &e);
                    None
                }
                None => {
                    errors.add(
                        format!("{prefix}.{ATTR_PROCESS}"),
                        "The process identifier is missing",
                    );
                    None
                }
            };
            let mut process = process_id.map(Process::new);
            if let Some(process) = &mut process {
                process.extension = read_extension(
                    process_node,
                    format!("{prefix}.{ELEMENT_EXTENSION}"),
                    &mut errors,
                );
            }
            for (e, endpoint_node) in elements(process_node, ELEMENT_ENDPOINT).enumerate() {
                let endpoint_prefix = format!("{prefix}.endpoint[{e}]");
                let endpoint = self.read_endpoint(endpoint_node, &endpoint_prefix, &mut errors);
                if let (Some(process), Some(endpoint)) = (&mut process, endpoint) {
                    *process = process.with_endpoint(endpoint);
                }
            }
            if let Some(process) = process {
                match processes
                    .iter_mut()
                    .find(|existing| existing.process_id == process.process_id)
                {
                    Some(slot) => *slot = process,
                    None => processes.push(process),
                }
            }
        }

        errors.into_result()?;
        let Some(document_type_id) = document_type else {
            return Err(FieldErrors::single(
                ATTR_DOCTYPE,
                "The document type identifier is missing",
            ));
        };
        Ok(ServiceInformation {
            service_group_id: service_group.clone(),
            document_type_id,
            processes,
            extension,
        })
    }

    fn read_endpoint(
        &self,
        node: Node<'_, '_>,
        prefix: &str,
        errors: &mut FieldErrors,
    ) -> Option<Endpoint> {
        let field = |name: &str| format!("{prefix}.{name}");
        let before = errors.len();

        let transport_profile = attr(node, ATTR_TRANSPORT_PROFILE).unwrap_or_default();
        if transport_profile.is_empty() {
            errors.add(field(ATTR_TRANSPORT_PROFILE), "The transport profile is missing");
        } else if !self
            .ctx
            .transport_profiles
            .contains(&transport_profile.to_string())
        {
            errors.add(
                field(ATTR_TRANSPORT_PROFILE),
                format!("The transport profile '{transport_profile}' is unknown"),
            );
        }

        let endpoint_reference = attr(node, ATTR_ENDPOINT_REFERENCE).map(str::to_string);
        if let Some(reference) = &endpoint_reference {
            if smp_core::validate_url(reference).is_err() {
                errors.add(field(ATTR_ENDPOINT_REFERENCE), "The endpoint reference is not a valid URL");
            }
        }

        let require_business_level_signature = match attr(node, ATTR_REQUIRE_SIGNATURE) {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                errors.add(
                    field(ATTR_REQUIRE_SIGNATURE),
                    format!("'{other}' is not a boolean"),
                );
                false
            }
        };

        let activation_date = read_date(node, ATTR_ACTIVATION, field(ATTR_ACTIVATION), errors);
        let expiration_date = read_date(node, ATTR_EXPIRATION, field(ATTR_EXPIRATION), errors);
        if let Err(e) = smp_core::check_validity_window(activation_date, expiration_date) {
            errors.add_error(field(ATTR_ACTIVATION), &e);
        }

        let certificate = match child_text(node, ELEMENT_CERTIFICATE) {
            None => {
                errors.add(field(ELEMENT_CERTIFICATE), "The certificate is missing");
                None
            }
            Some(text) => match Certificate::parse(&text) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    errors.add_error(field(ELEMENT_CERTIFICATE), &e);
                    None
                }
            },
        };

        let service_description = child_text(node, ELEMENT_SERVICE_DESCRIPTION).unwrap_or_default();
        if service_description.is_empty() {
            errors.add(field(ELEMENT_SERVICE_DESCRIPTION), "The service description is missing");
        }
        let technical_contact_url = attr(node, ATTR_TECH_CONTACT).unwrap_or_default();
        if technical_contact_url.is_empty() {
            errors.add(field(ATTR_TECH_CONTACT), "The technical contact is missing");
        }
        let technical_information_url = attr(node, ATTR_TECH_INFO).map(str::to_string);
        if let Some(info) = &technical_information_url {
            if smp_core::validate_url(info).is_err() {
                errors.add(field(ATTR_TECH_INFO), "The technical information URL is not a valid URL");
            }
        }
        let extension = read_extension(node, field(ELEMENT_EXTENSION), errors);

        if errors.len() != before {
            return None;
        }
        Some(Endpoint {
            transport_profile: transport_profile.to_string(),
            endpoint_reference,
            require_business_level_signature,
            minimum_authentication_level: attr(node, ATTR_MIN_AUTH_LEVEL).map(str::to_string),
            activation_date,
            expiration_date,
            certificate: certificate?,
            service_description,
            technical_contact_url: technical_contact_url.to_string(),
            technical_information_url,
            extension,
        })
    }

    fn read_redirect(
        &self,
        node: Node<'_, '_>,
        service_group: &ParticipantId,
    ) -> Result<Redirect, FieldErrors> {
        let mut errors = FieldErrors::new();
        let document_type = match attr(node, ATTR_DOCTYPE) {
            None => {
                errors.add(ATTR_DOCTYPE, "The document type identifier is missing");
                None
            }
            Some(uri) => match self.ctx.policy.parse_document_type(uri) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    errors.add_error(ATTR_DOCTYPE, &e);
                    None
                }
            },
        };
        let target_href = attr(node, ATTR_TARGET_HREF).unwrap_or_default();
        if target_href.is_empty() {
            errors.add(ATTR_TARGET_HREF, "The target URL is missing");
        } else if smp_core::validate_url(target_href).is_err() {
            errors.add(ATTR_TARGET_HREF, "The target URL is not a valid URL");
        }
        let subject = attr(node, ATTR_SUID).unwrap_or_default();
        if subject.is_empty() {
            errors.add(ATTR_SUID, "The subject unique identifier is missing");
        }
        let certificate = match child_text(node, ELEMENT_CERTIFICATE) {
            None => None,
            Some(text) => match Certificate::parse(&text) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    errors.add_error(ELEMENT_CERTIFICATE, &e);
                    None
                }
            },
        };
        let extension = read_extension(node, ELEMENT_EXTENSION.to_string(), &mut errors);

        errors.into_result()?;
        let Some(document_type_id) = document_type else {
            return Err(FieldErrors::single(
                ATTR_DOCTYPE,
                "The document type identifier is missing",
            ));
        };
        Ok(Redirect {
            service_group_id: service_group.clone(),
            document_type_id,
            target_href: target_href.to_string(),
            subject_unique_identifier: subject.to_string(),
            certificate,
            extension,
        })
    }

    fn read_business_cards(
        &self,
        root: Node<'_, '_>,
        groups: &[ParsedGroup],
        options: &ImportOptions,
        log: &mut ImportLog,
    ) -> Vec<BusinessCard> {
        let mut cards: Vec<BusinessCard> = Vec::new();
        for (index, node) in elements(root, ELEMENT_BUSINESSCARD).enumerate() {
            let card = match self.read_business_card(node, groups) {
                Ok(card) => card,
                Err(errors) => {
                    log.error(format!(
                        "Error parsing the business card at index {index}: {errors}"
                    ));
                    continue;
                }
            };
            let participant = card.service_group_id.clone();
            let exists = self.ctx.business_cards.contains(&participant);
            if exists && !options.overwrite_existing {
                log.warn(format!("Ignoring already contained business card {participant}"));
                log.summary.business_cards_skipped += 1;
                continue;
            }
            if cards.iter().any(|c| c.service_group_id == participant) {
                log.error(format!(
                    "The business card for {participant} is contained more than once in the file."
                ));
                continue;
            }
            log.success(format!(
                "Will {} business card for {participant}",
                if exists { "overwrite" } else { "import" }
            ));
            cards.push(card);
        }
        cards
    }

    fn read_business_card(
        &self,
        node: Node<'_, '_>,
        groups: &[ParsedGroup],
    ) -> Result<BusinessCard, FieldErrors> {
        let mut errors = FieldErrors::new();
        let participant = attr(node, ATTR_SERVICEGROUP_ID)
            .and_then(|uri| self.ctx.policy.parse_participant(uri).ok())
            .filter(|pid| {
                self.ctx.service_groups.contains(pid)
                    || groups.iter().any(|g| &g.group.participant_id == pid)
            });
        if participant.is_none() {
            errors.add(
                ATTR_SERVICEGROUP_ID,
                "The business card contains an invalid or unknown service group",
            );
        }

        let mut entities = Vec::new();
        for (i, entity_node) in elements(node, ELEMENT_ENTITY).enumerate() {
            let input = BusinessCardEntityInput {
                id: attr(entity_node, ATTR_ID).map(str::to_string),
                name: attr(entity_node, ATTR_NAME).unwrap_or_default().to_string(),
                country_code: attr(entity_node, ATTR_COUNTRY).unwrap_or_default().to_string(),
                geo_info: child_text(entity_node, ELEMENT_GEOINFO),
                identifiers: elements(entity_node, ELEMENT_IDENTIFIER)
                    .map(|n| BusinessCardIdentifier {
                        scheme: attr(n, ATTR_SCHEME).unwrap_or_default().to_string(),
                        value: attr(n, ATTR_VALUE).unwrap_or_default().to_string(),
                    })
                    .collect(),
                website_uris: elements(entity_node, ELEMENT_WEBSITE)
                    .filter_map(|n| n.text().map(|t| t.trim().to_string()))
                    .collect(),
                contacts: elements(entity_node, ELEMENT_CONTACT)
                    .map(|n| BusinessCardContact {
                        contact_type: attr(n, ATTR_TYPE).unwrap_or_default().to_string(),
                        name: attr(n, ATTR_NAME).unwrap_or_default().to_string(),
                        phone: attr(n, ATTR_PHONE).unwrap_or_default().to_string(),
                        email: attr(n, ATTR_EMAIL).unwrap_or_default().to_string(),
                    })
                    .collect(),
                additional_info: child_text(entity_node, ELEMENT_ADDITIONAL),
                registration_date: attr(entity_node, ATTR_REGISTRATION_DATE).map(str::to_string),
            };
            entities.push(validate_entity(i, &input, &mut errors));
        }
        if entities.is_empty() {
            errors.add("entities", "At least one entity must be provided.");
        }

        errors.into_result()?;
        let Some(service_group_id) = participant else {
            return Err(FieldErrors::single(
                ATTR_SERVICEGROUP_ID,
                "The business card contains an invalid or unknown service group",
            ));
        };
        Ok(BusinessCard {
            service_group_id,
            entities,
        }
        .sorted())
    }

    // -- Apply phase ---------------------------------------------------------

    async fn apply(
        &self,
        actor: &str,
        groups: Vec<ParsedGroup>,
        cards: Vec<BusinessCard>,
        log: &mut ImportLog,
    ) {
        let service_groups = self.ctx.service_groups();
        let service_info = self.ctx.service_information();
        let redirects = self.ctx.redirects();

        for parsed in groups.iter().filter(|g| g.overwrite) {
            let participant = &parsed.group.participant_id;
            match service_groups.delete(actor, participant).await {
                Ok(outcome) => {
                    for warning in outcome.warnings {
                        log.warn(warning);
                    }
                    if outcome.value.is_changed() {
                        log.success(format!("Successfully deleted service group {participant}"));
                        log.summary.service_groups_deleted += 1;
                    } else {
                        log.error(format!("Failed to delete service group {participant}"));
                    }
                }
                Err(e) => log.error(format!("Failed to delete service group {participant}: {e}")),
            }
        }

        let mut failed = BTreeSet::new();
        for parsed in groups {
            let participant = parsed.group.participant_id.clone();
            let input = ServiceGroupInput {
                participant_id: participant.uri_encoded(),
                owner_id: parsed.group.owner_id.clone(),
                extension: parsed.group.extension.as_ref().map(|e| e.as_str().to_string()),
            };
            if let Err(e) = service_groups.create(actor, &input).await {
                log.error(format!(
                    "Error creating the new service group {participant}: {e}"
                ));
                failed.insert(participant);
                continue;
            }
            log.success(format!("Successfully created service group {participant}"));
            log.summary.service_groups_created += 1;

            for si in &parsed.infos {
                match service_info.merge(actor, si) {
                    Ok(_) => {
                        log.success(format!(
                            "Successfully created service information for {participant} and document type {}",
                            si.document_type_id
                        ));
                        log.summary.service_information_merged += 1;
                    }
                    Err(e) => log.error(format!(
                        "Error creating the new service information for {participant}: {e}"
                    )),
                }
            }
            for redirect in parsed.redirects {
                let document_type = redirect.document_type_id.clone();
                match redirects.store_checked(actor, redirect, SaveMode::Create) {
                    Ok(_) => {
                        log.success(format!(
                            "Successfully created redirect for {participant} and document type {document_type}"
                        ));
                        log.summary.redirects_created += 1;
                    }
                    Err(e) => log.error(format!(
                        "Error creating the new redirect for {participant}: {e}"
                    )),
                }
            }
        }

        let business_cards = self.ctx.business_cards();
        for card in cards {
            let participant = card.service_group_id.clone();
            if failed.contains(&participant) {
                log.warn(format!(
                    "Skipping business card {participant} because its service group could not be created"
                ));
                continue;
            }
            match business_cards.save_validated(actor, card, SaveMode::Edit).await {
                Ok(outcome) => {
                    for warning in outcome.warnings {
                        log.warn(warning);
                    }
                    log.success(format!("Successfully created business card {participant}"));
                    log.summary.business_cards_saved += 1;
                }
                Err(e) => log.error(format!("Failed to create business card {participant}: {e}")),
            }
        }
    }
}
