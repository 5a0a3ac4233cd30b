//! # Redirects
//!
//! A redirect sends queries for one (service group, document type) to
//! another SMP. A document type is served either by a redirect or by a
//! service information, never both.

use serde::{Deserialize, Serialize};
use serde_json::json;
use smp_core::{Certificate, DocumentTypeId, Extension, FieldErrors, ParticipantId};

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::outcome::{Change, SaveMode};
use crate::service_group::ServiceGroup;
use crate::service_info::service_information_key;
use crate::store::Record;

/// Message of the redirect/service information exclusion conflict.
pub const ENDPOINTS_PRESENT: &str = "At least one Endpoint is registered for this Document Type. Delete the Endpoint before you can create a Redirect.";

/// Message of the duplicate redirect conflict.
pub const DUPLICATE_REDIRECT: &str =
    "Another Redirect for the provided Service Group and Document Type is already present.";

/// Redirect of one document type to another SMP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    /// Owning service group.
    pub service_group_id: ParticipantId,
    /// Redirected document type.
    pub document_type_id: DocumentTypeId,
    /// Target SMP URL.
    pub target_href: String,
    /// Subject unique identifier of the target SMP's certificate.
    pub subject_unique_identifier: String,
    /// Certificate of the target SMP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    /// Opaque XML extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

impl Record for Redirect {
    type Key = String;

    fn key(&self) -> String {
        service_information_key(&self.service_group_id, &self.document_type_id)
    }
}

/// Untrusted redirect input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedirectInput {
    /// Service group as `scheme::value`.
    pub service_group_id: String,
    /// Document type as `scheme::value`.
    pub document_type_id: String,
    /// Target SMP URL.
    pub target_href: String,
    /// Subject unique identifier.
    pub subject_unique_identifier: String,
    /// PEM or base64 certificate of the target SMP.
    pub certificate: Option<String>,
    /// XML extension.
    pub extension: Option<String>,
}

/// Registry view over redirects.
pub struct RedirectRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl RedirectRegistry<'_> {
    fn validate(&self, input: &RedirectInput) -> Result<Redirect, RegistryError> {
        let mut errors = FieldErrors::new();
        let policy = &self.ctx.policy;

        let service_group: Option<ServiceGroup> = if input.service_group_id.trim().is_empty() {
            errors.add("serviceGroupId", "A Service Group must be selected!");
            None
        } else {
            let group = policy
                .parse_participant(&input.service_group_id)
                .ok()
                .and_then(|pid| self.ctx.service_groups.get(&pid));
            if group.is_none() {
                errors.add("serviceGroupId", "The provided Service Group does not exist!");
            }
            group
        };

        let document_type = if input.document_type_id.trim().is_empty() {
            errors.add("documentTypeId", "Document Type ID must not be empty!");
            None
        } else {
            match policy.parse_document_type(&input.document_type_id) {
                Ok(doc) => Some(doc),
                Err(_) => {
                    errors.add(
                        "documentTypeId",
                        "The provided Document Type ID has an invalid syntax!",
                    );
                    None
                }
            }
        };

        let target_href = input.target_href.trim();
        if target_href.is_empty() {
            errors.add("targetHref", "The Redirect URL must not be empty!");
        } else if smp_core::validate_url(target_href).is_err() {
            errors.add("targetHref", "The Redirect URL is not a valid URL!");
        }

        let subject = input.subject_unique_identifier.trim();
        if subject.is_empty() {
            errors.add(
                "subjectUniqueIdentifier",
                "Subject Unique Identifier must not be empty!",
            );
        }

        let certificate = match input.certificate.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => match Certificate::parse(text) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    errors.add("certificate", format!("The provided certificate is invalid: {e}"));
                    None
                }
            },
        };

        let extension = match Extension::parse_opt(input.extension.as_deref()) {
            Ok(ext) => ext,
            Err(_) => {
                errors.add("extension", "The Extension must be valid XML content.");
                None
            }
        };

        errors.into_result()?;
        match (service_group, document_type) {
            (Some(group), Some(document_type_id)) => Ok(Redirect {
                service_group_id: group.participant_id,
                document_type_id,
                target_href: target_href.to_string(),
                subject_unique_identifier: subject.to_string(),
                certificate,
                extension,
            }),
            _ => Err(RegistryError::invalid(
                "serviceGroupId",
                "A Service Group must be selected!",
            )),
        }
    }

    /// Validate and store a redirect.
    ///
    /// Conflicts with any service information for the same document type.
    /// [`SaveMode::Create`] rejects an existing redirect; [`SaveMode::Edit`]
    /// requires one.
    pub fn create_or_update(
        &self,
        actor: &str,
        input: &RedirectInput,
        mode: SaveMode,
    ) -> Result<Redirect, RegistryError> {
        let redirect = self.validate(input)?;
        self.store_checked(actor, redirect, mode)
    }

    /// Store an already validated redirect after the conflict checks.
    pub(crate) fn store_checked(
        &self,
        actor: &str,
        redirect: Redirect,
        mode: SaveMode,
    ) -> Result<Redirect, RegistryError> {
        let key = redirect.key();
        let gate = self.ctx.service_info_gate.lock();
        if self.ctx.service_infos.contains(&key) {
            return Err(RegistryError::conflict("documentTypeId", ENDPOINTS_PRESENT));
        }
        let exists = self.ctx.redirects.contains(&key);
        match mode {
            SaveMode::Create if exists => {
                return Err(RegistryError::conflict("documentTypeId", DUPLICATE_REDIRECT));
            }
            SaveMode::Edit if !exists => {
                return Err(RegistryError::NotFound(format!(
                    "redirect for document type '{}'",
                    redirect.document_type_id
                )));
            }
            _ => {}
        }
        self.ctx.redirects.replace(redirect.clone())?;
        drop(gate);

        let action = match mode {
            SaveMode::Create => AuditAction::RedirectCreate,
            SaveMode::Edit => AuditAction::RedirectUpdate,
        };
        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, action, redirect.service_group_id.uri_encoded())
                .with_details(json!({
                    "documentTypeId": redirect.document_type_id.uri_encoded(),
                    "targetHref": redirect.target_href,
                })),
        );
        tracing::info!(
            participant = %redirect.service_group_id,
            doctype = %redirect.document_type_id,
            target = %redirect.target_href,
            "saved redirect"
        );
        Ok(redirect)
    }

    /// Delete the redirect for (service group, document type).
    pub fn delete(
        &self,
        actor: &str,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
    ) -> Result<Change, RegistryError> {
        let removed = self
            .ctx
            .redirects
            .remove(&service_information_key(service_group, document_type))?;
        if removed.is_some() {
            self.ctx.audit.record_or_log(
                AuditEvent::success(actor, AuditAction::RedirectDelete, service_group.uri_encoded())
                    .with_details(json!({ "documentTypeId": document_type.uri_encoded() })),
            );
        }
        Ok(Change::from_bool(removed.is_some()))
    }

    /// Redirect for (service group, document type).
    pub fn find(
        &self,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
    ) -> Option<Redirect> {
        self.ctx
            .redirects
            .get(&service_information_key(service_group, document_type))
    }

    /// All redirects.
    pub fn get_all(&self) -> Vec<Redirect> {
        self.ctx.redirects.list()
    }

    /// Redirects of one service group.
    pub fn get_all_of_service_group(&self, service_group: &ParticipantId) -> Vec<Redirect> {
        self.ctx
            .redirects
            .values_where(|r| &r.service_group_id == service_group)
    }

    /// Remove all redirects of a service group, returning how many there were.
    pub fn delete_all_of_service_group(
        &self,
        service_group: &ParticipantId,
    ) -> Result<usize, RegistryError> {
        let removed = self
            .ctx
            .redirects
            .remove_where(|r| &r.service_group_id == service_group)?;
        Ok(removed.len())
    }

    /// Number of redirects.
    pub fn count(&self) -> usize {
        self.ctx.redirects.len()
    }
}
