//! # Service Information
//!
//! One [`ServiceInformation`] exists per (service group, document type). It
//! holds the processes supported for that document type and, per process,
//! one [`Endpoint`] per transport profile:
//!
//! ```text
//! ServiceInformation (SG, doc type)
//!  └── Process (process id)            unique within the service information
//!       └── Endpoint (transport profile) unique within the process
//! ```
//!
//! Values are immutable: edits build a new [`ServiceInformation`] and
//! [`ServiceInformationRegistry::merge`] replaces the stored record
//! atomically. All writes to this collection are serialized by a gate so
//! that read-modify-write sequences (merge, bulk rewrites) never interleave.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smp_core::{
    Certificate, DocumentTypeId, Extension, FieldErrors, ParticipantId, ProcessId,
};

use crate::audit::{AuditAction, AuditEvent};
use crate::context::RegistryContext;
use crate::error::RegistryError;
use crate::outcome::{Change, SaveMode};
use crate::store::Record;

/// Message of the duplicate endpoint conflict.
pub const DUPLICATE_ENDPOINT: &str = "Another endpoint for the provided service group, document type, process and transport profile is already present. Some of the identifiers may be treated case insensitive!";

/// Message of the endpoint/redirect exclusion conflict.
pub const REDIRECT_PRESENT: &str = "A Redirect is registered for this Document Type. Delete the Redirect before you can create an Endpoint.";

/// Storage key of the record for (service group, document type).
///
/// `sg_uri + "-" + percent_encode(doc_uri)`.
pub fn service_information_key(service_group: &ParticipantId, document_type: &DocumentTypeId) -> String {
    let doc: String =
        url::form_urlencoded::byte_serialize(document_type.uri_encoded().as_bytes()).collect();
    format!("{}-{doc}", service_group.uri_encoded())
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// One access point for a (process, transport profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Transport profile ID.
    pub transport_profile: String,
    /// URL messages are delivered to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_reference: Option<String>,
    /// Whether receivers require a business-level signature.
    #[serde(default)]
    pub require_business_level_signature: bool,
    /// Minimum authentication level, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_authentication_level: Option<String>,
    /// Start of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_date: Option<DateTime<Utc>>,
    /// End of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Access point certificate.
    pub certificate: Certificate,
    /// Human-readable description.
    pub service_description: String,
    /// Technical contact (URL or e-mail).
    pub technical_contact_url: String,
    /// Further technical information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_information_url: Option<String>,
    /// Opaque XML extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

/// A process and its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    /// Process identifier.
    pub process_id: ProcessId,
    /// Endpoints, unique by transport profile.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Opaque XML extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

impl Process {
    /// Empty process.
    pub fn new(process_id: ProcessId) -> Self {
        Self {
            process_id,
            endpoints: Vec::new(),
            extension: None,
        }
    }

    /// Endpoint for `transport_profile`.
    pub fn endpoint(&self, transport_profile: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.transport_profile == transport_profile)
    }

    /// Copy with `endpoint` added, or replacing the one with the same profile.
    pub fn with_endpoint(&self, endpoint: Endpoint) -> Self {
        let mut next = self.clone();
        match next
            .endpoints
            .iter_mut()
            .find(|e| e.transport_profile == endpoint.transport_profile)
        {
            Some(slot) => *slot = endpoint,
            None => next.endpoints.push(endpoint),
        }
        next
    }

    /// Copy without the endpoint for `transport_profile`, or `None` if there
    /// is no such endpoint.
    pub fn without_endpoint(&self, transport_profile: &str) -> Option<Self> {
        let mut next = self.clone();
        let before = next.endpoints.len();
        next.endpoints
            .retain(|e| e.transport_profile != transport_profile);
        (next.endpoints.len() != before).then_some(next)
    }
}

/// Processes and endpoints of one (service group, document type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInformation {
    /// Owning service group.
    pub service_group_id: ParticipantId,
    /// Document type.
    pub document_type_id: DocumentTypeId,
    /// Processes, unique by process ID.
    #[serde(default)]
    pub processes: Vec<Process>,
    /// Opaque XML extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

impl Record for ServiceInformation {
    type Key = String;

    fn key(&self) -> String {
        self.id()
    }
}

impl ServiceInformation {
    /// Service information without processes.
    pub fn new(service_group_id: ParticipantId, document_type_id: DocumentTypeId) -> Self {
        Self {
            service_group_id,
            document_type_id,
            processes: Vec::new(),
            extension: None,
        }
    }

    /// Storage key.
    pub fn id(&self) -> String {
        service_information_key(&self.service_group_id, &self.document_type_id)
    }

    /// Process by ID.
    pub fn process(&self, process_id: &ProcessId) -> Option<&Process> {
        self.processes.iter().find(|p| &p.process_id == process_id)
    }

    /// Endpoint by process and transport profile.
    pub fn endpoint(&self, process_id: &ProcessId, transport_profile: &str) -> Option<&Endpoint> {
        self.process(process_id)
            .and_then(|p| p.endpoint(transport_profile))
    }

    /// Total number of endpoints over all processes.
    pub fn endpoint_count(&self) -> usize {
        self.processes.iter().map(|p| p.endpoints.len()).sum()
    }

    /// Every endpoint together with its process.
    pub fn endpoints(&self) -> impl Iterator<Item = (&Process, &Endpoint)> {
        self.processes
            .iter()
            .flat_map(|p| p.endpoints.iter().map(move |e| (p, e)))
    }

    /// Copy with `process` added, or replacing the one with the same ID.
    pub fn with_process(&self, process: Process) -> Self {
        let mut next = self.clone();
        match next
            .processes
            .iter_mut()
            .find(|p| p.process_id == process.process_id)
        {
            Some(slot) => *slot = process,
            None => next.processes.push(process),
        }
        next
    }

    /// Copy with `endpoint` placed below `process_id`, creating the process
    /// if needed.
    pub fn with_endpoint(&self, process_id: &ProcessId, endpoint: Endpoint) -> Self {
        let process = self
            .process(process_id)
            .cloned()
            .unwrap_or_else(|| Process::new(process_id.clone()));
        self.with_process(process.with_endpoint(endpoint))
    }

    /// Fold `other` into this record.
    ///
    /// Processes are found or created by ID, endpoints found and replaced or
    /// created by transport profile. Extensions present in `other` win.
    /// Merging the same value twice yields the same result as merging once.
    pub fn merged_with(&self, other: &ServiceInformation) -> Self {
        let mut merged = self.clone();
        for incoming in &other.processes {
            let mut process = merged
                .process(&incoming.process_id)
                .cloned()
                .unwrap_or_else(|| Process::new(incoming.process_id.clone()));
            for endpoint in &incoming.endpoints {
                process = process.with_endpoint(endpoint.clone());
            }
            if incoming.extension.is_some() {
                process.extension = incoming.extension.clone();
            }
            merged = merged.with_process(process);
        }
        if other.extension.is_some() {
            merged.extension = other.extension.clone();
        }
        merged
    }
}

/// An endpoint together with everything above it, resolved in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEndpoint {
    /// Owning service group.
    pub service_group: crate::service_group::ServiceGroup,
    /// Service information holding the endpoint.
    pub service_information: ServiceInformation,
    /// Process holding the endpoint.
    pub process: Process,
    /// The endpoint.
    pub endpoint: Endpoint,
}

/// Result of a bulk certificate or URL rewrite.
///
/// `changed_endpoints` only counts endpoints whose service information was
/// saved; service information records that failed to save are counted in
/// `save_errors` and left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkChangeReport {
    /// Endpoints rewritten and persisted.
    pub changed_endpoints: usize,
    /// Service information records whose save failed.
    pub save_errors: usize,
    /// Distinct service groups with at least one persisted change.
    pub service_groups: usize,
    /// Operator-facing summary.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Untrusted endpoint input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointInput {
    /// Service group as `scheme::value`.
    pub service_group_id: String,
    /// Document type as `scheme::value`.
    pub document_type_id: String,
    /// Process as `scheme::value`.
    pub process_id: String,
    /// Transport profile ID.
    pub transport_profile: String,
    /// Endpoint URL.
    pub endpoint_reference: Option<String>,
    /// Business-level signature required.
    pub require_business_level_signature: bool,
    /// Minimum authentication level.
    pub minimum_authentication_level: Option<String>,
    /// Start of validity.
    pub activation_date: Option<DateTime<Utc>>,
    /// End of validity.
    pub expiration_date: Option<DateTime<Utc>>,
    /// PEM or base64 certificate.
    pub certificate: String,
    /// Service description.
    pub service_description: String,
    /// Technical contact.
    pub technical_contact_url: String,
    /// Technical information URL.
    pub technical_information_url: Option<String>,
    /// XML extension.
    pub extension: Option<String>,
}

struct ValidEndpoint {
    service_group: crate::service_group::ServiceGroup,
    document_type_id: DocumentTypeId,
    process_id: ProcessId,
    endpoint: Endpoint,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registry view over service information.
pub struct ServiceInformationRegistry<'a> {
    pub(crate) ctx: &'a RegistryContext,
}

impl ServiceInformationRegistry<'_> {
    fn validate_endpoint(&self, input: &EndpointInput) -> Result<ValidEndpoint, RegistryError> {
        let mut errors = FieldErrors::new();
        let policy = &self.ctx.policy;

        let service_group = if input.service_group_id.trim().is_empty() {
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

        let document_type_id = if input.document_type_id.trim().is_empty() {
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

        let process_id = if input.process_id.trim().is_empty() {
            errors.add("processId", "Process ID must not be empty!");
            None
        } else {
            match policy.parse_process(&input.process_id) {
                Ok(process) => Some(process),
                Err(_) => {
                    errors.add("processId", "The provided Process ID has an invalid syntax!");
                    None
                }
            }
        };

        let transport_profile = input.transport_profile.trim();
        if transport_profile.is_empty() {
            errors.add("transportProfile", "Transport Profile must be selected!");
        } else if !self.ctx.transport_profiles.contains(&transport_profile.to_string()) {
            errors.add(
                "transportProfile",
                "The provided Transport Profile does not exist!",
            );
        }

        let endpoint_reference = non_blank(input.endpoint_reference.as_deref());
        if let Some(reference) = &endpoint_reference {
            if smp_core::validate_url(reference).is_err() {
                errors.add("endpointReference", "The Endpoint Reference is not a valid URL!");
            }
        }

        if let Err(e) = smp_core::check_validity_window(input.activation_date, input.expiration_date)
        {
            errors.add_error("activationDate", &e);
        }

        let certificate = if input.certificate.trim().is_empty() {
            errors.add("certificate", "Certificate must not be empty!");
            None
        } else {
            match Certificate::parse(&input.certificate) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    errors.add("certificate", format!("The provided certificate is invalid: {e}"));
                    None
                }
            }
        };

        let service_description = input.service_description.trim();
        if service_description.is_empty() {
            errors.add("serviceDescription", "Service Description must not be empty!");
        }

        let technical_contact_url = input.technical_contact_url.trim();
        if technical_contact_url.is_empty() {
            errors.add("technicalContactUrl", "Technical Contact must not be empty!");
        }

        let technical_information_url = non_blank(input.technical_information_url.as_deref());
        if let Some(info_url) = &technical_information_url {
            if smp_core::validate_url(info_url).is_err() {
                errors.add(
                    "technicalInformationUrl",
                    "The Technical Information URL is not a valid URL!",
                );
            }
        }

        let extension = match Extension::parse_opt(input.extension.as_deref()) {
            Ok(ext) => ext,
            Err(e) => {
                errors.add_error("extension", &e);
                None
            }
        };

        errors.into_result()?;
        match (service_group, document_type_id, process_id, certificate) {
            (Some(service_group), Some(document_type_id), Some(process_id), Some(certificate)) => {
                Ok(ValidEndpoint {
                    service_group,
                    document_type_id,
                    process_id,
                    endpoint: Endpoint {
                        transport_profile: transport_profile.to_string(),
                        endpoint_reference,
                        require_business_level_signature: input
                            .require_business_level_signature,
                        minimum_authentication_level: non_blank(
                            input.minimum_authentication_level.as_deref(),
                        ),
                        activation_date: input.activation_date,
                        expiration_date: input.expiration_date,
                        certificate,
                        service_description: service_description.to_string(),
                        technical_contact_url: technical_contact_url.to_string(),
                        technical_information_url,
                        extension,
                    },
                })
            }
            _ => Err(RegistryError::invalid("serviceGroupId", "incomplete endpoint input")),
        }
    }

    /// Field checks for an already typed endpoint, reported below `prefix`.
    ///
    /// The certificate was parsed when the endpoint was built, so only the
    /// remaining rules of [`Self::validate_endpoint`] apply.
    fn check_endpoint(&self, endpoint: &Endpoint, prefix: &str, errors: &mut FieldErrors) {
        let field = |name: &str| format!("{prefix}.{name}");
        let transport_profile = endpoint.transport_profile.trim();
        if transport_profile.is_empty() {
            errors.add(field("transportProfile"), "Transport Profile must be selected!");
        } else if !self.ctx.transport_profiles.contains(&transport_profile.to_string()) {
            errors.add(
                field("transportProfile"),
                "The provided Transport Profile does not exist!",
            );
        }
        if let Some(reference) = &endpoint.endpoint_reference {
            if smp_core::validate_url(reference).is_err() {
                errors.add(field("endpointReference"), "The Endpoint Reference is not a valid URL!");
            }
        }
        if let Err(e) =
            smp_core::check_validity_window(endpoint.activation_date, endpoint.expiration_date)
        {
            errors.add_error(field("activationDate"), &e);
        }
        if endpoint.service_description.trim().is_empty() {
            errors.add(field("serviceDescription"), "Service Description must not be empty!");
        }
        if endpoint.technical_contact_url.trim().is_empty() {
            errors.add(field("technicalContactUrl"), "Technical Contact must not be empty!");
        }
        if let Some(info_url) = &endpoint.technical_information_url {
            if smp_core::validate_url(info_url).is_err() {
                errors.add(
                    field("technicalInformationUrl"),
                    "The Technical Information URL is not a valid URL!",
                );
            }
        }
    }

    /// Validate and store one endpoint.
    ///
    /// Field validation runs first and reports every problem. Conflicts are
    /// checked afterwards: a redirect for the document type always conflicts,
    /// and in [`SaveMode::Create`] so does an existing endpoint for the same
    /// (service group, document type, process, transport profile).
    /// [`SaveMode::Edit`] requires that endpoint to exist.
    pub fn save_endpoint(
        &self,
        actor: &str,
        input: &EndpointInput,
        mode: SaveMode,
    ) -> Result<ResolvedEndpoint, RegistryError> {
        let valid = self.validate_endpoint(input)?;
        let sg = valid.service_group.participant_id.clone();
        let doc = valid.document_type_id.clone();
        let key = service_information_key(&sg, &doc);

        let _gate = self.ctx.service_info_gate.lock();
        if !self
            .ctx
            .transport_profiles
            .contains(&valid.endpoint.transport_profile)
        {
            return Err(RegistryError::invalid(
                "transportProfile",
                "The provided Transport Profile does not exist!",
            ));
        }
        if self.ctx.redirects.contains(&key) {
            return Err(RegistryError::conflict("documentTypeId", REDIRECT_PRESENT));
        }
        let current = self.ctx.service_infos.get(&key);
        let exists = current
            .as_ref()
            .and_then(|si| si.endpoint(&valid.process_id, &valid.endpoint.transport_profile))
            .is_some();
        match mode {
            SaveMode::Create if exists => {
                return Err(RegistryError::conflict("transportProfile", DUPLICATE_ENDPOINT));
            }
            SaveMode::Edit if !exists => {
                return Err(RegistryError::NotFound(format!(
                    "endpoint '{}' of process '{}'",
                    valid.endpoint.transport_profile, valid.process_id
                )));
            }
            _ => {}
        }

        let updated = current
            .unwrap_or_else(|| ServiceInformation::new(sg.clone(), doc.clone()))
            .with_endpoint(&valid.process_id, valid.endpoint.clone());
        self.ctx.service_infos.replace(updated.clone())?;
        drop(_gate);

        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::ServiceInformationMerge, sg.uri_encoded())
                .with_details(json!({
                    "documentTypeId": doc.uri_encoded(),
                    "processId": valid.process_id.uri_encoded(),
                    "transportProfile": valid.endpoint.transport_profile,
                    "mode": mode,
                })),
        );
        tracing::info!(
            participant = %sg,
            doctype = %doc,
            process = %valid.process_id,
            transport_profile = %valid.endpoint.transport_profile,
            ?mode,
            "saved endpoint"
        );

        let process = updated
            .process(&valid.process_id)
            .cloned()
            .unwrap_or_else(|| Process::new(valid.process_id.clone()));
        Ok(ResolvedEndpoint {
            service_group: valid.service_group,
            service_information: updated,
            process,
            endpoint: valid.endpoint,
        })
    }

    /// Upsert keyed by (service group, document type).
    ///
    /// Processes and endpoints are merged into the stored record, see
    /// [`ServiceInformation::merged_with`]. The service group must exist and
    /// the document type must not have a redirect. Every endpoint of `si` is
    /// checked like [`Self::save_endpoint`] does before anything is stored.
    pub fn merge(&self, actor: &str, si: &ServiceInformation) -> Result<Change, RegistryError> {
        let _gate = self.ctx.service_info_gate.lock();
        let mut errors = FieldErrors::new();
        for (p, process) in si.processes.iter().enumerate() {
            for (e, endpoint) in process.endpoints.iter().enumerate() {
                self.check_endpoint(endpoint, &format!("processes[{p}].endpoints[{e}]"), &mut errors);
            }
        }
        errors.into_result()?;
        if !self.ctx.service_groups.contains(&si.service_group_id) {
            return Err(RegistryError::NotFound(format!(
                "service group '{}'",
                si.service_group_id
            )));
        }
        let key = si.id();
        if self.ctx.redirects.contains(&key) {
            return Err(RegistryError::conflict("documentTypeId", REDIRECT_PRESENT));
        }
        let merged = match self.ctx.service_infos.get(&key) {
            Some(current) => {
                let merged = current.merged_with(si);
                if merged == current {
                    return Ok(Change::Unchanged);
                }
                merged
            }
            None => ServiceInformation::new(si.service_group_id.clone(), si.document_type_id.clone())
                .merged_with(si),
        };
        self.ctx.service_infos.replace(merged)?;
        drop(_gate);

        self.ctx.audit.record_or_log(
            AuditEvent::success(
                actor,
                AuditAction::ServiceInformationMerge,
                si.service_group_id.uri_encoded(),
            )
            .with_details(json!({ "documentTypeId": si.document_type_id.uri_encoded() })),
        );
        Ok(Change::Changed)
    }

    // -- Lookups ------------------------------------------------------------

    /// Service information for (service group, document type).
    pub fn find_service_information(
        &self,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
    ) -> Option<ServiceInformation> {
        self.ctx
            .service_infos
            .get(&service_information_key(service_group, document_type))
    }

    /// Service information containing the exact endpoint, used for
    /// duplicate detection.
    pub fn find_service_information_with_endpoint(
        &self,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
        transport_profile: &str,
    ) -> Option<ServiceInformation> {
        self.find_service_information(service_group, document_type)
            .filter(|si| si.endpoint(process, transport_profile).is_some())
    }

    /// Process below (service group, document type).
    pub fn find_process(
        &self,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
    ) -> Option<Process> {
        self.find_service_information(service_group, document_type)
            .and_then(|si| si.process(process).cloned())
    }

    /// Endpoint below (service group, document type, process).
    pub fn find_endpoint(
        &self,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
        transport_profile: &str,
    ) -> Option<Endpoint> {
        self.find_service_information(service_group, document_type)
            .and_then(|si| si.endpoint(process, transport_profile).cloned())
    }

    /// Resolve an endpoint and everything above it in one call.
    pub fn resolve_endpoint(
        &self,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
        transport_profile: &str,
    ) -> Result<ResolvedEndpoint, RegistryError> {
        let group = self
            .ctx
            .service_groups
            .get(service_group)
            .ok_or_else(|| RegistryError::NotFound(format!("service group '{service_group}'")))?;
        let si = self
            .find_service_information(service_group, document_type)
            .ok_or_else(|| {
                RegistryError::NotFound(format!("document type '{document_type}'"))
            })?;
        let found = si
            .process(process)
            .ok_or_else(|| RegistryError::NotFound(format!("process '{process}'")))?;
        let endpoint = found.endpoint(transport_profile).cloned().ok_or_else(|| {
            RegistryError::NotFound(format!("endpoint '{transport_profile}'"))
        })?;
        let found = found.clone();
        Ok(ResolvedEndpoint {
            service_group: group,
            service_information: si,
            process: found,
            endpoint,
        })
    }

    /// All service information of a service group.
    pub fn get_all_of_service_group(&self, service_group: &ParticipantId) -> Vec<ServiceInformation> {
        self.ctx
            .service_infos
            .values_where(|si| &si.service_group_id == service_group)
    }

    /// Document types with service information in a service group.
    pub fn get_all_document_types_of_service_group(
        &self,
        service_group: &ParticipantId,
    ) -> Vec<DocumentTypeId> {
        self.get_all_of_service_group(service_group)
            .into_iter()
            .map(|si| si.document_type_id)
            .collect()
    }

    /// Whether any endpoint uses `transport_profile`.
    pub fn contains_any_endpoint_with_transport_profile(&self, transport_profile: &str) -> bool {
        self.ctx.service_infos.any(|si| {
            si.endpoints()
                .any(|(_, e)| e.transport_profile == transport_profile)
        })
    }

    /// All service information.
    pub fn get_all(&self) -> Vec<ServiceInformation> {
        self.ctx.service_infos.list()
    }

    /// Number of service information records.
    pub fn count(&self) -> usize {
        self.ctx.service_infos.len()
    }

    // -- Deletes ------------------------------------------------------------

    /// Delete one endpoint. An emptied process is kept.
    pub fn delete_endpoint(
        &self,
        actor: &str,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
        transport_profile: &str,
    ) -> Result<Change, RegistryError> {
        let _gate = self.ctx.service_info_gate.lock();
        let Some(si) = self.find_service_information(service_group, document_type) else {
            return Ok(Change::Unchanged);
        };
        let Some(updated_process) = si
            .process(process)
            .and_then(|p| p.without_endpoint(transport_profile))
        else {
            return Ok(Change::Unchanged);
        };
        self.ctx
            .service_infos
            .replace(si.with_process(updated_process))?;
        drop(_gate);

        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::EndpointDelete, service_group.uri_encoded())
                .with_details(json!({
                    "documentTypeId": document_type.uri_encoded(),
                    "processId": process.uri_encoded(),
                    "transportProfile": transport_profile,
                })),
        );
        Ok(Change::Changed)
    }

    /// Delete a process that has no endpoints left.
    pub fn delete_process(
        &self,
        actor: &str,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
    ) -> Result<Change, RegistryError> {
        let _gate = self.ctx.service_info_gate.lock();
        let Some(si) = self.find_service_information(service_group, document_type) else {
            return Ok(Change::Unchanged);
        };
        let Some(found) = si.process(process) else {
            return Ok(Change::Unchanged);
        };
        if !found.endpoints.is_empty() {
            return Err(RegistryError::conflict(
                "processId",
                "The process still contains endpoints. Delete all endpoints before deleting the process.",
            ));
        }
        let mut updated = si.clone();
        updated.processes.retain(|p| &p.process_id != process);
        self.ctx.service_infos.replace(updated)?;
        drop(_gate);

        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::ProcessDelete, service_group.uri_encoded())
                .with_details(json!({
                    "documentTypeId": document_type.uri_encoded(),
                    "processId": process.uri_encoded(),
                })),
        );
        Ok(Change::Changed)
    }

    /// Delete a service information that has no processes left.
    pub fn delete_service_information(
        &self,
        actor: &str,
        service_group: &ParticipantId,
        document_type: &DocumentTypeId,
    ) -> Result<Change, RegistryError> {
        let _gate = self.ctx.service_info_gate.lock();
        let key = service_information_key(service_group, document_type);
        let Some(si) = self.ctx.service_infos.get(&key) else {
            return Ok(Change::Unchanged);
        };
        if !si.processes.is_empty() {
            return Err(RegistryError::conflict(
                "documentTypeId",
                "The document type still contains processes. Delete all processes before deleting the document type.",
            ));
        }
        self.ctx.service_infos.remove(&key)?;
        drop(_gate);

        self.ctx.audit.record_or_log(
            AuditEvent::success(actor, AuditAction::DocumentTypeDelete, service_group.uri_encoded())
                .with_details(json!({ "documentTypeId": document_type.uri_encoded() })),
        );
        Ok(Change::Changed)
    }

    /// Remove every service information of a service group.
    pub fn delete_all_of_service_group(
        &self,
        service_group: &ParticipantId,
    ) -> Result<usize, RegistryError> {
        let _gate = self.ctx.service_info_gate.lock();
        let removed = self
            .ctx
            .service_infos
            .remove_where(|si| &si.service_group_id == service_group)?;
        Ok(removed.len())
    }

    // -- Bulk rewrites ------------------------------------------------------

    /// Replace `old` by `new` in every endpoint certificate, optionally
    /// restricted to one service group.
    pub fn change_certificate_everywhere(
        &self,
        actor: &str,
        old: &str,
        new: &str,
        scope: Option<&ParticipantId>,
    ) -> Result<BulkChangeReport, RegistryError> {
        let mut errors = FieldErrors::new();
        let old_body = smp_core::normalize_certificate_text(old);
        if old_body.is_empty() {
            errors.add("oldCertificate", "The old certificate must not be empty!");
        }
        let new_cert = if new.trim().is_empty() {
            errors.add("newCertificate", "The new certificate must not be empty!");
            None
        } else {
            match Certificate::parse(new) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    errors.add("newCertificate", format!("The new certificate is invalid: {e}"));
                    None
                }
            }
        };
        if let Some(cert) = &new_cert {
            if cert.as_base64() == old_body {
                errors.add(
                    "newCertificate",
                    "The old and the new certificate must be different!",
                );
            }
        }
        errors.into_result()?;
        let Some(new_cert) = new_cert else {
            return Err(RegistryError::invalid(
                "newCertificate",
                "The new certificate must not be empty!",
            ));
        };

        let (changed, save_errors, groups) = self.rewrite_endpoints(scope, |e| {
            (e.certificate.as_base64() == old_body).then(|| Endpoint {
                certificate: new_cert.clone(),
                ..e.clone()
            })
        });
        let report = report(changed, save_errors, groups, "certificate");
        self.audit_bulk(actor, AuditAction::BulkChangeCertificate, scope, &report);
        Ok(report)
    }

    /// Replace `old` by `new` in every endpoint reference, optionally
    /// restricted to one service group.
    pub fn change_url_everywhere(
        &self,
        actor: &str,
        old: &str,
        new: &str,
        scope: Option<&ParticipantId>,
    ) -> Result<BulkChangeReport, RegistryError> {
        let mut errors = FieldErrors::new();
        let old = old.trim();
        let new = new.trim();
        if old.is_empty() {
            errors.add("oldUrl", "The old URL must not be empty!");
        }
        if new.is_empty() {
            errors.add("newUrl", "The new URL must not be empty!");
        } else if smp_core::validate_url(new).is_err() {
            errors.add("newUrl", "The new URL is not a valid URL!");
        } else if new == old {
            errors.add("newUrl", "The old and the new URL must be different!");
        }
        errors.into_result()?;

        let (changed, save_errors, groups) = self.rewrite_endpoints(scope, |e| {
            (e.endpoint_reference.as_deref() == Some(old)).then(|| Endpoint {
                endpoint_reference: Some(new.to_string()),
                ..e.clone()
            })
        });
        let report = report(changed, save_errors, groups, "URL");
        self.audit_bulk(actor, AuditAction::BulkChangeUrl, scope, &report);
        Ok(report)
    }

    /// Apply `rewrite` to every endpoint in scope and persist once per
    /// changed service information.
    fn rewrite_endpoints(
        &self,
        scope: Option<&ParticipantId>,
        rewrite: impl Fn(&Endpoint) -> Option<Endpoint>,
    ) -> (usize, usize, usize) {
        let _gate = self.ctx.service_info_gate.lock();
        let candidates = self
            .ctx
            .service_infos
            .values_where(|si| scope.map_or(true, |sg| &si.service_group_id == sg));

        let mut changed_endpoints = 0;
        let mut save_errors = 0;
        let mut groups = BTreeSet::new();
        for si in candidates {
            let mut changed_here = 0;
            let mut updated = si.clone();
            for process in &mut updated.processes {
                for endpoint in &mut process.endpoints {
                    if let Some(next) = rewrite(endpoint) {
                        *endpoint = next;
                        changed_here += 1;
                    }
                }
            }
            if changed_here == 0 {
                continue;
            }
            match self.ctx.service_infos.replace(updated) {
                Ok(_) => {
                    changed_endpoints += changed_here;
                    groups.insert(si.service_group_id.clone());
                }
                Err(e) => {
                    save_errors += 1;
                    tracing::error!(
                        participant = %si.service_group_id,
                        doctype = %si.document_type_id,
                        error = %e,
                        "failed to save rewritten service information"
                    );
                }
            }
        }
        (changed_endpoints, save_errors, groups.len())
    }

    fn audit_bulk(
        &self,
        actor: &str,
        action: AuditAction,
        scope: Option<&ParticipantId>,
        report: &BulkChangeReport,
    ) {
        let target = scope.map_or_else(|| "*".to_string(), ParticipantId::uri_encoded);
        let event = if report.save_errors == 0 {
            AuditEvent::success(actor, action, target)
        } else {
            AuditEvent::failure(actor, action, target)
        };
        self.ctx.audit.record_or_log(event.with_details(json!({
            "changedEndpoints": report.changed_endpoints,
            "saveErrors": report.save_errors,
            "serviceGroups": report.service_groups,
        })));
        tracing::info!(
            %action,
            changed = report.changed_endpoints,
            save_errors = report.save_errors,
            "bulk change finished"
        );
    }
}

fn report(
    changed_endpoints: usize,
    save_errors: usize,
    service_groups: usize,
    subject: &str,
) -> BulkChangeReport {
    let mut message = if changed_endpoints == 0 && save_errors == 0 {
        format!("No endpoint was found that contains the old {subject}")
    } else {
        format!(
            "The old {subject} was changed in {changed_endpoints} endpoints of {service_groups} service groups to the new {subject}."
        )
    };
    if save_errors > 0 {
        message.push_str(&format!(
            " {save_errors} service information records could not be saved."
        ));
    }
    BulkChangeReport {
        changed_endpoints,
        save_errors,
        service_groups,
        message,
    }
}
