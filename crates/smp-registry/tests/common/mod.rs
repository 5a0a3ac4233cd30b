//! Fakes shared by the registry integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use smp_core::{IdentifierPolicy, ParticipantId, SmpAddresses};
use smp_registry::hooks::{DirectoryPublisher, HookError, RegistrationHook, SmlRegistrar};
use smp_registry::service_group::ServiceGroupInput;
use smp_registry::service_info::EndpointInput;
use smp_registry::settings::SmpSettings;
use smp_registry::sml_info::{SmlInfo, PEPPOL_SMK_ID};
use smp_registry::transport_profile::PEPPOL_AS4_V2;
use smp_registry::RegistryContext;

pub const OLD_PEM: &str = include_str!("../../testdata/smp-old.pem");
pub const NEW_PEM: &str = include_str!("../../testdata/smp-new.pem");

pub const ACTOR: &str = "admin";

/// Records every remote call; fails the operations named in `failing`.
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub calls: Mutex<Vec<String>>,
    pub failing: Mutex<Vec<&'static str>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().push(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn call(&self, operation: &'static str, target: String) -> Result<(), HookError> {
        self.calls.lock().push(format!("{operation} {target}"));
        if self.failing.lock().contains(&operation) {
            return Err(HookError::new("UnauthorizedFault", format!("{operation} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationHook for FakeRemote {
    async fn create_participant(&self, p: &ParticipantId, _: &SmlInfo) -> Result<(), HookError> {
        self.call("create_participant", p.uri_encoded())
    }

    async fn undo_create_participant(
        &self,
        p: &ParticipantId,
        _: &SmlInfo,
    ) -> Result<(), HookError> {
        self.call("undo_create_participant", p.uri_encoded())
    }

    async fn delete_participant(&self, p: &ParticipantId, _: &SmlInfo) -> Result<(), HookError> {
        self.call("delete_participant", p.uri_encoded())
    }

    async fn undo_delete_participant(
        &self,
        p: &ParticipantId,
        _: &SmlInfo,
    ) -> Result<(), HookError> {
        self.call("undo_delete_participant", p.uri_encoded())
    }

    async fn prepare_to_migrate(
        &self,
        p: &ParticipantId,
        _: &str,
        _: &SmlInfo,
    ) -> Result<(), HookError> {
        self.call("prepare_to_migrate", p.uri_encoded())
    }

    async fn migrate(&self, p: &ParticipantId, _: &str, _: &SmlInfo) -> Result<(), HookError> {
        self.call("migrate", p.uri_encoded())
    }
}

#[async_trait]
impl DirectoryPublisher for FakeRemote {
    async fn add_service_group_to_index(&self, p: &ParticipantId) -> Result<(), HookError> {
        self.call("add_to_index", p.uri_encoded())
    }

    async fn delete_service_group_from_index(&self, p: &ParticipantId) -> Result<(), HookError> {
        self.call("delete_from_index", p.uri_encoded())
    }
}

#[async_trait]
impl SmlRegistrar for FakeRemote {
    async fn create_smp(&self, _: &SmlInfo, id: &str, _: &SmpAddresses) -> Result<(), HookError> {
        self.call("create_smp", id.to_string())
    }

    async fn update_smp(&self, _: &SmlInfo, id: &str, _: &SmpAddresses) -> Result<(), HookError> {
        self.call("update_smp", id.to_string())
    }

    async fn delete_smp(&self, _: &SmlInfo, id: &str) -> Result<(), HookError> {
        self.call("delete_smp", id.to_string())
    }
}

/// In-memory context whose remote calls all go to `remote`.
pub fn context_with(remote: &Arc<FakeRemote>) -> RegistryContext {
    RegistryContext::builder()
        .registration_hook(remote.clone())
        .directory_publisher(remote.clone())
        .sml_registrar(remote.clone())
        .build_in_memory()
}

pub fn activate_sml(ctx: &RegistryContext) {
    ctx.settings()
        .update(
            ACTOR,
            SmpSettings {
                sml_active: true,
                sml_info_id: Some(PEPPOL_SMK_ID.to_string()),
                ..ctx.settings().get()
            },
        )
        .unwrap();
}

pub fn participant(uri: &str) -> ParticipantId {
    IdentifierPolicy::peppol().parse_participant(uri).unwrap()
}

pub fn group_input(participant: &str, owner: &str) -> ServiceGroupInput {
    ServiceGroupInput {
        participant_id: participant.to_string(),
        owner_id: owner.to_string(),
        extension: None,
    }
}

pub fn endpoint_input(participant: &str, doc: &str, process: &str) -> EndpointInput {
    EndpointInput {
        service_group_id: participant.to_string(),
        document_type_id: doc.to_string(),
        process_id: process.to_string(),
        transport_profile: PEPPOL_AS4_V2.to_string(),
        endpoint_reference: Some("https://ap.example.org/as4".to_string()),
        certificate: OLD_PEM.to_string(),
        service_description: "Access point".to_string(),
        technical_contact_url: "mailto:ops@example.org".to_string(),
        ..EndpointInput::default()
    }
}
