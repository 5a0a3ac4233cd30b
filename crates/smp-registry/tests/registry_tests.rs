//! Cross-aggregate behaviour of the registry: uniqueness, redirect and
//! endpoint exclusion, cascades, bulk rewrites and remote-sync policies.

mod common;

use std::sync::Arc;

use common::*;
use smp_core::{Certificate, IdentifierPolicy};
use smp_registry::business_card::{BusinessCardEntityInput, BusinessCardInput};
use smp_registry::error::StoreError;
use smp_registry::outcome::SaveMode;
use smp_registry::redirect::RedirectInput;
use smp_registry::service_info::{ServiceInformation, DUPLICATE_ENDPOINT, REDIRECT_PRESENT};
use smp_registry::sml_registration::SmlRegistration;
use smp_registry::store::{MemoryBackend, Storage, StoreBackend};
use smp_registry::transport_profile::TransportProfile;
use smp_registry::{Change, RegistryContext, RegistryError};

const SG: &str = "iso6523-actorid-upis::9915:test";
const DOC: &str = "busdox-docid-qns::urn:doctype::invoice";
const PROCESS: &str = "cenbii-procid-ubl::urn:process::1";

fn redirect_input(doc: &str) -> RedirectInput {
    RedirectInput {
        service_group_id: SG.to_string(),
        document_type_id: doc.to_string(),
        target_href: "https://other-smp.example.org".to_string(),
        subject_unique_identifier: "CN=OTHER SMP".to_string(),
        ..RedirectInput::default()
    }
}

fn card_input() -> BusinessCardInput {
    BusinessCardInput {
        service_group_id: SG.to_string(),
        entities: vec![BusinessCardEntityInput {
            name: "Test Company".to_string(),
            country_code: "AT".to_string(),
            ..BusinessCardEntityInput::default()
        }],
    }
}

async fn context_with_group() -> (RegistryContext, Arc<FakeRemote>) {
    let remote = FakeRemote::new();
    let ctx = context_with(&remote);
    ctx.service_groups()
        .create(ACTOR, &group_input(SG, "alice"))
        .await
        .unwrap();
    (ctx, remote)
}

// ---------------------------------------------------------------------------
// Service groups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn participant_uniqueness_ignores_case() {
    let (ctx, _) = context_with_group().await;
    let err = ctx
        .service_groups()
        .create(ACTOR, &group_input("ISO6523-ACTORID-UPIS::9915:TEST", "bob"))
        .await
        .unwrap_err();
    match err {
        RegistryError::Conflict { field, .. } => assert_eq!(field.as_deref(), Some("participantId")),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(ctx.service_groups().count(), 1);
}

#[tokio::test]
async fn invalid_service_group_input_reports_every_field() {
    let ctx = RegistryContext::builder().build_in_memory();
    let err = ctx
        .service_groups()
        .create(
            ACTOR,
            &smp_registry::service_group::ServiceGroupInput {
                participant_id: "no-scheme".to_string(),
                owner_id: " ".to_string(),
                extension: Some("<unclosed>".to_string()),
            },
        )
        .await
        .unwrap_err();
    let errors = err.field_errors().unwrap();
    assert!(errors.has_field("participantId"));
    assert!(errors.has_field("ownerId"));
    assert!(errors.has_field("extension"));
}

#[tokio::test]
async fn update_only_changes_owner_and_extension() {
    let (ctx, _) = context_with_group().await;
    let pid = participant(SG);
    let groups = ctx.service_groups();
    assert_eq!(groups.update(ACTOR, &pid, "alice", None).unwrap(), Change::Unchanged);
    assert_eq!(
        groups
            .update(ACTOR, &pid, "bob", Some("<ext xmlns=\"urn:x\">1</ext>"))
            .unwrap(),
        Change::Changed
    );
    let stored = groups.get(&pid).unwrap();
    assert_eq!(stored.owner_id, "bob");
    assert!(stored.extension.is_some());
    assert_eq!(stored.participant_id, pid);
}

#[tokio::test]
async fn delete_cascades_to_all_children() {
    let (ctx, _) = context_with_group().await;
    let policy = IdentifierPolicy::peppol();
    let pid = participant(SG);
    let doc = policy.parse_document_type(DOC).unwrap();
    let process = policy.parse_process(PROCESS).unwrap();

    ctx.service_information()
        .save_endpoint(ACTOR, &endpoint_input(SG, DOC, PROCESS), SaveMode::Create)
        .unwrap();
    ctx.redirects()
        .create_or_update(ACTOR, &redirect_input("busdox-docid-qns::urn:doctype::order"), SaveMode::Create)
        .unwrap();
    ctx.business_cards()
        .create_or_update(ACTOR, &card_input(), SaveMode::Create)
        .await
        .unwrap();

    let outcome = ctx.service_groups().delete(ACTOR, &pid).await.unwrap();
    assert_eq!(outcome.value, Change::Changed);
    assert!(!outcome.has_warnings());

    assert!(ctx
        .service_information()
        .find_service_information_with_endpoint(&pid, &doc, &process, "peppol-transport-as4-v2_0")
        .is_none());
    assert!(ctx.service_information().get_all_of_service_group(&pid).is_empty());
    assert!(ctx.redirects().get_all_of_service_group(&pid).is_empty());
    assert!(ctx.business_cards().get(&pid).is_none());
    assert!(!ctx.service_groups().contains(&pid));

    let again = ctx.service_groups().delete(ACTOR, &pid).await.unwrap();
    assert_eq!(again.value, Change::Unchanged);
}

// ---------------------------------------------------------------------------
// SML participant sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_registers_at_sml_when_active() {
    let remote = FakeRemote::new();
    let ctx = context_with(&remote);
    activate_sml(&ctx);
    ctx.service_groups()
        .create(ACTOR, &group_input(SG, "alice"))
        .await
        .unwrap();
    assert_eq!(remote.calls(), vec![format!("create_participant {SG}")]);
}

#[tokio::test]
async fn sml_failure_on_create_stores_nothing() {
    let remote = FakeRemote::new();
    remote.fail("create_participant");
    let ctx = context_with(&remote);
    activate_sml(&ctx);

    let err = ctx
        .service_groups()
        .create(ACTOR, &group_input(SG, "alice"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::RemoteSync { operation: "create_participant", .. }
    ));
    assert_eq!(ctx.service_groups().count(), 0);

    let failures: Vec<_> = ctx
        .audit()
        .entries()
        .into_iter()
        .filter(|e| e.action.as_str() == "sml-participant-create")
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].details["errorKind"], "UnauthorizedFault");
}

#[tokio::test]
async fn sml_failure_on_delete_is_a_warning() {
    let remote = FakeRemote::new();
    let ctx = context_with(&remote);
    activate_sml(&ctx);
    ctx.service_groups()
        .create(ACTOR, &group_input(SG, "alice"))
        .await
        .unwrap();
    remote.fail("delete_participant");

    let outcome = ctx
        .service_groups()
        .delete(ACTOR, &participant(SG))
        .await
        .unwrap();
    assert_eq!(outcome.value, Change::Changed);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(ctx.service_groups().count(), 0);
}

/// Storage whose service group collection cannot be written.
struct BrokenServiceGroups;

struct RefusingBackend;

impl StoreBackend for RefusingBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    fn persist(&self, _: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Persistence {
            collection: "service-groups",
            reason: "disk full".to_string(),
        })
    }
}

impl Storage for BrokenServiceGroups {
    fn backend(&self, collection: &'static str) -> Result<Arc<dyn StoreBackend>, StoreError> {
        if collection == "service-groups" {
            Ok(Arc::new(RefusingBackend))
        } else {
            Ok(Arc::new(MemoryBackend))
        }
    }
}

#[tokio::test]
async fn persistence_failure_after_sml_create_is_undone() {
    let remote = FakeRemote::new();
    let ctx = RegistryContext::builder()
        .registration_hook(remote.clone())
        .build(&BrokenServiceGroups)
        .unwrap();
    activate_sml(&ctx);

    let err = ctx
        .service_groups()
        .create(ACTOR, &group_input(SG, "alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Store(_)));
    assert_eq!(
        remote.calls(),
        vec![
            format!("create_participant {SG}"),
            format!("undo_create_participant {SG}"),
        ]
    );
    assert!(!ctx.service_groups().contains(&participant(SG)));
}

// ---------------------------------------------------------------------------
// Endpoints and redirects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn example_scenario_find_then_delete() {
    let ctx = RegistryContext::builder()
        .policy(IdentifierPolicy::lenient())
        .build_in_memory();
    ctx.service_groups()
        .create(ACTOR, &group_input(SG, "alice"))
        .await
        .unwrap();
    ctx.transport_profiles()
        .create(
            ACTOR,
            TransportProfile {
                id: "AS2".to_string(),
                name: "AS2".to_string(),
                deprecated: false,
            },
        )
        .unwrap();
    let policy = IdentifierPolicy::lenient();
    let pid = policy.parse_participant(SG).unwrap();
    let doc = policy.parse_document_type("urn:doctype::invoice").unwrap();
    let process = policy.parse_process("urn:process::1").unwrap();

    let mut input = endpoint_input(SG, "urn:doctype::invoice", "urn:process::1");
    input.transport_profile = "AS2".to_string();
    ctx.service_information()
        .save_endpoint(ACTOR, &input, SaveMode::Create)
        .unwrap();

    let found = ctx
        .service_information()
        .find_service_information_with_endpoint(&pid, &doc, &process, "AS2")
        .unwrap();
    assert_eq!(found.endpoint_count(), 1);

    ctx.service_groups().delete(ACTOR, &pid).await.unwrap();
    assert!(ctx
        .service_information()
        .find_service_information_with_endpoint(&pid, &doc, &process, "AS2")
        .is_none());
}

#[tokio::test]
async fn duplicate_endpoint_is_a_conflict_in_create_mode_only() {
    let (ctx, _) = context_with_group().await;
    let si = ctx.service_information();
    let input = endpoint_input(SG, DOC, PROCESS);
    si.save_endpoint(ACTOR, &input, SaveMode::Create).unwrap();

    match si.save_endpoint(ACTOR, &input, SaveMode::Create).unwrap_err() {
        RegistryError::Conflict { message, .. } => assert_eq!(message, DUPLICATE_ENDPOINT),
        other => panic!("expected conflict, got {other:?}"),
    }

    let mut edited = input.clone();
    edited.service_description = "Edited".to_string();
    let resolved = si.save_endpoint(ACTOR, &edited, SaveMode::Edit).unwrap();
    assert_eq!(resolved.endpoint.service_description, "Edited");
    assert_eq!(resolved.service_information.endpoint_count(), 1);
}

#[tokio::test]
async fn edit_of_missing_endpoint_is_not_found() {
    let (ctx, _) = context_with_group().await;
    let err = ctx
        .service_information()
        .save_endpoint(ACTOR, &endpoint_input(SG, DOC, PROCESS), SaveMode::Edit)
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn inverted_validity_window_names_activation_date() {
    let (ctx, _) = context_with_group().await;
    let mut input = endpoint_input(SG, DOC, PROCESS);
    input.activation_date = Some("2030-01-01T00:00:00Z".parse().unwrap());
    input.expiration_date = Some("2029-01-01T00:00:00Z".parse().unwrap());
    let err = ctx
        .service_information()
        .save_endpoint(ACTOR, &input, SaveMode::Create)
        .unwrap_err();
    let errors = err.field_errors().unwrap();
    assert!(errors.has_field("activationDate"));
    assert_eq!(ctx.service_information().count(), 0);
}

#[tokio::test]
async fn endpoint_validation_collects_all_fields() {
    let (ctx, _) = context_with_group().await;
    let input = smp_registry::service_info::EndpointInput {
        service_group_id: SG.to_string(),
        document_type_id: DOC.to_string(),
        process_id: PROCESS.to_string(),
        transport_profile: "unknown-profile".to_string(),
        endpoint_reference: Some("not a url".to_string()),
        certificate: "garbage".to_string(),
        ..Default::default()
    };
    let err = ctx
        .service_information()
        .save_endpoint(ACTOR, &input, SaveMode::Create)
        .unwrap_err();
    let errors = err.field_errors().unwrap();
    for field in [
        "transportProfile",
        "endpointReference",
        "certificate",
        "serviceDescription",
        "technicalContactUrl",
    ] {
        assert!(errors.has_field(field), "missing error for {field}");
    }
}

#[tokio::test]
async fn redirect_and_service_information_exclude_each_other() {
    let (ctx, _) = context_with_group().await;
    ctx.service_information()
        .save_endpoint(ACTOR, &endpoint_input(SG, DOC, PROCESS), SaveMode::Create)
        .unwrap();

    match ctx
        .redirects()
        .create_or_update(ACTOR, &redirect_input(DOC), SaveMode::Create)
        .unwrap_err()
    {
        RegistryError::Conflict { field, .. } => {
            assert_eq!(field.as_deref(), Some("documentTypeId"))
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let order = "busdox-docid-qns::urn:doctype::order";
    ctx.redirects()
        .create_or_update(ACTOR, &redirect_input(order), SaveMode::Create)
        .unwrap();
    match ctx
        .service_information()
        .save_endpoint(ACTOR, &endpoint_input(SG, order, PROCESS), SaveMode::Create)
        .unwrap_err()
    {
        RegistryError::Conflict { message, .. } => assert_eq!(message, REDIRECT_PRESENT),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn merge_twice_keeps_one_process_and_endpoint() {
    let (ctx, _) = context_with_group().await;
    let resolved = ctx
        .service_information()
        .save_endpoint(ACTOR, &endpoint_input(SG, DOC, PROCESS), SaveMode::Create)
        .unwrap();
    let si: ServiceInformation = resolved.service_information;

    assert_eq!(ctx.service_information().merge(ACTOR, &si).unwrap(), Change::Unchanged);
    assert_eq!(ctx.service_information().merge(ACTOR, &si).unwrap(), Change::Unchanged);
    let stored = ctx
        .service_information()
        .find_service_information(&si.service_group_id, &si.document_type_id)
        .unwrap();
    assert_eq!(stored.processes.len(), 1);
    assert_eq!(stored.endpoint_count(), 1);
}

#[tokio::test]
async fn merge_rejects_invalid_endpoints_without_storing() {
    let (ctx, _) = context_with_group().await;
    let resolved = ctx
        .service_information()
        .save_endpoint(ACTOR, &endpoint_input(SG, DOC, PROCESS), SaveMode::Create)
        .unwrap();
    let mut si = resolved.service_information;
    si.document_type_id = IdentifierPolicy::peppol()
        .parse_document_type("busdox-docid-qns::urn:doctype::other")
        .unwrap();
    let now = chrono::Utc::now();
    {
        let endpoint = &mut si.processes[0].endpoints[0];
        endpoint.transport_profile = "no-such-profile".to_string();
        endpoint.activation_date = Some(now);
        endpoint.expiration_date = Some(now - chrono::Duration::days(30));
        endpoint.technical_information_url = Some("not a url".to_string());
    }

    let err = ctx.service_information().merge(ACTOR, &si).unwrap_err();
    let errors = err.field_errors().expect("field errors");
    for field in [
        "processes[0].endpoints[0].transportProfile",
        "processes[0].endpoints[0].activationDate",
        "processes[0].endpoints[0].technicalInformationUrl",
    ] {
        assert!(errors.has_field(field), "missing error for {field}");
    }
    assert!(ctx
        .service_information()
        .find_service_information(&si.service_group_id, &si.document_type_id)
        .is_none());
    assert!(!ctx
        .service_information()
        .contains_any_endpoint_with_transport_profile("no-such-profile"));
    assert_eq!(ctx.service_information().count(), 1);
}

#[tokio::test]
async fn fresh_service_information_merges_once_onto_empty_document_type() {
    let (ctx, _) = context_with_group().await;
    let template = ctx
        .service_information()
        .save_endpoint(ACTOR, &endpoint_input(SG, DOC, PROCESS), SaveMode::Create)
        .unwrap()
        .service_information;
    let order = IdentifierPolicy::peppol()
        .parse_document_type("busdox-docid-qns::urn:doctype::order")
        .unwrap();
    let si = ServiceInformation {
        document_type_id: order.clone(),
        ..template
    };

    let registry = ctx.service_information();
    assert_eq!(registry.merge(ACTOR, &si).unwrap(), Change::Changed);
    assert_eq!(registry.merge(ACTOR, &si).unwrap(), Change::Unchanged);
    let stored = registry
        .find_service_information(&si.service_group_id, &order)
        .unwrap();
    assert_eq!(stored.processes.len(), 1);
    assert_eq!(stored.endpoint_count(), 1);
    assert_eq!(stored, si);
}

#[tokio::test]
async fn transport_profile_in_use_cannot_be_deleted() {
    let (ctx, _) = context_with_group().await;
    let mut input = endpoint_input(SG, DOC, PROCESS);
    input.transport_profile = "custom".to_string();
    ctx.transport_profiles()
        .create(
            ACTOR,
            TransportProfile {
                id: "custom".to_string(),
                name: "Custom".to_string(),
                deprecated: false,
            },
        )
        .unwrap();
    ctx.service_information()
        .save_endpoint(ACTOR, &input, SaveMode::Create)
        .unwrap();

    assert!(matches!(
        ctx.transport_profiles().delete(ACTOR, "custom"),
        Err(RegistryError::Conflict { .. })
    ));
    assert!(ctx.transport_profiles().contains("custom"));
}

#[tokio::test]
async fn transport_profile_delete_never_orphans_concurrent_endpoints() {
    let (ctx, _) = context_with_group().await;
    ctx.transport_profiles()
        .create(
            ACTOR,
            TransportProfile {
                id: "custom".to_string(),
                name: "Custom".to_string(),
                deprecated: false,
            },
        )
        .unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..50 {
                let process = format!("cenbii-procid-ubl::urn:process::{i}");
                let mut input = endpoint_input(SG, DOC, &process);
                input.transport_profile = "custom".to_string();
                let _ = ctx
                    .service_information()
                    .save_endpoint(ACTOR, &input, SaveMode::Create);
            }
        });
        scope.spawn(|| {
            for _ in 0..50 {
                if let Ok(Change::Changed) = ctx.transport_profiles().delete(ACTOR, "custom") {
                    break;
                }
            }
        });
    });

    let in_use = ctx
        .service_information()
        .contains_any_endpoint_with_transport_profile("custom");
    assert!(!in_use || ctx.transport_profiles().contains("custom"));
}

#[tokio::test]
async fn emptied_process_is_kept_until_deleted_explicitly() {
    let (ctx, _) = context_with_group().await;
    let policy = IdentifierPolicy::peppol();
    let pid = participant(SG);
    let doc = policy.parse_document_type(DOC).unwrap();
    let process = policy.parse_process(PROCESS).unwrap();
    let si = ctx.service_information();
    si.save_endpoint(ACTOR, &endpoint_input(SG, DOC, PROCESS), SaveMode::Create)
        .unwrap();

    assert!(matches!(
        si.delete_process(ACTOR, &pid, &doc, &process),
        Err(RegistryError::Conflict { .. })
    ));
    assert_eq!(
        si.delete_endpoint(ACTOR, &pid, &doc, &process, "peppol-transport-as4-v2_0")
            .unwrap(),
        Change::Changed
    );
    assert!(si.find_process(&pid, &doc, &process).is_some());
    assert!(matches!(
        si.delete_service_information(ACTOR, &pid, &doc),
        Err(RegistryError::Conflict { .. })
    ));
    assert_eq!(si.delete_process(ACTOR, &pid, &doc, &process).unwrap(), Change::Changed);
    assert_eq!(si.delete_service_information(ACTOR, &pid, &doc).unwrap(), Change::Changed);
    assert_eq!(si.count(), 0);
}

// ---------------------------------------------------------------------------
// Bulk rewrites
// ---------------------------------------------------------------------------

#[tokio::test]
async fn certificate_rewrite_reports_every_endpoint() {
    let remote = FakeRemote::new();
    let ctx = context_with(&remote);
    let groups = ["iso6523-actorid-upis::9915:a", "iso6523-actorid-upis::9915:b"];
    for sg in groups {
        ctx.service_groups().create(ACTOR, &group_input(sg, "alice")).await.unwrap();
        for doc in [DOC, "busdox-docid-qns::urn:doctype::order"] {
            ctx.service_information()
                .save_endpoint(ACTOR, &endpoint_input(sg, doc, PROCESS), SaveMode::Create)
                .unwrap();
        }
    }

    let report = ctx
        .service_information()
        .change_certificate_everywhere(ACTOR, OLD_PEM, NEW_PEM, None)
        .unwrap();
    assert_eq!(report.changed_endpoints, 4);
    assert_eq!(report.save_errors, 0);
    assert_eq!(report.service_groups, 2);

    let old = Certificate::parse(OLD_PEM).unwrap();
    let new = Certificate::parse(NEW_PEM).unwrap();
    let all: Vec<_> = ctx
        .service_information()
        .get_all()
        .into_iter()
        .flat_map(|si| si.processes)
        .flat_map(|p| p.endpoints)
        .collect();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|e| e.certificate == new && e.certificate != old));

    let again = ctx
        .service_information()
        .change_certificate_everywhere(ACTOR, OLD_PEM, NEW_PEM, None)
        .unwrap();
    assert_eq!(again.changed_endpoints, 0);
    assert_eq!(again.message, "No endpoint was found that contains the old certificate");
}

#[tokio::test]
async fn url_rewrite_respects_scope() {
    let remote = FakeRemote::new();
    let ctx = context_with(&remote);
    let a = "iso6523-actorid-upis::9915:a";
    let b = "iso6523-actorid-upis::9915:b";
    for sg in [a, b] {
        ctx.service_groups().create(ACTOR, &group_input(sg, "alice")).await.unwrap();
        ctx.service_information()
            .save_endpoint(ACTOR, &endpoint_input(sg, DOC, PROCESS), SaveMode::Create)
            .unwrap();
    }

    let report = ctx
        .service_information()
        .change_url_everywhere(
            ACTOR,
            "https://ap.example.org/as4",
            "https://new-ap.example.org/as4",
            Some(&participant(a)),
        )
        .unwrap();
    assert_eq!(report.changed_endpoints, 1);

    let untouched = ctx.service_information().get_all_of_service_group(&participant(b));
    assert_eq!(
        untouched[0].processes[0].endpoints[0].endpoint_reference.as_deref(),
        Some("https://ap.example.org/as4")
    );
}

#[tokio::test]
async fn identical_rewrite_pair_is_rejected() {
    let ctx = RegistryContext::builder().build_in_memory();
    let err = ctx
        .service_information()
        .change_url_everywhere(ACTOR, "https://a.example.org", "https://a.example.org", None)
        .unwrap_err();
    assert!(err.field_errors().unwrap().has_field("newUrl"));
}

// ---------------------------------------------------------------------------
// Business cards and the Directory
// ---------------------------------------------------------------------------

#[tokio::test]
async fn directory_push_failure_keeps_the_card() {
    let (ctx, remote) = context_with_group().await;
    remote.fail("add_to_index");
    let outcome = ctx
        .business_cards()
        .create_or_update(ACTOR, &card_input(), SaveMode::Create)
        .await
        .unwrap();
    assert!(outcome.has_warnings());
    assert!(ctx.business_cards().get(&participant(SG)).is_some());
}

#[tokio::test]
async fn second_card_for_group_is_a_conflict() {
    let (ctx, _) = context_with_group().await;
    let cards = ctx.business_cards();
    cards.create_or_update(ACTOR, &card_input(), SaveMode::Create).await.unwrap();
    let err = cards
        .create_or_update(ACTOR, &card_input(), SaveMode::Create)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Conflict { .. }));
    cards.create_or_update(ACTOR, &card_input(), SaveMode::Edit).await.unwrap();
    assert_eq!(cards.count(), 1);
}

#[tokio::test]
async fn publish_reports_remote_failure() {
    let (ctx, remote) = context_with_group().await;
    ctx.business_cards()
        .create_or_update(ACTOR, &card_input(), SaveMode::Create)
        .await
        .unwrap();
    remote.fail("add_to_index");
    let err = ctx
        .business_cards()
        .publish_to_index(ACTOR, &participant(SG))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::RemoteSync { operation: "add_service_group_to_index", .. }
    ));
}

#[tokio::test]
async fn group_delete_retracts_card_from_directory() {
    let (ctx, remote) = context_with_group().await;
    ctx.business_cards()
        .create_or_update(ACTOR, &card_input(), SaveMode::Create)
        .await
        .unwrap();
    ctx.service_groups().delete(ACTOR, &participant(SG)).await.unwrap();
    assert!(remote
        .calls()
        .contains(&format!("delete_from_index {SG}")));
}

// ---------------------------------------------------------------------------
// SMP registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn smp_registration_state_machine() {
    let remote = FakeRemote::new();
    let ctx = context_with(&remote);
    activate_sml(&ctx);
    let registration = ctx.sml_registration();

    assert!(matches!(
        registration.update(ACTOR, "10.0.0.1", "http://smp.example.org").await,
        Err(RegistryError::InvalidState(_))
    ));

    let state = registration
        .register(ACTOR, "SMP-1", "10.0.0.1", "http://smp.example.org", None)
        .await
        .unwrap();
    assert!(state.is_registered());
    assert!(matches!(
        registration
            .register(ACTOR, "SMP-1", "10.0.0.1", "http://smp.example.org", None)
            .await,
        Err(RegistryError::InvalidState(_))
    ));

    let updated = registration
        .update(ACTOR, "10.0.0.2", "http://smp.example.org/")
        .await
        .unwrap();
    match updated {
        SmlRegistration::Registered { physical_address, .. } => {
            assert_eq!(physical_address, "10.0.0.2")
        }
        SmlRegistration::NotRegistered => panic!("expected registered state"),
    }

    assert_eq!(
        registration.unregister(ACTOR).await.unwrap(),
        SmlRegistration::NotRegistered
    );
    assert_eq!(
        remote.calls(),
        vec!["create_smp SMP-1", "update_smp SMP-1", "delete_smp SMP-1"]
    );
}

#[tokio::test]
async fn addresses_are_validated_before_any_remote_call() {
    let remote = FakeRemote::new();
    let ctx = context_with(&remote);
    activate_sml(&ctx);
    let err = ctx
        .sml_registration()
        .register(ACTOR, "SMP-1", "300.1.1.1", "https://smp.example.org:8443/path", None)
        .await
        .unwrap_err();
    let errors = err.field_errors().unwrap();
    assert!(errors.has_field("physicalAddress"));
    assert!(errors.has_field("logicalAddress"));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn failed_smp_registration_keeps_state_and_is_audited() {
    let remote = FakeRemote::new();
    remote.fail("create_smp");
    let ctx = context_with(&remote);
    activate_sml(&ctx);
    let err = ctx
        .sml_registration()
        .register(ACTOR, "SMP-1", "10.0.0.1", "http://smp.example.org", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::RemoteSync { .. }));
    assert!(!ctx.sml_registration().state().is_registered());

    let entries = ctx.audit().entries_for_target("SMP-1");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].details["physicalAddress"], "10.0.0.1");
    assert!(entries[0].details["smlUrl"]
        .as_str()
        .unwrap()
        .ends_with("/manageservicemetadata"));
    assert!(ctx.audit().verify_chain().valid);
}
