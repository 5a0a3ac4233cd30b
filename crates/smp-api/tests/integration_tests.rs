//! # Integration Tests for smp-api
//!
//! Drives the assembled router with `oneshot`: authentication and roles,
//! the write guard, service group / endpoint / redirect lifecycles, error
//! bodies, import and export, the audit trail, and the SML and Directory
//! round trips against wiremock servers.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use smp_api::config::AppConfig;
use smp_api::state::AppState;
use smp_client::{DnsChecker, Resolver, SmlClient, SmlClientConfig};
use smp_core::IdentifierPolicy;
use smp_registry::sml_info::{SmlInfo, PEPPOL_SMK_ID};

const SG: &str = "iso6523-actorid-upis::9915:test";
const DOC: &str = "busdox-docid-qns::urn:doctype::invoice";
const PROCESS: &str = "cenbii-procid-ubl::urn:process::1";
const AS4: &str = "peppol-transport-as4-v2_0";
const CERT: &str = include_str!("../../smp-client/testdata/smp-old.pem");
const TOKEN: &str = "s3cret";

/// Helper: build the test app with auth disabled.
fn test_app() -> Router {
    smp_api::app(AppState::new())
}

/// Helper: build the test app with auth enabled.
fn test_app_with_auth() -> Router {
    smp_api::app(AppState::in_memory(AppConfig::local_mock(TOKEN), None))
}

/// Helper: build the test app with an SML client for `SMP-TEST`.
fn test_app_with_sml() -> Router {
    let client = SmlClient::new(&SmlClientConfig::local_mock("SMP-TEST")).unwrap();
    smp_api::app(AppState::in_memory(AppConfig::default(), Some(client)))
}

/// Helper: read response body as string.
async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Helper: send a request and decode the JSON response (`Null` when empty).
async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let text = body_string(response).await;
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, value)
}

fn endpoint_body() -> Value {
    json!({
        "serviceGroupId": SG,
        "documentTypeId": DOC,
        "processId": PROCESS,
        "transportProfile": AS4,
        "endpointReference": "https://ap.example.org/as4",
        "certificate": CERT,
        "serviceDescription": "Access point",
        "technicalContactUrl": "mailto:ops@example.org",
    })
}

async fn create_group(app: &Router) {
    let (status, body) = call(
        app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": SG })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn health_probes_need_no_token() {
    let app = test_app_with_auth();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/liveness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");

    let (status, _) = call(&app, "GET", "/health/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

// -- Authentication -------------------------------------------------------------

#[tokio::test]
async fn api_requires_a_valid_token() {
    let app = test_app_with_auth();
    let (status, body) = call(&app, "GET", "/v1/service-groups", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = call(&app, "GET", "/v1/service-groups", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, "GET", "/v1/service-groups", None, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn viewers_cannot_write() {
    let app = test_app_with_auth();
    let (status, body) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": SG })),
        Some("viewer:vera:s3cret"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn owners_only_touch_their_own_groups() {
    let app = test_app_with_auth();
    let alice = Some("owner:alice:s3cret");
    let bob = Some("owner:bob:s3cret");

    let (status, body) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": SG })),
        alice,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ownerId"], "alice");

    let (status, _) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": "iso6523-actorid-upis::9915:other", "ownerId": "alice" })),
        bob,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/v1/service-groups/{SG}");
    let (status, _) = call(&app, "DELETE", &uri, None, bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut endpoint = endpoint_body();
    endpoint["serviceGroupId"] = json!(SG);
    let (status, _) = call(&app, "POST", "/v1/endpoints", Some(endpoint), bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        "PUT",
        &uri,
        Some(json!({ "ownerId": "bob" })),
        alice,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "owners cannot transfer groups");

    let (status, body) = call(&app, "DELETE", &uri, None, alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
}

#[tokio::test]
async fn settings_and_import_are_administrator_only() {
    let app = test_app_with_auth();
    let owner = Some("owner:alice:s3cret");
    let (status, _) = call(&app, "PUT", "/v1/settings", Some(json!({})), owner).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "GET", "/v1/audit", None, owner).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "DELETE", "/v1/transport-profiles/x", None, owner).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// -- Service groups ---------------------------------------------------------------

#[tokio::test]
async fn service_group_lifecycle() {
    let app = test_app();
    create_group(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": "iso6523-actorid-upis::9915:TEST" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["details"]["field"], "participantId");

    let uri = format!("/v1/service-groups/{SG}");
    let (status, body) = call(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ownerId"], "admin");

    let (status, body) = call(
        &app,
        "PUT",
        &uri,
        Some(json!({ "ownerId": "carol", "extension": "<ext/>" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (_, body) = call(&app, "GET", "/v1/service-groups?owner=carol", None, None).await;
    assert_eq!(body["count"], 1);

    let (status, _) = call(&app, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn invalid_participant_reports_field() {
    let app = test_app();
    let (status, body) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": "" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "participantId");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/service-groups")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// -- Endpoints and service information ------------------------------------------

#[tokio::test]
async fn endpoint_lifecycle() {
    let app = test_app();
    create_group(&app).await;

    let (status, body) = call(&app, "POST", "/v1/endpoints", Some(endpoint_body()), None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["endpoint"]["transportProfile"], AS4);
    assert_eq!(body["serviceGroup"]["participantId"], SG);

    let (status, body) = call(&app, "POST", "/v1/endpoints", Some(endpoint_body()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["details"]["field"], "transportProfile");

    let mut edited = endpoint_body();
    edited["serviceDescription"] = json!("Renamed access point");
    let (status, body) = call(&app, "PUT", "/v1/endpoints", Some(edited), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoint"]["serviceDescription"], "Renamed access point");

    let endpoint_uri = format!("/v1/endpoints/{SG}/{DOC}/{PROCESS}/{AS4}");
    let (status, body) = call(&app, "GET", &endpoint_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["process"]["processId"], PROCESS);

    let (_, body) = call(
        &app,
        "GET",
        &format!("/v1/service-groups/{SG}/service-information"),
        None,
        None,
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let si_uri = format!("/v1/service-groups/{SG}/service-information/{DOC}");
    let process_uri = format!("{si_uri}/processes/{PROCESS}");

    let (status, _) = call(&app, "DELETE", &process_uri, None, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "process still has an endpoint");

    let (status, _) = call(&app, "DELETE", &endpoint_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "DELETE", &endpoint_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "DELETE", &si_uri, None, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "document type still has a process");
    let (status, _) = call(&app, "DELETE", &process_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "DELETE", &si_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", &si_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn endpoint_validation_lists_every_field() {
    let app = test_app();
    create_group(&app).await;
    let body = json!({
        "serviceGroupId": SG,
        "documentTypeId": DOC,
        "processId": PROCESS,
        "transportProfile": AS4,
        "certificate": "",
        "serviceDescription": "",
        "technicalContactUrl": "",
    });
    let (status, body) = call(&app, "POST", "/v1/endpoints", Some(body), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"certificate"));
    assert!(fields.contains(&"serviceDescription"));
    assert!(fields.contains(&"technicalContactUrl"));
}

#[tokio::test]
async fn bulk_url_change_reports_counts() {
    let app = test_app();
    create_group(&app).await;
    call(&app, "POST", "/v1/endpoints", Some(endpoint_body()), None).await;

    let (status, body) = call(
        &app,
        "POST",
        "/v1/bulk/change-url",
        Some(json!({
            "oldValue": "https://ap.example.org/as4",
            "newValue": "https://ap2.example.org/as4",
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changedEndpoints"], 1);
    assert_eq!(body["serviceGroups"], 1);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/bulk/change-url",
        Some(json!({ "oldValue": "https://x.org", "newValue": "https://x.org" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Redirects ------------------------------------------------------------------

#[tokio::test]
async fn redirect_conflicts_with_endpoints() {
    let app = test_app();
    create_group(&app).await;
    let redirect = json!({
        "serviceGroupId": SG,
        "documentTypeId": DOC,
        "targetHref": "https://other-smp.example.org",
        "subjectUniqueIdentifier": "CN=OTHER SMP",
    });

    let (status, _) = call(&app, "POST", "/v1/redirects", Some(redirect.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&app, "POST", "/v1/redirects", Some(redirect.clone()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["details"]["field"], "documentTypeId");

    let (status, _) = call(&app, "POST", "/v1/endpoints", Some(endpoint_body()), None).await;
    assert_eq!(status, StatusCode::CONFLICT, "redirect blocks endpoints");

    let uri = format!("/v1/redirects/{SG}/{DOC}");
    let (status, body) = call(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["targetHref"], "https://other-smp.example.org");
    let (status, _) = call(&app, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "POST", "/v1/endpoints", Some(endpoint_body()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, "POST", "/v1/redirects", Some(redirect), None).await;
    assert_eq!(status, StatusCode::CONFLICT, "endpoints block redirects");
}

// -- Settings and write guard ---------------------------------------------------

#[tokio::test]
async fn disabled_writes_are_forbidden_except_settings() {
    let app = test_app();
    let (status, _) = call(
        &app,
        "PUT",
        "/v1/settings",
        Some(json!({ "restWritableApiDisabled": true })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": SG })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = call(&app, "GET", "/v1/service-groups", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "PUT",
        "/v1/settings",
        Some(json!({ "restWritableApiDisabled": false })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    create_group(&app).await;
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let app = test_app();
    let (status, body) = call(
        &app,
        "PUT",
        "/v1/settings",
        Some(json!({ "smlActive": true })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "smlInfoId");

    let (_, body) = call(&app, "GET", "/v1/settings", None, None).await;
    assert_eq!(body["smlActive"], false);
}

#[tokio::test]
async fn transport_profile_in_use_cannot_be_deleted() {
    let app = test_app();
    create_group(&app).await;
    call(&app, "POST", "/v1/endpoints", Some(endpoint_body()), None).await;

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/v1/transport-profiles/{AS4}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/transport-profiles",
        Some(json!({ "id": "custom-as4", "name": "Custom AS4" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["deprecated"], false);
    let (status, _) = call(&app, "DELETE", "/v1/transport-profiles/custom-as4", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

// -- Exchange and audit ---------------------------------------------------------

#[tokio::test]
async fn export_then_import_restores_groups() {
    let app = test_app();
    // Keep business cards out of the export; no Directory is reachable here.
    call(
        &app,
        "PUT",
        "/v1/settings",
        Some(json!({
            "directoryIntegrationEnabled": false,
            "directoryIntegrationAutoUpdate": false,
        })),
        None,
    )
    .await;
    create_group(&app).await;
    call(&app, "POST", "/v1/endpoints", Some(endpoint_body()), None).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/xml");
    let xml = body_string(response).await;
    assert!(xml.contains("<smp-data"));
    assert!(xml.contains(SG));

    call(&app, "DELETE", &format!("/v1/service-groups/{SG}"), None, None).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/import?overwrite=false")
                .header("content-type", "application/xml")
                .body(Body::from(xml))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(summary["imported"], true);
    assert_eq!(summary["serviceGroupsCreated"], 1);

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/endpoints/{SG}/{DOC}/{PROCESS}/{AS4}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoint"]["endpointReference"], "https://ap.example.org/as4");
}

#[tokio::test]
async fn import_of_foreign_xml_is_bad_request() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/import")
                .body(Body::from("<other/>"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audit_trail_records_changes_and_verifies() {
    let app = test_app();
    create_group(&app).await;

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/audit?target={SG}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["entries"][0]["actor"], "admin");

    let (status, body) = call(&app, "GET", "/v1/audit/verify", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn openapi_document_lists_paths() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/service-groups"].is_object());
    assert!(body["paths"]["/v1/sml/registration"].is_object());
}

// -- Directory ------------------------------------------------------------------

async fn app_with_directory(server: &MockServer) -> Router {
    let app = test_app();
    let (status, _) = call(
        &app,
        "PUT",
        "/v1/settings",
        Some(json!({ "directoryHostname": server.uri() })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    create_group(&app).await;
    app
}

fn card_body() -> Value {
    json!({ "entities": [{ "name": "Test Company", "countryCode": "AT" }] })
}

#[tokio::test]
async fn business_card_is_pushed_to_directory() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/indexer/1.0/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    let app = app_with_directory(&server).await;

    let uri = format!("/v1/business-cards/{SG}");
    let (status, body) = call(&app, "PUT", &uri, Some(card_body()), None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body.get("warnings").is_none());
    assert_eq!(body["value"]["entities"][0]["name"], "Test Company");

    let (status, _) = call(&app, "POST", &format!("{uri}/publish"), None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn directory_failure_is_a_warning_on_save_and_502_on_publish() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/indexer/1.0/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("index down"))
        .mount(&server)
        .await;
    let app = app_with_directory(&server).await;

    let uri = format!("/v1/business-cards/{SG}");
    let (status, body) = call(&app, "PUT", &uri, Some(card_body()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["warnings"].as_array().unwrap().len(), 1);
    let (status, _) = call(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK, "card kept despite push failure");

    let (status, body) = call(&app, "POST", &format!("{uri}/publish"), None, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "REMOTE_SYNC_ERROR");
    assert_eq!(body["error"]["details"]["kind"], "DirectoryApi");
}

#[tokio::test]
async fn invalid_business_card_lists_indexed_fields() {
    let server = MockServer::start().await;
    let app = app_with_directory(&server).await;
    let (status, body) = call(
        &app,
        "PUT",
        &format!("/v1/business-cards/{SG}"),
        Some(json!({ "entities": [{ "name": "", "countryCode": "" }] })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "entities[0].name");
}

// -- SML --------------------------------------------------------------------------

fn empty_envelope() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/xml")
        .set_body_string(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body/></soap:Envelope>"#,
        )
}

/// Register an SML configuration for `server` and return its ID.
async fn add_mock_sml(app: &Router, server: &MockServer) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/v1/sml-infos",
        Some(json!({
            "displayName": "Mock SML",
            "dnsZone": "sml.example.org",
            "managementServiceUrl": format!("{}/edelivery-sml", server.uri()),
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn smp_registration_state_machine_over_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edelivery-sml/manageservicemetadata"))
        .respond_with(empty_envelope())
        .mount(&server)
        .await;
    let app = test_app_with_sml();
    let sml_id = add_mock_sml(&app, &server).await;

    let (status, body) = call(&app, "GET", "/v1/sml/registration", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "not_registered");

    let (status, _) = call(
        &app,
        "PUT",
        "/v1/sml/registration",
        Some(json!({ "physicalAddress": "192.0.2.10", "logicalAddress": "http://smp.example.org" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "update needs a registration");

    let registration = json!({
        "physicalAddress": "192.0.2.10",
        "logicalAddress": "http://smp.example.org",
        "smlInfoId": sml_id,
    });
    let (status, body) = call(&app, "POST", "/v1/sml/registration", Some(registration.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["state"], "registered");
    assert_eq!(body["smpId"], "SMP-TEST");

    let (status, _) = call(&app, "POST", "/v1/sml/registration", Some(registration), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, "DELETE", &format!("/v1/sml-infos/{sml_id}"), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "registered SML cannot be deleted");

    let (status, body) = call(&app, "DELETE", "/v1/sml/registration", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "not_registered");
}

#[tokio::test]
async fn invalid_smp_addresses_are_rejected_before_the_sml() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(empty_envelope())
        .expect(0)
        .mount(&server)
        .await;
    let app = test_app_with_sml();
    let sml_id = add_mock_sml(&app, &server).await;

    let (status, body) = call(
        &app,
        "POST",
        "/v1/sml/registration",
        Some(json!({
            "physicalAddress": "not-an-ip",
            "logicalAddress": "https://smp.example.org:8443/path",
            "smlInfoId": sml_id,
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"physicalAddress"));
    assert!(fields.contains(&"logicalAddress"));
}

#[tokio::test]
async fn smp_registration_without_smp_id_is_a_conflict() {
    let app = test_app();
    let (status, body) = call(
        &app,
        "POST",
        "/v1/sml/registration",
        Some(json!({ "physicalAddress": "192.0.2.10", "logicalAddress": "http://smp.example.org" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].as_str().unwrap().contains("SMP ID"));
}

async fn activate_mock_sml(app: &Router, server: &MockServer) {
    let sml_id = add_mock_sml(app, server).await;
    let (status, body) = call(
        app,
        "PUT",
        "/v1/settings",
        Some(json!({ "smlActive": true, "smlInfoId": sml_id })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn participant_is_registered_at_sml_on_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edelivery-sml/manageparticipantidentifier"))
        .respond_with(empty_envelope())
        .expect(2)
        .mount(&server)
        .await;
    let app = test_app_with_sml();
    activate_mock_sml(&app, &server).await;

    create_group(&app).await;
    let (status, body) = call(&app, "DELETE", &format!("/v1/service-groups/{SG}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("warnings").is_none());
}

#[tokio::test]
async fn sml_rejection_stores_no_service_group() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edelivery-sml/manageparticipantidentifier"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("content-type", "text/xml")
                .set_body_string(
                    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>denied</faultstring><detail><lrs:UnauthorizedFault xmlns:lrs="http://busdox.org/serviceMetadata/locator/1.0/"><FaultMessage>denied</FaultMessage></lrs:UnauthorizedFault></detail></soap:Fault></soap:Body></soap:Envelope>"#,
                ),
        )
        .mount(&server)
        .await;
    let app = test_app_with_sml();
    activate_mock_sml(&app, &server).await;

    let (status, body) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": SG })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["details"]["kind"], "UnauthorizedFault");
    assert_eq!(body["error"]["details"]["operation"], "create_participant");

    let (status, _) = call(&app, "GET", &format!("/v1/service-groups/{SG}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- DNS ------------------------------------------------------------------------

#[derive(Debug)]
struct FakeResolver(BTreeMap<String, Vec<Ipv4Addr>>);

#[async_trait]
impl Resolver for FakeResolver {
    async fn lookup_ipv4(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        self.0
            .get(host)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, host.to_string()))
    }
}

#[tokio::test]
async fn checkdns_reports_each_participant() {
    let smk = SmlInfo::defaults()
        .into_iter()
        .find(|s| s.id == PEPPOL_SMK_ID)
        .unwrap();
    let pid = IdentifierPolicy::peppol().parse_participant(SG).unwrap();
    let resolver = FakeResolver(BTreeMap::from([
        ("probe.example".to_string(), vec![Ipv4Addr::new(192, 0, 2, 1)]),
        (
            smp_client::dns::participant_host(&pid, &smk),
            vec![Ipv4Addr::new(192, 0, 2, 10)],
        ),
    ]));
    let state = AppState::new()
        .with_dns(DnsChecker::new(Arc::new(resolver)).with_probe_host("probe.example"));
    let app = smp_api::app(state);

    let (status, _) = call(&app, "GET", "/v1/service-groups/checkdns", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "no SML selected yet");

    call(
        &app,
        "PUT",
        "/v1/settings",
        Some(json!({ "smlInfoId": PEPPOL_SMK_ID })),
        None,
    )
    .await;
    create_group(&app).await;
    call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": "iso6523-actorid-upis::9915:unknown" })),
        None,
    )
    .await;

    let (status, body) = call(&app, "GET", "/v1/service-groups/checkdns", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["offline"], false);
    let participants = body["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 2);
    let registered: Vec<bool> = participants
        .iter()
        .map(|p| p["registered"].as_bool().unwrap())
        .collect();
    assert_eq!(registered.iter().filter(|r| **r).count(), 1);
}

// -- Participant migration --------------------------------------------------------

const MIGRATION_KEY: &str = "Ab12@#cdEF34";

/// SOAP bodies the mock SML received that contain `marker`.
async fn sml_calls_containing(server: &MockServer, marker: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains(marker))
        .count()
}

#[tokio::test]
async fn outbound_migration_over_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edelivery-sml/manageparticipantidentifier"))
        .respond_with(empty_envelope())
        .mount(&server)
        .await;
    let app = test_app_with_sml();
    activate_mock_sml(&app, &server).await;
    create_group(&app).await;

    let (status, migration) = call(
        &app,
        "POST",
        "/v1/migrations/outbound",
        Some(json!({ "participantId": SG })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{migration}");
    assert_eq!(migration["direction"], "outbound");
    assert_eq!(migration["state"], "in_progress");
    assert_eq!(migration["migrationKey"].as_str().unwrap().len(), 24);
    let id = migration["id"].as_str().unwrap().to_string();
    assert_eq!(sml_calls_containing(&server, "PrepareMigrationRecord").await, 1);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/migrations/outbound",
        Some(json!({ "participantId": SG })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "one outbound migration at a time");

    let (status, _) = call(&app, "DELETE", &format!("/v1/service-groups/{SG}"), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "group is being migrated");

    let (status, body) = call(&app, "GET", "/v1/migrations/outbound?state=in_progress", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let (_, body) = call(&app, "GET", "/v1/migrations/outbound?state=migrated", None, None).await;
    assert_eq!(body["count"], 0);

    let (status, body) = call(&app, "GET", "/v1/migrations/outbound/export", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("9915:test"));

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/migrations/outbound/{id}/finalize"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["value"]["state"], "migrated");

    let (status, _) = call(&app, "GET", &format!("/v1/service-groups/{SG}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        sml_calls_containing(&server, "DeleteParticipantIdentifier").await,
        0,
        "the target SMP owns the SML entry now"
    );

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/migrations/outbound/{id}/cancel"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "a finished migration cannot be cancelled");
}

#[tokio::test]
async fn inbound_migration_over_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edelivery-sml/manageparticipantidentifier"))
        .respond_with(empty_envelope())
        .mount(&server)
        .await;
    let app = test_app_with_sml();
    activate_mock_sml(&app, &server).await;

    let request = json!({ "participantId": SG, "migrationKey": MIGRATION_KEY });
    let (status, body) = call(&app, "POST", "/v1/migrations/inbound", Some(request.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["value"]["serviceGroupCreated"], true);
    assert_eq!(body["value"]["migration"]["direction"], "inbound");
    assert_eq!(body["value"]["migration"]["state"], "migrated");
    assert!(body.get("warnings").is_none());
    assert_eq!(sml_calls_containing(&server, "CompleteMigrationRecord").await, 1);
    assert_eq!(
        sml_calls_containing(&server, "CreateParticipantIdentifier").await,
        0,
        "the SML already points here"
    );
    let id = body["value"]["migration"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "GET", &format!("/v1/service-groups/{SG}"), None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "POST", "/v1/migrations/inbound", Some(request), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, "GET", "/v1/migrations/inbound", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = call(&app, "GET", &format!("/v1/migrations/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["migrationKey"], MIGRATION_KEY);

    let (status, _) = call(&app, "DELETE", &format!("/v1/migrations/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "DELETE", &format!("/v1/migrations/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "GET", &format!("/v1/service-groups/{SG}"), None, None).await;
    assert_eq!(status, StatusCode::OK, "forgetting the record keeps the group");
}

#[tokio::test]
async fn inbound_migration_checks_key_then_sml() {
    let app = test_app();

    let (status, body) = call(
        &app,
        "POST",
        "/v1/migrations/inbound",
        Some(json!({ "participantId": SG, "migrationKey": "short" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "migrationKey");

    let (status, body) = call(
        &app,
        "POST",
        "/v1/migrations/inbound",
        Some(json!({ "participantId": SG, "migrationKey": MIGRATION_KEY })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].as_str().unwrap().contains("SML"));

    let (status, _) = call(&app, "GET", &format!("/v1/service-groups/{SG}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn owners_only_migrate_their_own_groups() {
    let app = test_app_with_auth();
    let alice = Some("owner:alice:s3cret");
    let (status, _) = call(
        &app,
        "POST",
        "/v1/service-groups",
        Some(json!({ "participantId": SG })),
        alice,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let start = json!({ "participantId": SG });
    let (status, _) = call(
        &app,
        "POST",
        "/v1/migrations/outbound",
        Some(start.clone()),
        Some("owner:bob:s3cret"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "POST", "/v1/migrations/outbound", Some(start), alice).await;
    assert_eq!(status, StatusCode::CONFLICT, "SML integration is not active");

    let (status, _) = call(
        &app,
        "POST",
        "/v1/migrations/inbound",
        Some(json!({
            "participantId": "iso6523-actorid-upis::9915:other",
            "migrationKey": MIGRATION_KEY,
            "ownerId": "bob",
        })),
        alice,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "GET", "/v1/migrations/outbound/export", None, alice).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
