// Tests for the API client, response envelope and error mapping

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::{client, patient_json, session_json, MockTransport, Reply, PATIENT_A, PATIENT_B, SESSION_1};
use serde_json::json;
use therapybridge::api::envelope::parse_error_body;
use therapybridge::api::http::upload_chunks;
use therapybridge::api::{ApiError, ApiResponse, AuthFailure, ClientError, Method};
use therapybridge::cache::resources::{patient_key, patients_key};
use therapybridge::cache::{CacheSettings, Resources};
use therapybridge::cli::commands::describe_failure;
use therapybridge::domain::models::{CreatePatientRequest, UpdatePatientRequest};
use therapybridge::domain::{ListQuery, PatientId, SessionId, SessionStatus};

#[tokio::test]
async fn test_success_decodes_into_typed_data() {
    let transport = MockTransport::new();
    transport.ok(
        Method::Get,
        "/api/patients",
        json!([patient_json(PATIENT_A, "Ada"), patient_json(PATIENT_B, "Brook")]),
    );
    let api = client(&transport);

    let response = api.list_patients(&ListQuery::default()).await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.status(), Some(200));

    let patients = response.into_result().unwrap();
    assert_eq!(patients.len(), 2);
    assert_eq!(patients[1].name, "Brook");

    let requests = transport.requests.lock().unwrap().clone();
    assert_eq!(
        requests[0].query,
        vec![
            ("skip".to_string(), "0".to_string()),
            ("limit".to_string(), "20".to_string())
        ]
    );
}

#[tokio::test]
async fn test_empty_success_body_is_unit() {
    let transport = MockTransport::new();
    transport.reply(Method::Delete, &format!("/api/patients/{}", PATIENT_A), Reply::Raw(204, String::new()));
    let api = client(&transport);

    let response = api.delete_patient(&PatientId::parse(PATIENT_A).unwrap()).await.unwrap();
    assert!(response.into_result().is_ok());
}

#[tokio::test]
async fn test_malformed_success_body_is_client_error() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        &format!("/api/sessions/{}", SESSION_1),
        Reply::Raw(200, "{not json".to_string()),
    );
    let api = client(&transport);

    let result = api.get_session(&SessionId::parse(SESSION_1).unwrap()).await;
    let Err(decode) = result else {
        panic!("expected a decode failure");
    };
    assert!(matches!(decode, ClientError::Decode { status: 200, .. }));

    // What the CLI prints never carries the decoder's text
    let error = ApiError::from(decode);
    let shown = describe_failure(&error);
    assert_eq!(shown, "An unexpected error occurred.");
    assert!(error.detail().unwrap().contains("HTTP 200"));
}

#[tokio::test]
async fn test_fastapi_validation_detail_becomes_field_errors() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Post,
        "/api/patients",
        Reply::Json(
            422,
            json!({
                "detail": [
                    { "loc": ["body", "email"], "msg": "value is not a valid email address", "type": "value_error" },
                    { "loc": ["body", "name"], "msg": "field required", "type": "missing" }
                ]
            }),
        ),
    );
    let api = client(&transport);

    let request = CreatePatientRequest {
        name: String::new(),
        email: Some("nope".to_string()),
        ..Default::default()
    };
    let error = api.create_patient(&request).await.unwrap().into_result().unwrap_err();

    let fields = error.fields().unwrap();
    assert_eq!(fields["email"], vec!["value is not a valid email address"]);
    assert_eq!(fields["name"], vec!["field required"]);
    assert_eq!(error.code(), "VALIDATION_ERROR");
    assert!(!error.is_retriable());
}

#[test]
fn test_structured_error_body() {
    let body = json!({
        "error": {
            "code": "PATIENT_LIMIT",
            "message": "Plan allows 10 patients",
            "retriable": false,
            "request_id": "req-42",
            "details": { "plan": ["upgrade required"] }
        }
    })
    .to_string();

    let (info, fields) = parse_error_body(&body);
    assert_eq!(info.code.as_deref(), Some("PATIENT_LIMIT"));
    assert_eq!(info.message.as_deref(), Some("Plan allows 10 patients"));
    assert_eq!(info.retriable, Some(false));
    assert_eq!(info.request_id.as_deref(), Some("req-42"));
    assert_eq!(fields["plan"], vec!["upgrade required"]);
}

#[test]
fn test_nested_field_location_is_dotted() {
    let body = json!({
        "detail": [{ "loc": ["body", "contacts", 0, "phone"], "msg": "invalid phone" }]
    })
    .to_string();

    let (info, fields) = parse_error_body(&body);
    assert_eq!(fields["contacts.0.phone"], vec!["invalid phone"]);
    assert_eq!(info.message.as_deref(), Some("Validation error"));
}

#[test]
fn test_plain_text_error_body() {
    let (info, fields) = parse_error_body("Bad Gateway");
    assert_eq!(info.message.as_deref(), Some("Bad Gateway"));
    assert!(fields.is_empty());
}

#[tokio::test]
async fn test_status_codes_map_onto_error_kinds() {
    let transport = MockTransport::new();
    let api = client(&transport);
    let id = SessionId::parse(SESSION_1).unwrap();
    let path = format!("/api/sessions/{}", SESSION_1);

    transport.reply(Method::Get, &path, Reply::Json(401, json!({ "detail": "Not authenticated" })));
    transport.reply(Method::Get, &path, Reply::Json(403, json!({ "detail": "Forbidden" })));
    transport.reply(Method::Get, &path, Reply::Json(404, json!({ "detail": "Session not found" })));
    transport.reply(Method::Get, &path, Reply::Json(429, json!({ "detail": "Slow down" })));
    transport.reply(Method::Get, &path, Reply::Json(503, json!({ "detail": "Maintenance" })));
    transport.reply(Method::Get, &path, Reply::Raw(418, String::new()));

    let mut errors = Vec::new();
    for _ in 0..6 {
        errors.push(api.get_session(&id).await.unwrap().into_result().unwrap_err());
    }

    assert!(matches!(
        errors[0],
        ApiError::Auth { kind: AuthFailure::Unauthenticated, .. }
    ));
    assert_eq!(errors[0].code(), "AUTHENTICATION_ERROR");
    assert!(!errors[0].is_retriable());

    assert!(matches!(errors[1], ApiError::Auth { kind: AuthFailure::Forbidden, .. }));

    assert!(matches!(errors[2], ApiError::NotFound { .. }));
    assert_eq!(errors[2].detail(), Some("Session not found"));

    assert!(matches!(errors[3], ApiError::RateLimited { .. }));
    assert!(errors[3].is_retriable());

    assert!(matches!(errors[4], ApiError::Server { status: 503, .. }));
    assert_eq!(errors[4].code(), "SERVICE_UNAVAILABLE");
    assert!(errors[4].is_retriable());

    assert!(matches!(errors[5], ApiError::Unknown { status: Some(418), .. }));
    assert_eq!(errors[5].request_id(), Some("req-raw"));
    assert!(!errors[5].is_retriable());
}

#[tokio::test]
async fn test_server_retry_hint_overrides_status() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/api/auth/me",
        Reply::Json(500, json!({ "error": { "code": "MIGRATION", "retriable": false } })),
    );
    let api = client(&transport);

    let error = api.current_user().await.unwrap().into_result().unwrap_err();
    assert_eq!(error.code(), "MIGRATION");
    assert!(!error.is_retriable());
}

#[tokio::test]
async fn test_transport_failures_become_failures_not_errors() {
    let transport = MockTransport::new();
    transport.reply(Method::Get, "/api/auth/me", Reply::Network("connection refused".to_string()));
    transport.reply(Method::Get, "/api/auth/me", Reply::Timeout);
    let api = client(&transport);

    let first = api.current_user().await.unwrap();
    assert_eq!(first.status(), None);
    let error = first.into_result().unwrap_err();
    assert!(matches!(error, ApiError::Network { .. }));
    assert!(error.is_retriable());
    assert_eq!(error.suggestion(), Some("Check your connection and try again."));

    let second = api.current_user().await.unwrap().into_result().unwrap_err();
    assert!(matches!(second, ApiError::Timeout { after } if after == Duration::from_secs(30)));
}

#[tokio::test]
async fn test_bearer_token_is_attached() {
    let transport = MockTransport::new();
    transport.ok(Method::Get, "/api/patients", json!([]));
    let api = client(&transport);

    api.list_patients(&ListQuery::default()).await.unwrap();
    api.set_token(Some("abc.def.ghi".to_string()));
    api.list_patients(&ListQuery::default()).await.unwrap();

    let requests = transport.requests.lock().unwrap().clone();
    assert_eq!(requests[0].bearer, None);
    assert_eq!(requests[1].bearer.as_deref(), Some("abc.def.ghi"));
}

#[test]
fn test_envelope_shapes() {
    let ok: ApiResponse<Vec<u32>> = ApiResponse::Success {
        status: 200,
        data: vec![1, 2],
    };
    assert_eq!(
        ok.to_envelope(),
        json!({ "success": true, "status": 200, "data": [1, 2] })
    );

    let (info, fields) = parse_error_body(
        &json!({ "detail": [{ "loc": ["body", "email"], "msg": "bad email" }] }).to_string(),
    );
    let failed: ApiResponse<Vec<u32>> = ApiResponse::failure(ApiError::from_status(422, info, fields));
    let envelope = failed.to_envelope();
    assert_eq!(envelope["success"], json!(false));
    assert_eq!(envelope["status"], json!(422));
    assert_eq!(envelope["error"]["code"], json!("VALIDATION_ERROR"));
    assert_eq!(envelope["error"]["retriable"], json!(false));
    assert_eq!(envelope["details"]["email"], json!(["bad email"]));
}

// ========== RESOURCE FLOWS ==========

fn resources(transport: &std::sync::Arc<MockTransport>) -> Resources {
    Resources::new(client(transport), CacheSettings::default(), Duration::from_secs(5))
}

#[tokio::test]
async fn test_create_patient_swaps_placeholder_for_server_record() {
    let transport = MockTransport::new();
    transport.ok(Method::Get, "/api/patients", json!([patient_json(PATIENT_A, "Ada")]));
    transport.reply(
        Method::Post,
        "/api/patients",
        Reply::Json(201, patient_json(PATIENT_B, "Brook")),
    );
    let resources = resources(&transport);
    let query = ListQuery::default();
    let key = patients_key(&query);

    resources.load_patients(&query).await.unwrap();

    let pending = resources.create_patient(
        &query,
        CreatePatientRequest {
            name: "Brook".to_string(),
            ..Default::default()
        },
    );
    let listed = resources.patients.read(&key).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[1].id.is_temporary());

    let created = pending.await.unwrap();
    assert_eq!(created.id.as_str(), PATIENT_B);

    let listed = resources.patients.read(&key).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|p| !p.id.is_temporary()));
}

#[tokio::test]
async fn test_failed_delete_restores_patient() {
    let transport = MockTransport::new();
    transport.ok(
        Method::Get,
        "/api/patients",
        json!([patient_json(PATIENT_A, "Ada"), patient_json(PATIENT_B, "Brook")]),
    );
    transport.reply(
        Method::Delete,
        &format!("/api/patients/{}", PATIENT_A),
        Reply::Json(409, json!({ "detail": "Patient has sessions" })),
    );
    let resources = resources(&transport);
    let query = ListQuery::default();

    let before = resources.load_patients(&query).await.unwrap();
    let result = resources
        .delete_patient(&query, &PatientId::parse(PATIENT_A).unwrap())
        .await;

    assert!(matches!(result, Err(ApiError::Conflict { .. })));
    assert_eq!(resources.patients.read(&patients_key(&query)).unwrap(), before);
}

#[tokio::test]
async fn test_update_patient_converges_on_server_copy() {
    let transport = MockTransport::new();
    let path = format!("/api/patients/{}", PATIENT_A);
    transport.ok(Method::Get, &path, patient_json(PATIENT_A, "Ada"));
    let mut server_copy = patient_json(PATIENT_A, "Ada Lovelace");
    server_copy["phone"] = json!("+44 20 7946 0000");
    transport.ok(Method::Patch, &path, server_copy);
    let resources = resources(&transport);
    let id = PatientId::parse(PATIENT_A).unwrap();

    let updated = resources
        .update_patient(
            &id,
            UpdatePatientRequest {
                name: Some("Ada Lovelace".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.phone.as_deref(), Some("+44 20 7946 0000"));
    assert_eq!(resources.patient.read(&patient_key(&id)).unwrap(), updated);
    assert_eq!(transport.calls(Method::Get, &path), 1);
}

#[tokio::test(start_paused = true)]
async fn test_watch_session_polls_until_processed() {
    let transport = MockTransport::new();
    let path = format!("/api/sessions/{}", SESSION_1);
    transport.ok(Method::Get, &path, session_json(SESSION_1, PATIENT_A, "transcribing", "a.mp3"));
    transport.ok(Method::Get, &path, session_json(SESSION_1, PATIENT_A, "extracting_notes", "a.mp3"));
    transport.ok(Method::Get, &path, session_json(SESSION_1, PATIENT_A, "processed", "a.mp3"));
    let resources = resources(&transport);

    let handle = resources.watch_session(&SessionId::parse(SESSION_1).unwrap());
    let last = handle.finished().await.unwrap();

    assert_eq!(last.status, SessionStatus::Processed);
    assert_eq!(transport.calls(Method::Get, &path), 3);
}

#[test]
fn test_upload_chunks_share_the_body_buffer() {
    let body = Bytes::from(vec![7u8; 10 * 1024 * 1024 + 5]);
    let chunks: Vec<(Bytes, u8)> = upload_chunks(body.clone(), 4 * 1024 * 1024).collect();

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.iter().map(|(_, pct)| *pct).collect::<Vec<_>>(), vec![39, 79, 100]);
    assert_eq!(chunks.iter().map(|(c, _)| c.len()).sum::<usize>(), body.len());
    for (i, (chunk, _)) in chunks.iter().enumerate() {
        assert_eq!(chunk.as_ptr(), body[i * 4 * 1024 * 1024..].as_ptr());
    }

    assert_eq!(upload_chunks(Bytes::new(), 1024).count(), 0);
}
