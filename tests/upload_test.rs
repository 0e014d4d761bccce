// Tests for optimistic session uploads

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use common::{client, session_json, MockTransport, Reply, PATIENT_A, SESSION_1};
use serde_json::json;
use therapybridge::api::{ApiError, Method};
use therapybridge::cache::resources::sessions_key;
use therapybridge::cache::{CacheSettings, Resources, UploadProgress};
use therapybridge::domain::{ListQuery, PatientId, SessionStatus, SessionUpload, TherapySession};

fn resources(transport: &Arc<MockTransport>) -> Resources {
    Resources::new(client(transport), CacheSettings::default(), Duration::from_secs(5))
}

fn upload(bytes: usize) -> SessionUpload {
    SessionUpload {
        patient_id: PatientId::parse(PATIENT_A).unwrap(),
        filename: "intake.mp3".to_string(),
        content_type: "audio/mpeg".to_string(),
        session_date: NaiveDate::from_ymd_opt(2025, 2, 1),
        bytes: vec![0u8; bytes],
    }
}

fn recorder() -> (Arc<Mutex<Vec<u8>>>, impl Fn(u8) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |pct: u8| sink.lock().unwrap().push(pct))
}

#[tokio::test]
async fn test_upload_reports_progress_and_replaces_placeholder() {
    let transport = MockTransport::new();
    transport.progress_steps(&[0, 25, 50, 75, 100]);
    transport.ok(
        Method::Post,
        "/api/sessions/upload",
        session_json(SESSION_1, PATIENT_A, "uploading", "intake.mp3"),
    );
    let resources = resources(&transport);
    let query = ListQuery::default();
    let patient = PatientId::parse(PATIENT_A).unwrap();
    let key = sessions_key(Some(&patient), &query);

    let (seen, sink) = recorder();
    let handle = resources.upload_session(&query, upload(10 * 1024 * 1024), sink);

    // Placeholder is in the list before the transport has done anything
    let listed = resources.sessions.read(&key).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].id.is_temporary());
    assert_eq!(listed[0].status, SessionStatus::Uploading);
    assert_eq!(listed[0].audio_filename.as_deref(), Some("intake.mp3"));

    let created = handle.finish().await.unwrap();
    assert_eq!(created.id.as_str(), SESSION_1);

    let progress = seen.lock().unwrap().clone();
    assert_eq!(progress, vec![0, 25, 50, 75, 100]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let listed = resources.sessions.read(&key).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id.as_str(), SESSION_1);

    let uploads = transport.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "intake.mp3");
    assert_eq!(uploads[0].1, 10 * 1024 * 1024);
    assert!(uploads[0]
        .2
        .contains(&("patient_id".to_string(), PATIENT_A.to_string())));
    assert!(uploads[0]
        .2
        .contains(&("session_date".to_string(), "2025-02-01".to_string())));
}

#[tokio::test]
async fn test_upload_completes_progress_when_transport_stops_short() {
    let transport = MockTransport::new();
    transport.progress_steps(&[10, 60]);
    transport.ok(
        Method::Post,
        "/api/sessions/upload",
        session_json(SESSION_1, PATIENT_A, "uploading", "intake.mp3"),
    );
    let resources = resources(&transport);

    let (seen, sink) = recorder();
    let handle = resources.upload_session(&ListQuery::default(), upload(1024), sink);
    handle.finish().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![10, 60, 100]);
}

#[tokio::test]
async fn test_failed_upload_removes_placeholder() {
    let transport = MockTransport::new();
    transport.progress_steps(&[0, 40]);
    transport.reply(
        Method::Post,
        "/api/sessions/upload",
        Reply::Json(500, json!({ "detail": "storage unavailable" })),
    );
    let resources = resources(&transport);
    let query = ListQuery::default();
    let patient = PatientId::parse(PATIENT_A).unwrap();
    let key = sessions_key(Some(&patient), &query);

    let existing: TherapySession = serde_json::from_value(session_json(
        "2b3c4d5e-6f7a-4b8c-9d0e-1f2a3b4c5d6e",
        PATIENT_A,
        "processed",
        "earlier.mp3",
    ))
    .unwrap();
    resources.sessions.seed(&key, vec![existing.clone()]);

    let (seen, sink) = recorder();
    let handle = resources.upload_session(&query, upload(2048), sink);
    assert_eq!(resources.sessions.read(&key).unwrap().len(), 2);

    let result = handle.finish().await;
    assert!(matches!(result, Err(ApiError::Server { status: 500, .. })));
    assert_eq!(resources.sessions.read(&key).unwrap(), vec![existing]);
    assert!(!seen.lock().unwrap().contains(&100));
}

#[tokio::test]
async fn test_upload_replaces_record_already_fetched_by_poll() {
    let transport = MockTransport::new();
    transport.ok(
        Method::Post,
        "/api/sessions/upload",
        session_json(SESSION_1, PATIENT_A, "transcribing", "intake.mp3"),
    );
    let resources = resources(&transport);
    let query = ListQuery::default();
    let patient = PatientId::parse(PATIENT_A).unwrap();
    let key = sessions_key(Some(&patient), &query);

    let handle = resources.upload_session(&query, upload(512), |_| {});

    // A list refresh lands before the upload response does
    let fetched: TherapySession =
        serde_json::from_value(session_json(SESSION_1, PATIENT_A, "uploading", "intake.mp3")).unwrap();
    resources.sessions.seed(&key, vec![fetched]);

    handle.finish().await.unwrap();

    let listed = resources.sessions.read(&key).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, SessionStatus::Transcribing);
}

#[test]
fn test_progress_never_goes_backwards() {
    let (seen, sink) = recorder();
    let progress = UploadProgress::new(sink);

    progress.report(50);
    progress.report(30);
    progress.report(100);
    progress.report(100);

    assert_eq!(*seen.lock().unwrap(), vec![50, 100, 100]);
    assert_eq!(progress.current(), 100);
}

#[test]
fn test_progress_clamps_to_hundred() {
    let (seen, sink) = recorder();
    let progress = UploadProgress::new(sink);

    progress.report(250);
    progress.complete();

    assert_eq!(*seen.lock().unwrap(), vec![100]);
    assert_eq!(progress.current(), 100);
}
