// Tests for identifiers, records, queries and form validation

use chrono::{TimeZone, Utc};
use serde_json::json;
use therapybridge::domain::ids::IdError;
use therapybridge::domain::models::{CreatePatientRequest, SignupRequest, UpdatePatientRequest};
use therapybridge::domain::query::{paginate, sort_by_column};
use therapybridge::domain::validation::{
    is_valid_email, is_valid_phone, validate_new_patient, validate_patient_update, validate_signup,
};
use therapybridge::domain::{
    ListQuery, Patient, PatientId, SessionId, SessionStatus, SortOrder, TherapySession, UserRole,
};

const PATIENT: &str = "8d0e1f4a-3b2c-4d5e-9f60-718293a4b5c6";

fn patient(id: &str, name: &str, day: u32) -> Patient {
    Patient {
        id: PatientId::parse(id).unwrap(),
        name: name.to_string(),
        email: None,
        phone: None,
        therapist_id: None,
        created_at: Some(Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap()),
    }
}

#[test]
fn test_ids_are_validated_and_normalised() {
    let id = PatientId::parse(format!("  {}  ", PATIENT.to_uppercase())).unwrap();
    assert_eq!(id.as_str(), PATIENT);
    assert_eq!(id.short(), "8d0e1f4a");
    assert!(!id.is_temporary());

    assert_eq!(PatientId::parse("  "), Err(IdError::Empty { kind: "patient" }));
    assert!(matches!(
        SessionId::parse("session-7"),
        Err(IdError::Malformed { kind: "session", .. })
    ));
}

#[test]
fn test_temporary_ids_are_unique() {
    let a = SessionId::temporary();
    let b = SessionId::temporary();
    assert!(a.is_temporary());
    assert_ne!(a, b);
    assert_eq!(a.short().len(), 8);
}

#[test]
fn test_malformed_id_rejected_when_deserializing() {
    let bad = json!({ "id": "not-a-uuid", "name": "Ada" });
    assert!(serde_json::from_value::<Patient>(bad).is_err());

    let good = json!({ "id": PATIENT, "name": "Ada" });
    let parsed: Patient = serde_json::from_value(good).unwrap();
    assert_eq!(parsed.id.to_string(), PATIENT);
    assert!(parsed.therapist_id.is_none());
}

#[test]
fn test_session_status_wire_names() {
    let session: TherapySession = serde_json::from_value(json!({
        "id": "5f1e2d3c-4b5a-4968-8776-a5b4c3d2e1f0",
        "patient_id": PATIENT,
        "status": "extracting_notes",
        "session_date": "2025-02-01T00:00:00Z"
    }))
    .unwrap();
    assert_eq!(session.status, SessionStatus::ExtractingNotes);
    assert!(session.status.is_processing());

    assert_eq!(SessionStatus::from_str("processed").unwrap(), SessionStatus::Processed);
    assert!(SessionStatus::from_str("queued").is_err());
    assert!(!SessionStatus::Failed.is_processing());
    assert!(SessionStatus::Uploading.progress_percent() < SessionStatus::Transcribed.progress_percent());
}

#[test]
fn test_placeholder_session_starts_uploading() {
    let patient_id = PatientId::parse(PATIENT).unwrap();
    let date = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    let session = TherapySession::placeholder(patient_id.clone(), "intake.wav", date);

    assert!(session.id.is_temporary());
    assert_eq!(session.patient_id, patient_id);
    assert_eq!(session.status, SessionStatus::Uploading);
    assert_eq!(session.audio_filename.as_deref(), Some("intake.wav"));
}

#[test]
fn test_list_query_pairs() {
    let query = ListQuery {
        page: 3,
        page_size: 10,
        sort_by: Some("name".to_string()),
        order: SortOrder::Desc,
    };
    assert_eq!(
        query.to_pairs(),
        vec![
            ("skip".to_string(), "20".to_string()),
            ("limit".to_string(), "10".to_string()),
            ("sort_by".to_string(), "name".to_string()),
            ("order".to_string(), "desc".to_string()),
        ]
    );

    let zero = ListQuery {
        page: 0,
        ..ListQuery::default()
    };
    assert_eq!(zero.to_pairs()[0].1, "0");

    let huge = ListQuery {
        page: u32::MAX,
        page_size: 20,
        ..ListQuery::default()
    };
    assert_eq!(huge.to_pairs()[0].1, (u64::from(u32::MAX - 1) * 20).to_string());
}

#[test]
fn test_paginate() {
    let items: Vec<u32> = (1..=45).collect();

    let first = paginate(&items, 1, 20);
    assert_eq!(first.items.len(), 20);
    assert_eq!(first.total_pages(), 3);
    assert!(first.has_next());

    let last = paginate(&items, 3, 20);
    assert_eq!(last.items, (41..=45).collect::<Vec<_>>());
    assert!(!last.has_next());

    assert!(paginate(&items, 9, 20).items.is_empty());
    assert_eq!(paginate(&items, 1, 0).total_pages(), 0);
}

#[test]
fn test_sort_by_column() {
    let mut patients = vec![
        patient(PATIENT, "brook", 3),
        patient("1a2b3c4d-5e6f-4a1b-8c2d-3e4f5a6b7c8d", "Ada", 1),
        patient("0b9a8c7d-6e5f-4a3b-9c2d-1e0f9a8b7c6d", "Cyd", 2),
    ];

    sort_by_column(&mut patients, "name", SortOrder::Asc);
    let names: Vec<&str> = patients.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Ada", "brook", "Cyd"]);

    sort_by_column(&mut patients, "created_at", SortOrder::Desc);
    let names: Vec<&str> = patients.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["brook", "Cyd", "Ada"]);

    sort_by_column(&mut patients, "favourite_colour", SortOrder::Asc);
    let names: Vec<&str> = patients.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["brook", "Cyd", "Ada"]);
}

#[test]
fn test_email_and_phone_checks() {
    assert!(is_valid_email("ada@example.com"));
    assert!(!is_valid_email("ada@example"));
    assert!(!is_valid_email("ada example@example.com"));
    assert!(!is_valid_email("@example.com"));

    assert!(is_valid_phone("+1 (555) 010-9999"));
    assert!(!is_valid_phone("12345"));
    assert!(!is_valid_phone("555-CALL-NOW"));
}

#[test]
fn test_signup_validation_collects_every_field() {
    let errors = validate_signup(&SignupRequest {
        email: "nope".to_string(),
        password: "short".to_string(),
        full_name: "  ".to_string(),
        role: UserRole::Therapist,
    })
    .unwrap_err();

    assert_eq!(errors["email"].len(), 1);
    assert_eq!(errors["password"].len(), 2);
    assert!(errors.contains_key("full_name"));

    assert!(validate_signup(&SignupRequest {
        email: "dr.rivera@example.com".to_string(),
        password: "correct horse 9".to_string(),
        full_name: "Dr. Rivera".to_string(),
        role: UserRole::Therapist,
    })
    .is_ok());
}

#[test]
fn test_patient_form_validation() {
    let errors = validate_new_patient(&CreatePatientRequest {
        name: "Ada".to_string(),
        email: Some("ada@".to_string()),
        phone: Some("12".to_string()),
        therapist_id: None,
    })
    .unwrap_err();
    assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["email", "phone"]);

    assert!(validate_patient_update(&UpdatePatientRequest::default()).is_ok());
    assert!(validate_patient_update(&UpdatePatientRequest {
        name: Some(String::new()),
        ..Default::default()
    })
    .is_err());
}

#[test]
fn test_update_patient_patch_applies_set_fields_only() {
    let original = patient(PATIENT, "Ada", 1);
    let patched = UpdatePatientRequest {
        phone: Some("+44 20 7946 0000".to_string()),
        ..Default::default()
    }
    .apply_to(&original);

    assert_eq!(patched.name, "Ada");
    assert_eq!(patched.phone.as_deref(), Some("+44 20 7946 0000"));
}
