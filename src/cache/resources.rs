//! Typed caches for each API resource, with the fetch and mutation flows
//! the front end uses

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use super::collection::{self, without};
use super::key::CacheKey;
use super::polling::PollHandle;
use super::store::{CacheSettings, MutateOptions, MutationCache, Resolution};
use super::upload::{start_upload, UploadHandle};
use crate::api::{ApiClient, ApiError};
use crate::domain::models::{
    CreatePatientRequest, ExtractedNotes, Patient, SessionUpload, TherapySession,
    UpdatePatientRequest, UpdateSessionRequest,
};
use crate::domain::{ListQuery, PatientId, SessionId};

pub fn patients_key(query: &ListQuery) -> CacheKey {
    CacheKey::from_request("/api/patients", &query.to_pairs())
}

pub fn patient_key(id: &PatientId) -> CacheKey {
    CacheKey::new(format!("/api/patients/{}", id))
}

pub fn sessions_key(patient: Option<&PatientId>, query: &ListQuery) -> CacheKey {
    let mut pairs = query.to_pairs();
    if let Some(patient) = patient {
        pairs.push(("patient_id".to_string(), patient.to_string()));
    }
    CacheKey::from_request("/api/sessions", &pairs)
}

pub fn session_key(id: &SessionId) -> CacheKey {
    CacheKey::new(format!("/api/sessions/{}", id))
}

pub fn notes_key(id: &SessionId) -> CacheKey {
    CacheKey::new(format!("/api/sessions/{}/notes", id))
}

/// Awaits a mutation and hands back the record its remote call captured
async fn captured<T, L, H>(handle: H, slot: Arc<Mutex<Option<T>>>) -> Result<T, ApiError>
where
    H: Future<Output = Result<L, ApiError>>,
{
    handle.await?;
    let value = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    value.ok_or_else(|| ApiError::Unexpected {
        message: "mutation settled without a server record".to_string(),
    })
}

/// One cache per resource shape
pub struct Resources {
    client: Arc<ApiClient>,
    pub patients: MutationCache<Vec<Patient>>,
    pub patient: MutationCache<Patient>,
    pub sessions: MutationCache<Vec<TherapySession>>,
    pub session: MutationCache<TherapySession>,
    pub notes: MutationCache<ExtractedNotes>,
    poll_interval: Duration,
}

impl Resources {
    pub fn new(client: Arc<ApiClient>, settings: CacheSettings, poll_interval: Duration) -> Self {
        Self {
            client,
            patients: MutationCache::new(settings.clone()),
            patient: MutationCache::new(settings.clone()),
            sessions: MutationCache::new(settings.clone()),
            session: MutationCache::new(settings.clone()),
            notes: MutationCache::new(settings),
            poll_interval,
        }
    }

    /// Forget every cached record, e.g. on sign-out
    pub fn clear(&self) {
        let busy = self.patients.clear()
            + self.patient.clear()
            + self.sessions.clear()
            + self.session.clear()
            + self.notes.clear();
        info!(busy, "Cleared resource caches");
    }

    // ========== PATIENTS ==========

    pub async fn load_patients(&self, query: &ListQuery) -> Result<Vec<Patient>, ApiError> {
        let client = Arc::clone(&self.client);
        let q = query.clone();
        self.patients
            .fetch(&patients_key(query), move || async move {
                client.list_patients(&q).await?.into_result()
            })
            .await
    }

    pub async fn load_patient(&self, id: &PatientId) -> Result<Patient, ApiError> {
        let client = Arc::clone(&self.client);
        let id = id.clone();
        self.patient
            .fetch(&patient_key(&id), move || async move {
                client.get_patient(&id).await?.into_result()
            })
            .await
    }

    /// Shows a placeholder in the list at `query` until the server answers
    pub fn create_patient(
        &self,
        query: &ListQuery,
        request: CreatePatientRequest,
    ) -> impl Future<Output = Result<Patient, ApiError>> + Send + 'static {
        let placeholder = Patient {
            id: PatientId::temporary(),
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            therapist_id: request.therapist_id.clone(),
            created_at: None,
        };

        let client = Arc::clone(&self.client);
        let slot = Arc::new(Mutex::new(None));
        let remote_slot = Arc::clone(&slot);
        let handle = self.patients.mutate(
            &patients_key(query),
            collection::append(placeholder),
            move || async move {
                let created = client.create_patient(&request).await?.into_result()?;
                info!("Created patient {}", created.id);
                *remote_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(created.clone());
                Ok(Resolution::merge(move |list| collection::upsert(list, created)))
            },
            MutateOptions::default(),
        );

        captured(handle, slot)
    }

    /// Optimistic edit of a single patient; cached listings are refetched next time
    pub async fn update_patient(
        &self,
        id: &PatientId,
        request: UpdatePatientRequest,
    ) -> Result<Patient, ApiError> {
        let loaded = self.load_patient(id).await?;
        let client = Arc::clone(&self.client);
        let target = id.clone();
        let patch = request.clone();
        let updated = self
            .patient
            .mutate(
                &patient_key(id),
                move |current| patch.apply_to(current.unwrap_or(&loaded)),
                move || async move {
                    let patient = client.update_patient(&target, &request).await?.into_result()?;
                    Ok(Resolution::Replace(patient))
                },
                MutateOptions::default(),
            )
            .await?;
        self.patients.invalidate_path("/api/patients");
        Ok(updated)
    }

    /// Removes the patient from the list at `query` right away
    pub async fn delete_patient(&self, query: &ListQuery, id: &PatientId) -> Result<(), ApiError> {
        let client = Arc::clone(&self.client);
        let target = id.clone();
        let removed = id.clone();
        self.patients
            .mutate(
                &patients_key(query),
                collection::remove(id.clone()),
                move || async move {
                    client.delete_patient(&target).await?.into_result()?;
                    Ok(Resolution::merge(move |list| without(list, &removed)))
                },
                MutateOptions::default(),
            )
            .await?;
        self.patient.remove(&patient_key(id));
        self.patients.invalidate_path("/api/patients");
        Ok(())
    }

    // ========== SESSIONS ==========

    pub async fn load_sessions(
        &self,
        patient: Option<&PatientId>,
        query: &ListQuery,
    ) -> Result<Vec<TherapySession>, ApiError> {
        let client = Arc::clone(&self.client);
        let q = query.clone();
        let p = patient.cloned();
        self.sessions
            .fetch(&sessions_key(patient, query), move || async move {
                client.list_sessions(p.as_ref(), &q).await?.into_result()
            })
            .await
    }

    pub async fn load_session(&self, id: &SessionId) -> Result<TherapySession, ApiError> {
        let client = Arc::clone(&self.client);
        let id = id.clone();
        self.session
            .fetch(&session_key(&id), move || async move {
                client.get_session(&id).await?.into_result()
            })
            .await
    }

    pub async fn load_notes(&self, id: &SessionId) -> Result<ExtractedNotes, ApiError> {
        let client = Arc::clone(&self.client);
        let id = id.clone();
        self.notes
            .fetch(&notes_key(&id), move || async move {
                client.get_notes(&id).await?.into_result()
            })
            .await
    }

    pub async fn update_session(
        &self,
        id: &SessionId,
        request: UpdateSessionRequest,
        options: MutateOptions,
    ) -> Result<TherapySession, ApiError> {
        let loaded = self.load_session(id).await?;
        let client = Arc::clone(&self.client);
        let target = id.clone();
        let patch = request.clone();
        let updated = self
            .session
            .mutate(
                &session_key(id),
                move |current| patch.apply_to(current.unwrap_or(&loaded)),
                move || async move {
                    let session = client.update_session(&target, &request).await?.into_result()?;
                    Ok(Resolution::Replace(session))
                },
                options,
            )
            .await?;
        self.sessions.invalidate_path("/api/sessions");
        Ok(updated)
    }

    pub async fn delete_session(
        &self,
        patient: Option<&PatientId>,
        query: &ListQuery,
        id: &SessionId,
    ) -> Result<(), ApiError> {
        let client = Arc::clone(&self.client);
        let target = id.clone();
        let removed = id.clone();
        self.sessions
            .mutate(
                &sessions_key(patient, query),
                collection::remove(id.clone()),
                move || async move {
                    client.delete_session(&target).await?.into_result()?;
                    Ok(Resolution::merge(move |list| without(list, &removed)))
                },
                MutateOptions::default(),
            )
            .await?;
        self.session.remove(&session_key(id));
        self.notes.remove(&notes_key(id));
        Ok(())
    }

    /// Upload audio; a placeholder session sits in the patient's session list
    /// until the server returns the real record (matched by filename)
    pub fn upload_session(
        &self,
        query: &ListQuery,
        upload: SessionUpload,
        on_progress: impl Fn(u8) + Send + Sync + 'static,
    ) -> UploadHandle<TherapySession> {
        let session_date = upload
            .session_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or_else(chrono::Utc::now);
        let placeholder =
            TherapySession::placeholder(upload.patient_id.clone(), upload.filename.clone(), session_date);
        let key = sessions_key(Some(&upload.patient_id), query);
        let client = Arc::clone(&self.client);

        start_upload(
            &self.sessions,
            &key,
            placeholder,
            |existing: &TherapySession, created: &TherapySession| {
                existing.audio_filename.is_some() && existing.audio_filename == created.audio_filename
            },
            on_progress,
            move |progress| async move { client.upload_session(upload, progress).await?.into_result() },
        )
    }

    /// Poll a session until it leaves the processing states
    pub fn watch_session(&self, id: &SessionId) -> PollHandle<TherapySession> {
        let client = Arc::clone(&self.client);
        let id = id.clone();
        let key = session_key(&id);
        self.session.poll(
            &key,
            self.poll_interval,
            move || {
                let client = Arc::clone(&client);
                let id = id.clone();
                async move { client.get_session(&id).await?.into_result() }
            },
            |session: &TherapySession| session.status.is_processing(),
        )
    }
}
