//! TherapyBridge REST client

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::envelope::{decode, ApiResponse};
use super::error::ClientError;
use super::transport::{ApiRequest, Method, MultipartUpload, ProgressFn, Transport};
use crate::domain::models::{
    CreatePatientRequest, ExtractedNotes, LoginRequest, Patient, SessionUpload, SignupRequest,
    TherapySession, TokenResponse, UpdatePatientRequest, UpdateSessionRequest, User,
};
use crate::domain::{ListQuery, PatientId, SessionId};

pub type ApiResult<T> = Result<ApiResponse<T>, ClientError>;

/// Typed wrappers around the REST endpoints
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    token: RwLock<Option<String>>,
    timeout: Option<Duration>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            token: RwLock::new(None),
            timeout: None,
        }
    }

    /// Per-request deadline applied to every call made by this client
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn set_token(&self, token: Option<String>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn prepare(&self, mut request: ApiRequest) -> ApiRequest {
        request.bearer = self.token();
        if request.timeout.is_none() {
            request.timeout = self.timeout;
        }
        request
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let request = self.prepare(request);
        let label = format!("{} {}", request.method.as_str(), request.path);

        let raw = match self.transport.send(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{} failed: {}", label, e);
                return Ok(ApiResponse::failure(e.into()));
            }
        };

        debug!("{} -> {}", label, raw.status);
        let response = decode(raw)?;
        if let ApiResponse::Failure { error, .. } = &response {
            warn!(
                "{} failed: {} (code={}, request_id={:?}, detail={:?})",
                label,
                error,
                error.code(),
                error.request_id(),
                error.detail()
            );
        }
        Ok(response)
    }

    async fn call_unit(&self, request: ApiRequest) -> ApiResult<()> {
        let response: ApiResponse<IgnoredAny> = self.call(request).await?;
        Ok(response.map(|_| ()))
    }

    fn json_body<B: Serialize>(body: &B) -> Result<serde_json::Value, ClientError> {
        serde_json::to_value(body).map_err(|e| ClientError::InvalidRequest(e.to_string()))
    }

    // ========== AUTH ==========

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<TokenResponse> {
        let body = Self::json_body(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response: ApiResponse<TokenResponse> = self
            .call(ApiRequest::new(Method::Post, "/api/auth/login").with_body(body))
            .await?;
        if response.is_success() {
            info!("Logged in as {}", email);
        }
        Ok(response)
    }

    pub async fn signup(&self, request: &SignupRequest) -> ApiResult<User> {
        let body = Self::json_body(request)?;
        self.call(ApiRequest::new(Method::Post, "/api/auth/signup").with_body(body))
            .await
    }

    pub async fn verify_email(&self, token: &str) -> ApiResult<()> {
        self.call_unit(
            ApiRequest::new(Method::Post, "/api/auth/verify-email").with_body(json!({ "token": token })),
        )
        .await
    }

    pub async fn current_user(&self) -> ApiResult<User> {
        self.call(ApiRequest::new(Method::Get, "/api/auth/me")).await
    }

    pub async fn logout(&self) -> ApiResult<()> {
        self.call_unit(ApiRequest::new(Method::Post, "/api/auth/logout"))
            .await
    }

    // ========== PATIENTS ==========

    pub async fn list_patients(&self, query: &ListQuery) -> ApiResult<Vec<Patient>> {
        self.call(ApiRequest::new(Method::Get, "/api/patients").with_query(query.to_pairs()))
            .await
    }

    pub async fn get_patient(&self, id: &PatientId) -> ApiResult<Patient> {
        self.call(ApiRequest::new(Method::Get, format!("/api/patients/{}", id)))
            .await
    }

    pub async fn create_patient(&self, request: &CreatePatientRequest) -> ApiResult<Patient> {
        let body = Self::json_body(request)?;
        self.call(ApiRequest::new(Method::Post, "/api/patients").with_body(body))
            .await
    }

    pub async fn update_patient(
        &self,
        id: &PatientId,
        request: &UpdatePatientRequest,
    ) -> ApiResult<Patient> {
        let body = Self::json_body(request)?;
        self.call(ApiRequest::new(Method::Patch, format!("/api/patients/{}", id)).with_body(body))
            .await
    }

    pub async fn delete_patient(&self, id: &PatientId) -> ApiResult<()> {
        self.call_unit(ApiRequest::new(Method::Delete, format!("/api/patients/{}", id)))
            .await
    }

    // ========== SESSIONS ==========

    pub async fn list_sessions(
        &self,
        patient: Option<&PatientId>,
        query: &ListQuery,
    ) -> ApiResult<Vec<TherapySession>> {
        let mut pairs = query.to_pairs();
        if let Some(patient) = patient {
            pairs.push(("patient_id".to_string(), patient.to_string()));
        }
        self.call(ApiRequest::new(Method::Get, "/api/sessions").with_query(pairs))
            .await
    }

    pub async fn get_session(&self, id: &SessionId) -> ApiResult<TherapySession> {
        self.call(ApiRequest::new(Method::Get, format!("/api/sessions/{}", id)))
            .await
    }

    pub async fn update_session(
        &self,
        id: &SessionId,
        request: &UpdateSessionRequest,
    ) -> ApiResult<TherapySession> {
        let body = Self::json_body(request)?;
        self.call(ApiRequest::new(Method::Patch, format!("/api/sessions/{}", id)).with_body(body))
            .await
    }

    pub async fn delete_session(&self, id: &SessionId) -> ApiResult<()> {
        self.call_unit(ApiRequest::new(Method::Delete, format!("/api/sessions/{}", id)))
            .await
    }

    pub async fn get_notes(&self, id: &SessionId) -> ApiResult<ExtractedNotes> {
        self.call(ApiRequest::new(Method::Get, format!("/api/sessions/{}/notes", id)))
            .await
    }

    /// Multipart audio upload; `progress` receives whole percentages
    pub async fn upload_session(
        &self,
        upload: SessionUpload,
        progress: ProgressFn,
    ) -> ApiResult<TherapySession> {
        let mut fields = vec![("patient_id".to_string(), upload.patient_id.to_string())];
        if let Some(date) = upload.session_date {
            fields.push(("session_date".to_string(), date.to_string()));
        }

        let request = MultipartUpload {
            path: "/api/sessions/upload".to_string(),
            fields,
            file_field: "file".to_string(),
            filename: upload.filename.clone(),
            content_type: upload.content_type,
            bytes: upload.bytes,
            bearer: self.token(),
            timeout: self.timeout,
        };

        info!("Uploading {} for patient {}", upload.filename, upload.patient_id);
        let raw = match self.transport.upload(request, progress).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Upload of {} failed: {}", upload.filename, e);
                return Ok(ApiResponse::failure(e.into()));
            }
        };

        debug!("POST /api/sessions/upload -> {}", raw.status);
        decode(raw)
    }
}
