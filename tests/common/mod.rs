// Scripted transport shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use therapybridge::api::{
    ApiClient, ApiRequest, Method, MultipartUpload, ProgressFn, RawResponse, Transport, TransportError,
};

#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Raw(u16, String),
    Network(String),
    Timeout,
}

#[derive(Default)]
pub struct MockTransport {
    /// Replies per (method, path); the last one keeps repeating
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    pub requests: Mutex<Vec<ApiRequest>>,
    pub uploads: Mutex<Vec<(String, usize, Vec<(String, String)>)>>,
    progress_steps: Mutex<Vec<u8>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, method: Method, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn ok(&self, method: Method, path: &str, body: Value) {
        self.reply(method, path, Reply::Json(200, body));
    }

    pub fn progress_steps(&self, steps: &[u8]) {
        *self.progress_steps.lock().unwrap() = steps.to_vec();
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn next_reply(&self, method: Method, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue.front().cloned().unwrap(),
            _ => Reply::Json(404, json!({ "detail": "Not Found" })),
        }
    }

    fn respond(reply: Reply) -> Result<RawResponse, TransportError> {
        match reply {
            Reply::Json(status, body) => Ok(RawResponse {
                status,
                body: body.to_string(),
                request_id: None,
            }),
            Reply::Raw(status, body) => Ok(RawResponse {
                status,
                body,
                request_id: Some("req-raw".to_string()),
            }),
            Reply::Network(message) => Err(TransportError::Network(message)),
            Reply::Timeout => Err(TransportError::Timeout(Duration::from_secs(30))),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let reply = self.next_reply(request.method, &request.path);
        self.requests.lock().unwrap().push(request);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::respond(reply)
    }

    async fn upload(
        &self,
        upload: MultipartUpload,
        progress: ProgressFn,
    ) -> Result<RawResponse, TransportError> {
        self.uploads
            .lock()
            .unwrap()
            .push((upload.filename.clone(), upload.bytes.len(), upload.fields.clone()));
        let steps = self.progress_steps.lock().unwrap().clone();
        for step in steps {
            progress(step);
            tokio::task::yield_now().await;
        }
        Self::respond(self.next_reply(Method::Post, &upload.path))
    }
}

pub fn client(transport: &Arc<MockTransport>) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(transport.clone()))
}

pub const PATIENT_A: &str = "8d0e1f4a-3b2c-4d5e-9f60-718293a4b5c6";
pub const PATIENT_B: &str = "1a2b3c4d-5e6f-4a1b-8c2d-3e4f5a6b7c8d";
pub const SESSION_1: &str = "5f1e2d3c-4b5a-4968-8776-a5b4c3d2e1f0";
pub const THERAPIST: &str = "0b9a8c7d-6e5f-4a3b-9c2d-1e0f9a8b7c6d";

pub fn patient_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase()),
        "phone": null,
        "therapist_id": THERAPIST,
        "created_at": "2025-01-10T09:00:00Z"
    })
}

pub fn session_json(id: &str, patient: &str, status: &str, filename: &str) -> Value {
    json!({
        "id": id,
        "patient_id": patient,
        "therapist_id": THERAPIST,
        "audio_filename": filename,
        "status": status,
        "session_date": "2025-02-01T00:00:00Z",
        "error_message": null,
        "created_at": "2025-02-01T10:00:00Z"
    })
}
