//! Transport seam between the API client and the network

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A JSON request against the API
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the base URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
            timeout: None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A multipart file upload
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    pub path: String,
    /// Plain text form fields
    pub fields: Vec<(String, String)>,
    pub file_field: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub bearer: Option<String>,
    pub timeout: Option<Duration>,
}

/// Whatever came back over the wire, before interpretation
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Value of the `x-request-id` header, if present
    pub request_id: Option<String>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No response was received
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Network(String),

    #[error("Deadline of {0:?} exceeded")]
    Timeout(Duration),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => ApiError::Network { message },
            TransportError::Timeout(after) => ApiError::Timeout { after },
        }
    }
}

/// Upload progress sink, called with whole percentages
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// HTTP transport used by `ApiClient`
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a JSON request
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError>;

    /// Send a multipart upload, reporting progress as the body is streamed
    async fn upload(
        &self,
        upload: MultipartUpload,
        progress: ProgressFn,
    ) -> Result<RawResponse, TransportError>;
}
