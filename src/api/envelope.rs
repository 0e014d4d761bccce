//! Success/failure envelope and backend error-body parsing

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::error::{ApiError, ClientError, ErrorInfo};
use super::transport::RawResponse;
use crate::domain::validation::FieldErrors;

/// Outcome of an API call. Expected HTTP failures land in `Failure`
/// rather than an `Err`, so callers have to branch on them.
#[derive(Debug, Clone)]
pub enum ApiResponse<T> {
    Success { status: u16, data: T },
    Failure { status: Option<u16>, error: ApiError },
}

impl<T> ApiResponse<T> {
    pub fn failure(error: ApiError) -> Self {
        ApiResponse::Failure {
            status: error.status(),
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiResponse::Success { status, .. } => Some(*status),
            ApiResponse::Failure { status, .. } => *status,
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            ApiResponse::Success { data, .. } => Ok(data),
            ApiResponse::Failure { error, .. } => Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        match self {
            ApiResponse::Success { status, data } => ApiResponse::Success {
                status,
                data: f(data),
            },
            ApiResponse::Failure { status, error } => ApiResponse::Failure { status, error },
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// `{success, status, data}` / `{success, status, error, details?}`
    pub fn to_envelope(&self) -> Value {
        match self {
            ApiResponse::Success { status, data } => json!({
                "success": true,
                "status": status,
                "data": data,
            }),
            ApiResponse::Failure { status, error } => {
                let mut envelope = json!({
                    "success": false,
                    "status": status,
                    "error": {
                        "code": error.code(),
                        "message": error.user_message(),
                        "retriable": error.is_retriable(),
                        "request_id": error.request_id(),
                    },
                });
                if let Some(fields) = error.fields() {
                    envelope["details"] = json!(fields);
                }
                envelope
            }
        }
    }
}

/// Interpret a raw response as `T` or as a classified failure
pub fn decode<T: DeserializeOwned>(raw: RawResponse) -> Result<ApiResponse<T>, ClientError> {
    if raw.is_success() {
        let body = if raw.body.trim().is_empty() { "null" } else { raw.body.as_str() };
        let data = serde_json::from_str(body).map_err(|e| ClientError::Decode {
            status: raw.status,
            message: e.to_string(),
        })?;
        return Ok(ApiResponse::Success {
            status: raw.status,
            data,
        });
    }

    let (mut info, fields) = parse_error_body(&raw.body);
    if info.request_id.is_none() {
        info.request_id = raw.request_id.clone();
    }
    let error = ApiError::from_status(raw.status, info, fields);
    Ok(ApiResponse::Failure {
        status: Some(raw.status),
        error,
    })
}

/// Understands the structured middleware body, FastAPI's `detail` string
/// and FastAPI's 422 `detail` list. Anything else becomes a bare message.
pub fn parse_error_body(body: &str) -> (ErrorInfo, FieldErrors) {
    let mut info = ErrorInfo::default();
    let mut fields = FieldErrors::new();

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let trimmed = body.trim();
            if !trimmed.is_empty() {
                info.message = Some(trimmed.chars().take(200).collect());
            }
            return (info, fields);
        }
    };

    match value.get("error") {
        Some(Value::Object(err)) => {
            info.code = err.get("code").and_then(Value::as_str).map(str::to_string);
            info.message = err.get("message").and_then(Value::as_str).map(str::to_string);
            info.retriable = err.get("retriable").and_then(Value::as_bool);
            info.request_id = err.get("request_id").and_then(Value::as_str).map(str::to_string);
            if let Some(details) = err.get("details") {
                collect_details(details, &mut fields);
            }
        }
        Some(Value::String(message)) => {
            info.message = Some(message.clone());
        }
        _ => {}
    }

    if info.code.is_none() {
        info.code = value.get("code").and_then(Value::as_str).map(str::to_string);
    }
    if info.request_id.is_none() {
        info.request_id = value.get("request_id").and_then(Value::as_str).map(str::to_string);
    }
    if info.retriable.is_none() {
        info.retriable = value.get("retriable").and_then(Value::as_bool);
    }
    if let Some(details) = value.get("details") {
        collect_details(details, &mut fields);
    }

    match value.get("detail") {
        Some(Value::String(message)) if info.message.is_none() => {
            info.message = Some(message.clone());
        }
        Some(Value::Array(items)) => {
            for item in items {
                let field = item
                    .get("loc")
                    .and_then(Value::as_array)
                    .map(|loc| field_name(loc))
                    .unwrap_or_else(|| "_".to_string());
                if let Some(msg) = item.get("msg").and_then(Value::as_str) {
                    fields.entry(field).or_default().push(msg.to_string());
                }
            }
            if info.message.is_none() {
                info.message = Some("Validation error".to_string());
            }
        }
        _ => {}
    }

    (info, fields)
}

/// `["body", "patient", "email"]` -> `patient.email`
fn field_name(loc: &[Value]) -> String {
    let parts: Vec<String> = loc
        .iter()
        .filter_map(|p| match p {
            Value::String(s) if !matches!(s.as_str(), "body" | "query" | "path") => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        "_".to_string()
    } else {
        parts.join(".")
    }
}

fn collect_details(details: &Value, fields: &mut FieldErrors) {
    let Value::Object(map) = details else {
        return;
    };
    for (field, messages) in map {
        let entry = fields.entry(field.clone()).or_default();
        match messages {
            Value::String(msg) => entry.push(msg.clone()),
            Value::Array(list) => entry.extend(list.iter().filter_map(Value::as_str).map(str::to_string)),
            _ => {}
        }
    }
}
