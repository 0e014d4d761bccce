//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use super::transport::{
    ApiRequest, Method, MultipartUpload, ProgressFn, RawResponse, Transport, TransportError,
};

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Split an upload body into `size`-byte views of the same buffer, each with
/// the percentage sent once it is through
pub fn upload_chunks(data: Bytes, size: usize) -> impl Iterator<Item = (Bytes, u8)> {
    let total = data.len();
    (0..total).step_by(size.max(1)).map(move |start| {
        let end = start.saturating_add(size.max(1)).min(total);
        let pct = (end as u64 * 100 / total as u64) as u8;
        (data.slice(start..end), pct)
    })
}

/// HTTP transport against the TherapyBridge API
pub struct HttpTransport {
    client: Client,
    base_url: String,
    default_timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport with timeouts
    pub fn new(base_url: impl Into<String>, timeout: Duration, connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new()); // Fallback if config fails

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_timeout: timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_error(&self, err: reqwest::Error, timeout: Option<Duration>) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(timeout.unwrap_or(self.default_timeout))
        } else {
            TransportError::Network(err.to_string())
        }
    }

    async fn finish(
        &self,
        builder: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<RawResponse, TransportError> {
        let builder = match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        };

        let response: Response = builder.send().await.map_err(|e| {
            warn!("HTTP request failed: {}", e);
            self.map_error(e, timeout)
        })?;

        let status = response.status().as_u16();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| self.map_error(e, timeout))?;

        Ok(RawResponse {
            status,
            body,
            request_id,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method.as_str(), url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        self.finish(builder, request.timeout).await
    }

    async fn upload(
        &self,
        upload: MultipartUpload,
        progress: ProgressFn,
    ) -> Result<RawResponse, TransportError> {
        let url = self.url(&upload.path);
        let total = upload.bytes.len() as u64;
        debug!("POST {} (multipart, {} bytes)", url, total);

        // Report progress as reqwest pulls each chunk off the stream
        progress(0);
        let on_chunk = progress.clone();
        let body_stream = stream::iter(upload_chunks(Bytes::from(upload.bytes), UPLOAD_CHUNK).map(
            move |(chunk, pct)| {
                on_chunk(pct);
                Ok::<_, std::io::Error>(chunk)
            },
        ));

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body_stream), total)
            .file_name(upload.filename.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| TransportError::Network(format!("Invalid content type: {}", e)))?;

        let mut form = Form::new();
        for (name, value) in upload.fields {
            form = form.text(name, value);
        }
        form = form.part(upload.file_field, part);

        let mut builder = self.client.post(&url).multipart(form);
        if let Some(token) = &upload.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = self.finish(builder, upload.timeout).await?;
        if response.is_success() {
            progress(100);
        }
        Ok(response)
    }
}
